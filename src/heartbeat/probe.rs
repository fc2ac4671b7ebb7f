use async_trait::async_trait;
use dashmap::DashMap;

use super::types::{HealthCounters, HealthStatus, decay};
use crate::config::HeartbeatConfig;
use crate::descriptor::ServiceDescriptor;
use crate::descriptor::params::{
    CRUCIAL_CHECK_PATH, DEFAULT_HEALTH_CHECK_PATH, HEALTH_CHECK_PATH, HTTPS_PROTOCOL,
};

/// Body a healthy endpoint must answer with, byte for byte.
pub const EXPECTED_HEALTH_BODY: &str = "UP";

/// Identifies the prober to the probed service.
pub const CLIENT_HEADER: &str = "X-Registry-Client";

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Liveness check against `healthCheckPath`.
    async fn have_a_look(&self, url: &ServiceDescriptor) -> HealthStatus;

    /// Functional check against `crucialCheckPath`.
    async fn take_a_test(&self, url: &ServiceDescriptor) -> HealthStatus;
}

/// `HealthProbe` over HTTP GET.
///
/// Failure counters are kept per probe URI: the liveness counter under the full
/// `healthCheckPath` URL, the functional counter under the full `crucialCheckPath` URL.
/// Descriptors sharing a host and port but probing different paths never share a counter.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    config: HeartbeatConfig,
    counters: DashMap<String, HealthCounters>,
}

struct ProbeTarget {
    health_uri: String,
    crucial_uri: String,
}

impl ProbeTarget {
    fn of(url: &ServiceDescriptor) -> Self {
        let scheme = if url.protocol() == HTTPS_PROTOCOL {
            "https"
        } else {
            "http"
        };
        let endpoint = match url.port() {
            Some(port) => format!("{}://{}:{}", scheme, url.host(), port),
            None => format!("{}://{}", scheme, url.host()),
        };

        let health_path = url
            .parameter_or(HEALTH_CHECK_PATH, DEFAULT_HEALTH_CHECK_PATH)
            .trim_start_matches('/')
            .to_string();
        let crucial_path = url
            .parameter(CRUCIAL_CHECK_PATH)
            .map(|p| p.trim_start_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| health_path.clone());

        Self {
            health_uri: format!("{}/{}", endpoint, health_path),
            crucial_uri: format!("{}/{}", endpoint, crucial_path),
        }
    }

    fn functional_is_liveness(&self) -> bool {
        self.crucial_uri == self.health_uri
    }
}

impl HttpHealthProbe {
    pub fn new(config: HeartbeatConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            config,
            counters: DashMap::new(),
        })
    }

    /// Snapshot of one descriptor's counters: the liveness failures of its health URI,
    /// the functional failures of its crucial URI, and the requests sent to both.
    pub fn counters(&self, url: &ServiceDescriptor) -> HealthCounters {
        let target = ProbeTarget::of(url);
        let health = self.counters_at(&target.health_uri);
        if target.functional_is_liveness() {
            return health;
        }

        let functional = self.counters_at(&target.crucial_uri);
        HealthCounters {
            health_failures: health.health_failures,
            functional_failures: functional.functional_failures,
            requests: health.requests + functional.requests,
        }
    }

    fn counters_at(&self, uri: &str) -> HealthCounters {
        self.counters.get(uri).map(|c| *c).unwrap_or_default()
    }

    async fn check(&self, uri: &str) -> bool {
        let mut request = self.client.get(uri).header(CLIENT_HEADER, &self.config.client_name);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        match self.fetch(request).await {
            Ok((status, body)) => (200..=206).contains(&status) && body == EXPECTED_HEALTH_BODY,
            Err(e) => {
                tracing::debug!("Probe of {} failed: {}", uri, e);
                false
            }
        }
    }

    async fn fetch(&self, request: reqwest::RequestBuilder) -> anyhow::Result<(u16, String)> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }

    async fn probe_health(&self, target: &ProbeTarget) -> HealthStatus {
        let ok = self.check(&target.health_uri).await;

        let mut counters = self.counters.entry(target.health_uri.clone()).or_default();
        counters.requests += 1;
        if ok {
            counters.health_failures = decay(counters.health_failures, self.config.emergency_countdown);
            HealthStatus::Health
        } else {
            counters.health_failures = counters.health_failures.saturating_add(1);
            if counters.health_failures >= self.config.failure_threshold {
                HealthStatus::Broke
            } else {
                HealthStatus::Unhealth
            }
        }
    }

    async fn probe_functional(&self, target: &ProbeTarget) -> HealthStatus {
        let ok = self.check(&target.crucial_uri).await;

        let mut counters = self.counters.entry(target.crucial_uri.clone()).or_default();
        counters.requests += 1;
        if ok {
            counters.functional_failures =
                decay(counters.functional_failures, self.config.emergency_countdown);
            HealthStatus::Health
        } else {
            counters.functional_failures = counters.functional_failures.saturating_add(1);
            if counters.functional_failures >= self.config.disability_threshold {
                HealthStatus::Disability
            } else {
                HealthStatus::Unhealth
            }
        }
    }

    fn functional_failing(&self, target: &ProbeTarget) -> bool {
        self.counters
            .get(&target.crucial_uri)
            .map(|c| c.functional_failures > 0)
            .unwrap_or(false)
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn have_a_look(&self, url: &ServiceDescriptor) -> HealthStatus {
        let target = ProbeTarget::of(url);
        // Liveness is bypassed while functional probing is failing.
        if !target.functional_is_liveness() && self.functional_failing(&target) {
            return self.probe_functional(&target).await;
        }
        self.probe_health(&target).await
    }

    async fn take_a_test(&self, url: &ServiceDescriptor) -> HealthStatus {
        let target = ProbeTarget::of(url);
        if target.functional_is_liveness() {
            return self.probe_health(&target).await;
        }
        self.probe_functional(&target).await
    }
}
