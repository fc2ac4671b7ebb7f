//! Registry configuration.
//!
//! Every threshold and interval used by the registry is injected from here; nothing is
//! read from process-wide statics. Sections default independently so a TOML file only
//! needs to mention what it overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::executor::pool::PoolConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub node: NodeConfig,
    pub stability: StabilityConfig,
    pub heartbeat: HeartbeatConfig,
    pub notify: NotifyConfig,
    pub fallback: FallbackConfig,
}

impl RegistryConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stability.min_level >= self.stability.max_level {
            anyhow::bail!(
                "stability.min_level ({}) must be below stability.max_level ({})",
                self.stability.min_level,
                self.stability.max_level
            );
        }
        if self.heartbeat.interval().is_zero() {
            anyhow::bail!("heartbeat.check_interval_ms or heartbeat.connect_timeout_ms must be positive");
        }
        if self.fallback.retry_period_ms == 0 {
            anyhow::bail!("fallback.retry_period_ms must be positive");
        }
        if self.heartbeat.functional_every == 0 {
            anyhow::bail!("heartbeat.functional_every must be positive");
        }
        for (name, pool) in [("heartbeat.pool", &self.heartbeat.pool), ("notify.pool", &self.notify.pool)] {
            if pool.min_workers == 0 || pool.min_workers > pool.max_workers || pool.queue_capacity == 0 {
                anyhow::bail!("{} has an invalid worker/queue configuration", name);
            }
        }
        Ok(())
    }
}

/// Values stamped onto descriptors registered through this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Host written into descriptors built by the convenience registration calls.
    pub advertise_host: String,
    pub environment: String,
    pub group: String,
    pub project: String,
    pub project_version: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            advertise_host: "127.0.0.1".to_string(),
            environment: "dev".to_string(),
            group: crate::descriptor::params::DEFAULT_GROUP.to_string(),
            project: String::new(),
            project_version: String::new(),
        }
    }
}

/// Bounds and step sizes for stability scores. Higher means more degraded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    pub min_level: i32,
    pub max_level: i32,
    /// Added on BROKE / DISABILITY.
    pub failure_penalty: i32,
    /// Added on UNHEALTH.
    pub unhealth_penalty: i32,
    /// Subtracted on HEALTH while degraded.
    pub recovery_credit: i32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            min_level: 0,
            max_level: 10,
            failure_penalty: 10,
            unhealth_penalty: 2,
            recovery_credit: 1,
        }
    }
}

impl StabilityConfig {
    pub fn clamp(&self, level: i32) -> i32 {
        level.clamp(self.min_level, self.max_level)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub check_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Every Nth tick runs functional probes instead of liveness probes.
    pub functional_every: u64,
    pub failure_threshold: u32,
    pub disability_threshold: u32,
    /// Cap above which a single success drops a failure counter to `cap - 1`.
    pub emergency_countdown: u32,
    /// Sent in the client-identifying header of every probe.
    pub client_name: String,
    /// Optional bearer token for probe requests.
    pub token: Option<String>,
    pub pool: PoolConfig,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_ms: 5_000,
            connect_timeout_ms: 2_000,
            request_timeout_ms: 3_000,
            functional_every: 10,
            failure_threshold: 3,
            disability_threshold: 3,
            emergency_countdown: 10,
            client_name: "cluster-registry".to_string(),
            token: None,
            pool: PoolConfig {
                min_workers: 5,
                max_workers: 30,
                queue_capacity: 1000,
            },
        }
    }
}

impl HeartbeatConfig {
    /// Tick spacing: never shorter than a probe can take to fail on connect.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(self.connect_timeout_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub pool: PoolConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig {
                min_workers: 10,
                max_workers: 30,
                queue_capacity: 200,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub retry_period_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            retry_period_ms: 5_000,
        }
    }
}

impl FallbackConfig {
    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.retry_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RegistryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat.failure_threshold, 3);
        assert_eq!(config.heartbeat.emergency_countdown, 10);
        assert_eq!(config.heartbeat.pool.queue_capacity, 1000);
        assert_eq!(config.notify.pool.queue_capacity, 200);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = RegistryConfig::from_toml(
            r#"
            [stability]
            max_level = 20

            [heartbeat]
            check_interval_ms = 100
            connect_timeout_ms = 400
            "#,
        )
        .unwrap();

        assert_eq!(config.stability.max_level, 20);
        assert_eq!(config.stability.min_level, 0);
        assert_eq!(config.heartbeat.interval(), Duration::from_millis(400));
        assert_eq!(config.fallback.retry_period(), Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let result = RegistryConfig::from_toml(
            r#"
            [stability]
            min_level = 5
            max_level = 5
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_retry_period() {
        let result = RegistryConfig::from_toml(
            r#"
            [fallback]
            retry_period_ms = 0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_heartbeat_interval() {
        let mut config = RegistryConfig::default();
        config.heartbeat.check_interval_ms = 0;
        config.heartbeat.connect_timeout_ms = 0;
        assert!(config.validate().is_err());

        // Either one is enough to space the ticks.
        config.heartbeat.connect_timeout_ms = 250;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_clamp() {
        let stability = StabilityConfig::default();
        assert_eq!(stability.clamp(-3), 0);
        assert_eq!(stability.clamp(42), 10);
        assert_eq!(stability.clamp(4), 4);
    }
}
