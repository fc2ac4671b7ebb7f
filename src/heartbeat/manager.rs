use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;

use super::probe::HealthProbe;
use super::types::{DegradeCause, HealthStatus, StabilityEvent, TickReport};
use crate::config::{HeartbeatConfig, StabilityConfig};
use crate::descriptor::ServiceDescriptor;
use crate::descriptor::params::HEALTH_CHECK;
use crate::executor::WorkerPool;

/// Source of the descriptors the heartbeat should probe, with their current scores.
pub trait StabilityTracker: Send + Sync {
    fn tracked(&self) -> Vec<(ServiceDescriptor, i32)>;

    fn level(&self, identity: &str) -> Option<i32>;
}

/// Maps a probe verdict to a stability event, given the descriptor's current level.
/// Degrading stops at the maximum, recovering stops at the minimum.
pub fn classify(
    url: &ServiceDescriptor,
    status: HealthStatus,
    level: i32,
    bounds: &StabilityConfig,
) -> Option<StabilityEvent> {
    match status {
        HealthStatus::Broke | HealthStatus::Disability if level < bounds.max_level => {
            Some(StabilityEvent::Degrade {
                url: url.clone(),
                cause: DegradeCause::Failure,
            })
        }
        HealthStatus::Unhealth if level < bounds.max_level => Some(StabilityEvent::Degrade {
            url: url.clone(),
            cause: DegradeCause::Unhealth,
        }),
        HealthStatus::Health if level > bounds.min_level => {
            Some(StabilityEvent::Recover { url: url.clone() })
        }
        _ => None,
    }
}

/// Periodic prober. `tick` is driven by the scheduler; probes run on the bounded pool
/// and post their verdicts to the stability event channel.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    bounds: StabilityConfig,
    tracker: Arc<dyn StabilityTracker>,
    probe: Arc<dyn HealthProbe>,
    events: mpsc::UnboundedSender<StabilityEvent>,
    pool: Arc<WorkerPool>,
    enabled: AtomicBool,
    ticks: AtomicU64,
}

impl HeartbeatManager {
    pub fn new(
        config: HeartbeatConfig,
        bounds: StabilityConfig,
        tracker: Arc<dyn StabilityTracker>,
        probe: Arc<dyn HealthProbe>,
        events: mpsc::UnboundedSender<StabilityEvent>,
        pool: Arc<WorkerPool>,
    ) -> Arc<Self> {
        let enabled = config.enabled;
        Arc::new(Self {
            config,
            bounds,
            tracker,
            probe,
            events,
            pool,
            enabled: AtomicBool::new(enabled),
            ticks: AtomicU64::new(0),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        tracing::info!("Heartbeat {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// One heartbeat round. Every `functional_every`-th tick runs functional probes.
    pub fn tick(&self) -> TickReport {
        if !self.is_enabled() {
            return TickReport::default();
        }

        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let functional = tick % self.config.functional_every.max(1) == 0;
        let mut report = TickReport {
            tick,
            functional,
            ..TickReport::default()
        };

        for (url, _) in self.tracker.tracked() {
            if !url.bool_parameter(HEALTH_CHECK, false) {
                continue;
            }

            let identity = url.identity();
            match self.pool.submit(self.probe_job(url, functional)) {
                Ok(()) => report.submitted += 1,
                Err(e) => {
                    report.dropped += 1;
                    tracing::warn!("Dropped probe of {} this tick: {}", identity, e);
                }
            }
        }

        if report.submitted > 0 || report.dropped > 0 {
            tracing::debug!(
                "Heartbeat tick {} ({}): {} probe(s) submitted, {} dropped",
                tick,
                if functional { "functional" } else { "liveness" },
                report.submitted,
                report.dropped
            );
        }
        report
    }

    fn probe_job(
        &self,
        url: ServiceDescriptor,
        functional: bool,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let probe = self.probe.clone();
        let tracker = self.tracker.clone();
        let events = self.events.clone();
        let bounds = self.bounds.clone();

        async move {
            let status = if functional {
                probe.take_a_test(&url).await
            } else {
                probe.have_a_look(&url).await
            };

            // Unregistered while the probe was in flight.
            let Some(level) = tracker.level(&url.identity()) else {
                return;
            };
            if let Some(event) = classify(&url, status, level, &bounds) {
                tracing::debug!("{} probed {:?} at level {}", url.identity(), status, level);
                if events.send(event).is_err() {
                    tracing::warn!("Stability event channel closed");
                }
            }
        }
    }
}
