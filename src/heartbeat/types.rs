use serde::{Deserialize, Serialize};

use crate::descriptor::ServiceDescriptor;

/// Outcome of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Liveness or functional check passed.
    Health,
    /// Check failed, threshold not yet reached.
    Unhealth,
    /// Liveness failures reached the failure threshold.
    Broke,
    /// Functional failures reached the disability threshold.
    Disability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradeCause {
    Failure,
    Unhealth,
}

/// Posted by probe jobs, consumed by the stability adjustment path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StabilityEvent {
    Degrade {
        url: ServiceDescriptor,
        cause: DegradeCause,
    },
    Recover {
        url: ServiceDescriptor,
    },
}

impl StabilityEvent {
    pub fn url(&self) -> &ServiceDescriptor {
        match self {
            StabilityEvent::Degrade { url, .. } => url,
            StabilityEvent::Recover { url } => url,
        }
    }
}

/// Per-endpoint probe counters. Process-local; only the decay rule lowers them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthCounters {
    pub health_failures: u32,
    pub functional_failures: u32,
    pub requests: u64,
}

/// Success decay: above `cap` drop to `cap - 1`, otherwise step down by one.
pub fn decay(counter: u32, cap: u32) -> u32 {
    if counter > cap {
        cap.saturating_sub(1)
    } else {
        counter.saturating_sub(1)
    }
}

/// What a tick did, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub functional: bool,
    pub submitted: usize,
    pub dropped: usize,
}
