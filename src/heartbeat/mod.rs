//! Heartbeat Module
//!
//! Background probing that keeps every tracked descriptor's stability score current.
//!
//! ## Flow
//! 1. The scheduler calls `HeartbeatManager::tick` at a fixed interval.
//! 2. Each tick submits one probe job per tracked descriptor with `healthCheck=true` to a
//!    bounded pool. A full pool drops the job for that tick.
//! 3. The job asks the `HealthProbe` for a `HealthStatus` (liveness, or functional on every
//!    Nth tick) and maps it to a `StabilityEvent`.
//! 4. The registry consumes the events and moves the score within its bounds.
//!
//! ## Counters
//! `HttpHealthProbe` counts consecutive failures per endpoint. A success decays a counter
//! by one, or down to `emergency_countdown - 1` when it sits above that cap.

pub mod manager;
pub mod probe;
pub mod types;

pub use manager::{HeartbeatManager, StabilityTracker, classify};
pub use probe::{CLIENT_HEADER, EXPECTED_HEALTH_BODY, HealthProbe, HttpHealthProbe};
pub use types::{DegradeCause, HealthCounters, HealthStatus, StabilityEvent, TickReport};
