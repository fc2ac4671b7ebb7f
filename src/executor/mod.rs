//! Background Execution Module
//!
//! Owns every background activity of the registry so that nothing spawns raw tasks
//! ad hoc and shutdown can stop things in a defined order.
//!
//! ## Submodules
//! - **`pool`**: bounded, fire-and-forget `WorkerPool` (probe pool, notify pool).
//! - **`scheduler`**: `Scheduler` for fixed-period loops and long-lived consumers.

pub mod pool;
pub mod scheduler;

pub use pool::{PoolConfig, PoolError, WorkerPool};
pub use scheduler::{Scheduler, TaskHandle};
