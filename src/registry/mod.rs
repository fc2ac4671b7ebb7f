//! Registry Module
//!
//! The registry lifecycle engine: descriptors are registered, promoted to available,
//! discovered by subscribers, and demoted or removed again.
//!
//! ## Layers
//! Each layer implements the same `Registry` trait and wraps the next one:
//! - **`FallbackRegistry`**: queues failed operations of non-crucial descriptors and
//!   retries them periodically; `discover` never fails.
//! - **`NotifyRegistry`**: one manager per subscription query, fans backend changes out
//!   to listeners and records the last delivered result.
//! - **`RegistryCore`**: copies inputs, tracks local registrations, follows the
//!   readiness switch, answers discovery from the subscription cache first.
//! - **`StoreBackedRegistry`** (`RegistryBackend`): available/unavailable sets and
//!   stability scores in the transactional store, plus cross-node cache hints.
//!
//! `ClusterRegistry` wires the chain together with the heartbeat and the background
//! loops; `handlers::router` exposes it over HTTP.

pub mod cache;
pub mod engine;
pub mod fallback;
pub mod handlers;
pub mod notify;
pub mod protocol;
pub mod readiness;
pub mod service;
pub mod store;
pub mod types;

pub use cache::{ResolvedLists, SubscriptionCache};
pub use engine::RegistryCore;
pub use fallback::FallbackRegistry;
pub use notify::NotifyRegistry;
pub use readiness::ReadinessSwitch;
pub use service::{ClusterRegistry, ClusterRegistryBuilder};
pub use store::{StabilityEntry, StoreBackedRegistry};
pub use types::{
    CircuitBreaker, Listener, LoggingCircuitBreaker, NotifyListener, Registry, RegistryBackend,
    RegistryError, RegistryResult,
};
