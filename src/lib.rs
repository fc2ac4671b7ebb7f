//! Clustered Service Registry Library
//!
//! Application instances advertise network endpoints, callers discover matching
//! endpoints, and a background heartbeat keeps each endpoint's stability score current
//! so unhealthy endpoints are demoted without being removed.
//!
//! ## Architecture Modules
//! - **`descriptor`**: the `ServiceDescriptor` value, its text form, and the matching
//!   predicates used by discovery.
//! - **`registry`**: the layered registry (fallback, notify, core, store-backed backend),
//!   the `ClusterRegistry` node facade and its HTTP handlers.
//! - **`heartbeat`**: HTTP health probing and the periodic manager that turns probe
//!   verdicts into stability adjustments.
//! - **`storage`**: the transactional key-value store interface and an in-process
//!   implementation.
//! - **`membership`**: UDP gossip membership (SWIM-like), node-departure events, and
//!   cross-node cache-invalidation hints.
//! - **`executor`**: bounded worker pools and the recurring task scheduler.
//! - **`config`**: `RegistryConfig`, loaded from TOML.

pub mod config;
pub mod descriptor;
pub mod executor;
pub mod heartbeat;
pub mod membership;
pub mod registry;
pub mod storage;
