//! Membership & Messaging Module
//!
//! Implements a Gossip-based membership protocol (inspired by SWIM) to manage the cluster topology,
//! and carries the registry's cross-node cache-invalidation hints over the same channel.
//!
//! ## Core Mechanisms
//! - **Gossip Protocol**: Nodes periodically exchange status updates via UDP to maintain a consistent view of the cluster.
//! - **Failure Detection**: Uses a "Suspect" -> "Dead" transition model with timeouts; a death is published
//!   as `MembershipEvent::NodeLeft` so the registry can sweep the departed node's descriptors.
//! - **Incarnation Numbers**: Solves conflict resolution when node state (Alive/Suspect) is disputed.
//! - **Hints**: `RegistryHint` frames are fanned out to alive members and republished locally on receipt.
//!
//! The registry only sees the `ClusterMembership` / `ClusterMessaging` traits; `StandaloneCluster`
//! implements them for a single node without any networking.

pub mod cluster;
pub mod service;
pub mod types;

pub use cluster::{ClusterMembership, ClusterMessaging, StandaloneCluster};
pub use service::MembershipService;
pub use types::{MembershipEvent, Node, NodeId, NodeState, RegistryHint};

#[cfg(test)]
mod tests;
