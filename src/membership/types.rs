use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NodeState {
    Alive,
    Suspect,
    Dead,
}

/// Represents a single member in the cluster.
///
/// `id` is regenerated on every start; `consistent_id` (the gossip address) survives
/// restarts and is what registered descriptors carry as `nodeConsistentId`.
/// The `incarnation` field is a logical clock used to order updates and resolve conflicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub consistent_id: String,
    pub gossip_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub state: NodeState,
    pub incarnation: u64,

    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

/// Cache-invalidation hints exchanged between registry nodes.
///
/// The payload only says *what* changed; receivers re-read the store instead of trusting it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RegistryHint {
    AvailableChanged { service_id: String },
    StabilityChanged { uri: String },
}

/// Topology changes published to local subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    NodeJoined { id: NodeId, consistent_id: String },
    NodeLeft { id: NodeId, consistent_id: String },
}

/// The wire protocol for inter-node communication.
///
/// - `Ping/Ack`: Used for liveness checks and state synchronization.
/// - `Join`: Sent by new nodes to seed nodes to enter the cluster.
/// - `Suspect/Alive`: Disseminates changes in node health.
/// - `Hint`: Carries a `RegistryHint` to every alive member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipMessage {
    Ping {
        from: NodeId,
        incarnation: u64,
    },

    Ack {
        from: NodeId,
        incarnation: u64,
        members: Vec<Node>,
    },

    Join {
        node: Node,
    },

    Suspect {
        node_id: NodeId,
        incarnation: u64,
    },

    Alive {
        node_id: NodeId,
        incarnation: u64,
    },

    Hint {
        from: NodeId,
        hint: RegistryHint,
    },
}
