//! Collaborator interfaces the registry consumes from the cluster layer, plus a
//! single-node implementation for embedded use.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::types::{MembershipEvent, Node, NodeId, RegistryHint};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Who we are and who else is out there.
pub trait ClusterMembership: Send + Sync {
    fn local_node_id(&self) -> NodeId;

    /// Stable across restarts; stamped into descriptors as `nodeConsistentId`.
    fn local_consistent_id(&self) -> String;

    fn remote_nodes(&self) -> Vec<Node>;

    fn subscribe_events(&self) -> broadcast::Receiver<MembershipEvent>;
}

/// Group messaging for registry cache-invalidation hints.
#[async_trait]
pub trait ClusterMessaging: Send + Sync {
    /// Sends to every remote member. The local node is not a recipient.
    async fn send_to_group(&self, hint: RegistryHint);

    /// Hints received from remote members.
    fn listen(&self) -> broadcast::Receiver<RegistryHint>;
}

/// A cluster of one: no peers, hints go nowhere.
pub struct StandaloneCluster {
    node_id: NodeId,
    consistent_id: String,
    events: broadcast::Sender<MembershipEvent>,
    hints: broadcast::Sender<RegistryHint>,
}

impl StandaloneCluster {
    pub fn new(consistent_id: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (hints, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            node_id: NodeId::new(),
            consistent_id: consistent_id.to_string(),
            events,
            hints,
        }
    }

    /// Hands a hint to local listeners as if a peer had sent it.
    pub fn deliver(&self, hint: RegistryHint) {
        let _ = self.hints.send(hint);
    }

    /// Publishes a topology change to local subscribers.
    pub fn publish(&self, event: MembershipEvent) {
        let _ = self.events.send(event);
    }
}

impl ClusterMembership for StandaloneCluster {
    fn local_node_id(&self) -> NodeId {
        self.node_id.clone()
    }

    fn local_consistent_id(&self) -> String {
        self.consistent_id.clone()
    }

    fn remote_nodes(&self) -> Vec<Node> {
        Vec::new()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl ClusterMessaging for StandaloneCluster {
    async fn send_to_group(&self, hint: RegistryHint) {
        tracing::trace!("Standalone node drops outbound hint {:?}", hint);
    }

    fn listen(&self) -> broadcast::Receiver<RegistryHint> {
        self.hints.subscribe()
    }
}
