//! Membership Module Tests
//!
//! Validates the fundamental components of the cluster membership system.
//!
//! ## Test Scopes
//! - **Data Structures**: Ensures uniqueness of IDs and correct serialization of wire protocol messages.
//! - **Service Logic**: Verifies initialization, member lookup and consistent ids.
//! - **Failure Detection**: Alive -> Suspect -> Dead and the resulting `NodeLeft` event.
//! - **Hints**: Inbound hint frames reach local listeners; our own echoes do not.

#[cfg(test)]
mod tests {
    use crate::membership::cluster::{ClusterMembership, ClusterMessaging, StandaloneCluster};
    use crate::membership::service::MembershipService;
    use crate::membership::types::{
        GossipMessage, MembershipEvent, Node, NodeId, NodeState, RegistryHint,
    };
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn test_node(id: &str, port: u16) -> Node {
        Node {
            id: NodeId(id.to_string()),
            consistent_id: format!("127.0.0.1:{}", port),
            gossip_addr: format!("127.0.0.1:{}", port).parse().unwrap(),
            http_addr: format!("127.0.0.1:{}", port + 1000).parse().unwrap(),
            state: NodeState::Alive,
            incarnation: 1,
            last_seen: None,
        }
    }

    async fn local_service() -> Arc<MembershipService> {
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        MembershipService::new(any, "127.0.0.1:8080".parse().unwrap(), vec![])
            .await
            .expect("Failed to create service")
    }

    // ============================================================
    // NODE ID TESTS
    // ============================================================

    #[test]
    fn test_node_id_is_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        assert_ne!(id1, id2, "Each NodeId should be unique");
    }

    #[test]
    fn test_node_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(NodeId("node-1".to_string()));
        set.insert(NodeId("node-1".to_string())); // duplicate
        set.insert(NodeId("node-2".to_string()));

        assert_eq!(set.len(), 2, "HashSet should have 2 unique NodeIds");
    }

    // ============================================================
    // WIRE FORMAT TESTS
    // ============================================================

    #[test]
    fn test_node_serialization_skips_last_seen() {
        let mut node = test_node("test-node", 5000);
        node.last_seen = Some(Instant::now());

        let json = serde_json::to_string(&node).expect("Serialization failed");
        let restored: Node = serde_json::from_str(&json).expect("Deserialization failed");

        assert_eq!(restored.id, node.id);
        assert_eq!(restored.consistent_id, node.consistent_id);
        assert_eq!(restored.gossip_addr, node.gossip_addr);
        assert!(restored.last_seen.is_none());
    }

    #[test]
    fn test_gossip_hint_serialization() {
        let msg = GossipMessage::Hint {
            from: NodeId("sender".to_string()),
            hint: RegistryHint::StabilityChanged {
                uri: "http://10.0.0.1:8080/orders".to_string(),
            },
        };

        let encoded = bincode::serialize(&msg).expect("Failed to serialize Hint");
        let decoded: GossipMessage =
            bincode::deserialize(&encoded).expect("Failed to deserialize Hint");

        if let GossipMessage::Hint { from, hint } = decoded {
            assert_eq!(from.0, "sender");
            assert_eq!(
                hint,
                RegistryHint::StabilityChanged {
                    uri: "http://10.0.0.1:8080/orders".to_string()
                }
            );
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_gossip_ack_serialization() {
        let msg = GossipMessage::Ack {
            from: NodeId("responder".to_string()),
            incarnation: 10,
            members: vec![test_node("node-1", 5000), test_node("node-2", 5001)],
        };

        let encoded = bincode::serialize(&msg).expect("Failed to serialize Ack");
        let decoded: GossipMessage =
            bincode::deserialize(&encoded).expect("Failed to deserialize Ack");

        if let GossipMessage::Ack { members, .. } = decoded {
            assert_eq!(members.len(), 2);
            assert_eq!(members[1].consistent_id, "127.0.0.1:5001");
        } else {
            panic!("Wrong message type");
        }
    }

    // ============================================================
    // MEMBERSHIP SERVICE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_membership_service_creation() {
        let service = local_service().await;

        assert_eq!(service.members.len(), 1);

        let alive = service.get_alive_members();
        assert_eq!(alive.len(), 1);
        assert_eq!(alive[0].id, service.local_node.id);
        assert!(service.remote_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_consistent_id_is_resolved_gossip_addr() {
        let service = local_service().await;

        let consistent = service.local_consistent_id();
        assert_eq!(consistent, service.local_node.gossip_addr.to_string());
        assert_ne!(service.local_node.gossip_addr.port(), 0);
        assert_eq!(service.local_node.http_addr.port(), 8080);
    }

    #[tokio::test]
    async fn test_join_adds_member_and_publishes_event() {
        let service = local_service().await;
        let mut events = service.subscribe_events();

        service
            .handle_message(
                GossipMessage::Join {
                    node: test_node("joiner", 5005),
                },
                "127.0.0.1:5005".parse().unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(service.remote_nodes().len(), 1);
        assert_eq!(
            events.recv().await.unwrap(),
            MembershipEvent::NodeJoined {
                id: NodeId("joiner".to_string()),
                consistent_id: "127.0.0.1:5005".to_string(),
            }
        );
    }

    // ============================================================
    // FAILURE DETECTION
    // ============================================================

    #[tokio::test]
    async fn test_silent_member_is_suspected_then_declared_dead() {
        // ARRANGE
        let service = local_service().await;
        let mut events = service.subscribe_events();
        let start = Instant::now();
        let mut peer = test_node("peer", 5010);
        peer.last_seen = Some(start);
        service.members.insert(peer.id.clone(), peer.clone());

        // ACT 1: past the suspect timeout
        service.detect_failures(start + Duration::from_secs(6)).await;
        assert_eq!(service.get_member(&peer.id).unwrap().state, NodeState::Suspect);

        // ACT 2: past the dead timeout
        service.detect_failures(start + Duration::from_secs(17)).await;

        // ASSERT
        assert_eq!(service.get_member(&peer.id).unwrap().state, NodeState::Dead);
        assert_eq!(
            events.try_recv().unwrap(),
            MembershipEvent::NodeLeft {
                id: peer.id.clone(),
                consistent_id: "127.0.0.1:5010".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_local_node_refutes_suspicion() {
        let service = local_service().await;
        let local_id = service.local_node.id.clone();

        service
            .handle_message(
                GossipMessage::Suspect {
                    node_id: local_id.clone(),
                    incarnation: 7,
                },
                "127.0.0.1:5099".parse().unwrap(),
            )
            .await
            .unwrap();

        let local = service.get_member(&local_id).unwrap();
        assert_eq!(local.state, NodeState::Alive);
        assert_eq!(local.incarnation, 8);
    }

    // ============================================================
    // HINTS
    // ============================================================

    #[tokio::test]
    async fn test_inbound_hint_reaches_listeners() {
        let service = local_service().await;
        let mut hints = service.listen();
        let hint = RegistryHint::AvailableChanged {
            service_id: "orders".to_string(),
        };

        service
            .handle_message(
                GossipMessage::Hint {
                    from: NodeId("remote".to_string()),
                    hint: hint.clone(),
                },
                "127.0.0.1:5020".parse().unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(hints.try_recv().unwrap(), hint);
    }

    #[tokio::test]
    async fn test_own_hint_echo_is_ignored() {
        let service = local_service().await;
        let mut hints = service.listen();

        service
            .handle_message(
                GossipMessage::Hint {
                    from: service.local_node.id.clone(),
                    hint: RegistryHint::AvailableChanged {
                        service_id: "orders".to_string(),
                    },
                },
                "127.0.0.1:5021".parse().unwrap(),
            )
            .await
            .unwrap();

        assert!(hints.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_standalone_cluster_delivers_locally() {
        let cluster = StandaloneCluster::new("node-a");
        let mut hints = cluster.listen();

        cluster
            .send_to_group(RegistryHint::AvailableChanged {
                service_id: "orders".to_string(),
            })
            .await;
        assert!(hints.try_recv().is_err(), "outbound hints have no local recipient");

        cluster.deliver(RegistryHint::StabilityChanged {
            uri: "u".to_string(),
        });
        assert!(hints.try_recv().is_ok());
        assert_eq!(cluster.local_consistent_id(), "node-a");
        assert!(cluster.remote_nodes().is_empty());
    }
}
