//! `ClusterRegistry`: the wired registry node.
//!
//! Builds the layer chain `FallbackRegistry -> NotifyRegistry -> RegistryCore ->
//! StoreBackedRegistry`, starts the background loops, and owns their shutdown.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc};

use super::cache::SubscriptionCache;
use super::engine::RegistryCore;
use super::fallback::FallbackRegistry;
use super::notify::NotifyRegistry;
use super::readiness::ReadinessSwitch;
use super::store::StoreBackedRegistry;
use super::types::{CircuitBreaker, Listener, LoggingCircuitBreaker, Registry, RegistryResult};
use crate::config::RegistryConfig;
use crate::descriptor::{ServiceDescriptor, ServiceRegistration};
use crate::executor::{Scheduler, WorkerPool};
use crate::heartbeat::{HealthProbe, HeartbeatManager, HttpHealthProbe, StabilityTracker};
use crate::membership::{ClusterMembership, ClusterMessaging, MembershipEvent, StandaloneCluster};
use crate::storage::{MemoryStore, TransactionalStore};

pub struct ClusterRegistryBuilder {
    config: RegistryConfig,
    store: Option<Arc<dyn TransactionalStore>>,
    membership: Option<Arc<dyn ClusterMembership>>,
    messaging: Option<Arc<dyn ClusterMessaging>>,
    breaker: Option<Arc<dyn CircuitBreaker>>,
    probe: Option<Arc<dyn HealthProbe>>,
    ready: bool,
}

impl ClusterRegistryBuilder {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            store: None,
            membership: None,
            messaging: None,
            breaker: None,
            probe: None,
            ready: false,
        }
    }

    pub fn store(mut self, store: Arc<dyn TransactionalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses one object for both membership and hint messaging.
    pub fn cluster<C>(mut self, cluster: Arc<C>) -> Self
    where
        C: ClusterMembership + ClusterMessaging + 'static,
    {
        self.membership = Some(cluster.clone());
        self.messaging = Some(cluster);
        self
    }

    pub fn circuit_breaker(mut self, breaker: Arc<dyn CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn health_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Initial readiness. Defaults to off.
    pub fn ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    /// Wires the layers and starts every background loop. Must be called inside a runtime.
    pub async fn start(self) -> anyhow::Result<Arc<ClusterRegistry>> {
        let config = self.config;
        config.validate()?;

        let standalone = Arc::new(StandaloneCluster::new(&config.node.advertise_host));
        let membership: Arc<dyn ClusterMembership> = match self.membership {
            Some(membership) => membership,
            None => standalone.clone(),
        };
        let messaging: Arc<dyn ClusterMessaging> = match self.messaging {
            Some(messaging) => messaging,
            None => standalone,
        };
        let store: Arc<dyn TransactionalStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let breaker: Arc<dyn CircuitBreaker> = match self.breaker {
            Some(breaker) => breaker,
            None => Arc::new(LoggingCircuitBreaker),
        };
        let probe: Arc<dyn HealthProbe> = match self.probe {
            Some(probe) => probe,
            None => Arc::new(HttpHealthProbe::new(config.heartbeat.clone())?),
        };

        let notify_pool = WorkerPool::new("notify", config.notify.pool.clone());
        let probe_pool = WorkerPool::new("heartbeat", config.heartbeat.pool.clone());
        let background = Scheduler::new();

        // Backend
        let backend = StoreBackedRegistry::new(
            store,
            membership.clone(),
            messaging,
            breaker,
            notify_pool.clone(),
            &config,
        );
        backend.initialize().await;
        backend.spawn_hint_listener(&background);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        backend.spawn_stability_listener(events_rx, &background);

        // Layer chain
        let cache = Arc::new(SubscriptionCache::new());
        let readiness = ReadinessSwitch::new(self.ready);
        let core = RegistryCore::new(backend.clone(), cache.clone(), readiness.clone());
        core.watch_readiness(&background);
        let notify = NotifyRegistry::new(core.clone(), cache.clone());
        let fallback = FallbackRegistry::new(notify.clone(), cache);

        let retry_scheduler = Scheduler::new();
        let retry_target = Arc::downgrade(&fallback);
        retry_scheduler.spawn_periodic("fallback-retry", config.fallback.retry_period(), move || {
            let retry_target = retry_target.clone();
            async move {
                if let Some(fallback) = retry_target.upgrade() {
                    fallback.retry().await;
                }
            }
        });

        // Heartbeat
        let heartbeat = HeartbeatManager::new(
            config.heartbeat.clone(),
            config.stability.clone(),
            backend.clone(),
            probe,
            events_tx,
            probe_pool.clone(),
        );
        let heartbeat_scheduler = Scheduler::new();
        let ticker = Arc::downgrade(&heartbeat);
        heartbeat_scheduler.spawn_periodic("heartbeat", config.heartbeat.interval(), move || {
            let ticker = ticker.clone();
            async move {
                if let Some(heartbeat) = ticker.upgrade() {
                    heartbeat.tick();
                }
            }
        });

        let registry = Arc::new(ClusterRegistry {
            consistent_id: membership.local_consistent_id(),
            config,
            fallback,
            notify,
            core,
            backend,
            heartbeat,
            readiness,
            heartbeat_scheduler,
            retry_scheduler,
            background,
            notify_pool,
            probe_pool,
            stopped: AtomicBool::new(false),
        });
        registry.spawn_departure_listener(membership.subscribe_events());

        tracing::info!("Cluster registry started on node {}", registry.consistent_id);
        Ok(registry)
    }
}

pub struct ClusterRegistry {
    config: RegistryConfig,
    consistent_id: String,
    fallback: Arc<FallbackRegistry>,
    notify: Arc<NotifyRegistry>,
    core: Arc<RegistryCore>,
    backend: Arc<StoreBackedRegistry>,
    heartbeat: Arc<HeartbeatManager>,
    readiness: ReadinessSwitch,
    heartbeat_scheduler: Scheduler,
    retry_scheduler: Scheduler,
    background: Scheduler,
    notify_pool: Arc<WorkerPool>,
    probe_pool: Arc<WorkerPool>,
    stopped: AtomicBool,
}

impl ClusterRegistry {
    pub fn builder(config: RegistryConfig) -> ClusterRegistryBuilder {
        ClusterRegistryBuilder::new(config)
    }

    /// Sweeps a departed node's descriptors out of the available sets.
    fn spawn_departure_listener(self: &Arc<Self>, mut events: broadcast::Receiver<MembershipEvent>) {
        let registry = Arc::downgrade(self);

        self.background.spawn("node-departures", async move {
            loop {
                match events.recv().await {
                    Ok(MembershipEvent::NodeLeft { consistent_id, .. }) => {
                        let Some(registry) = registry.upgrade() else {
                            break;
                        };
                        if let Err(e) = registry.unavailable_by_node(&consistent_id).await {
                            tracing::warn!("Failed to sweep departed node {}: {}", consistent_id, e);
                        }
                    }
                    Ok(MembershipEvent::NodeJoined { consistent_id, .. }) => {
                        tracing::debug!("Node {} joined", consistent_id);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("Missed {} membership events", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn local_consistent_id(&self) -> &str {
        &self.consistent_id
    }

    pub fn readiness(&self) -> &ReadinessSwitch {
        &self.readiness
    }

    pub fn heartbeat(&self) -> &Arc<HeartbeatManager> {
        &self.heartbeat
    }

    pub fn fallback(&self) -> &Arc<FallbackRegistry> {
        &self.fallback
    }

    pub fn backend(&self) -> &Arc<StoreBackedRegistry> {
        &self.backend
    }

    pub fn registered(&self) -> Vec<ServiceDescriptor> {
        self.core.registered()
    }

    pub fn subscriber_count(&self, query: &ServiceDescriptor) -> usize {
        self.notify.listener_count(query)
    }

    // ============================================================
    // REGISTRY OPERATIONS
    // ============================================================

    pub async fn register(&self, url: &ServiceDescriptor) -> RegistryResult<()> {
        self.fallback.register(url).await
    }

    /// Builds the descriptor for the advertised host and registers it.
    pub async fn register_service(
        &self,
        registration: ServiceRegistration,
    ) -> RegistryResult<ServiceDescriptor> {
        let url = registration.into_descriptor(&self.config.node.advertise_host);
        self.register(&url).await?;
        Ok(url)
    }

    pub async fn register_application_service(
        &self,
        service_id: &str,
        service_version: &str,
        protocol: &str,
        port: u16,
        parameters: BTreeMap<String, String>,
    ) -> RegistryResult<ServiceDescriptor> {
        let registration =
            ServiceRegistration::application(service_id, service_version, protocol, port)
                .parameters(parameters);
        self.register_service(registration).await
    }

    pub async fn unregister(&self, url: &ServiceDescriptor) -> RegistryResult<()> {
        self.fallback.unregister(url).await
    }

    pub async fn subscribe(&self, query: &ServiceDescriptor, listener: Listener) -> RegistryResult<()> {
        self.fallback.subscribe(query, listener).await
    }

    pub async fn unsubscribe(&self, query: &ServiceDescriptor, listener: Listener) -> RegistryResult<()> {
        self.fallback.unsubscribe(query, listener).await
    }

    pub async fn discover(&self, query: &ServiceDescriptor) -> Vec<ServiceDescriptor> {
        self.fallback.discover(query).await.unwrap_or_default()
    }

    pub async fn available(&self, url: Option<&ServiceDescriptor>) -> RegistryResult<()> {
        self.fallback.available(url).await
    }

    pub async fn unavailable(&self, url: Option<&ServiceDescriptor>) -> RegistryResult<()> {
        self.fallback.unavailable(url).await
    }

    pub async fn unavailable_by_node(&self, node_consistent_id: &str) -> RegistryResult<()> {
        self.fallback.unavailable_by_node(node_consistent_id).await
    }

    pub fn stability_of(&self, url: &ServiceDescriptor) -> Option<i32> {
        self.backend.stability_of(url)
    }

    pub fn tracked(&self) -> Vec<(ServiceDescriptor, i32)> {
        self.backend.tracked()
    }

    /// Stops the heartbeat, then fallback retries, then the notify and probe pools.
    /// Later calls do nothing.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutting down cluster registry");

        self.heartbeat_scheduler.shutdown();
        self.retry_scheduler.shutdown();
        self.notify_pool.shutdown();
        self.probe_pool.shutdown();
        self.background.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
