//! Store-backed registry backend.
//!
//! Shared state lives in three caches of the transactional store:
//! - `registry.available` / `registry.unavailable`: serviceId -> set of descriptors. A
//!   descriptor is in at most one of the two sets for its serviceId at any commit.
//! - `registry.stability`: descriptor identity -> `StabilityEntry`. No entry means nominal.
//!
//! Locally we mirror the stability map and keep a resolved descriptor list per serviceId.
//! Both are refreshed from the store when a change is published (locally or by a
//! cross-node hint), never on every read.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc};

use super::cache::ResolvedLists;
use super::types::{
    CircuitBreaker, Listener, RegistryBackend, RegistryResult, same_listener,
};
use crate::config::{NodeConfig, RegistryConfig, StabilityConfig};
use crate::descriptor::ServiceDescriptor;
use crate::descriptor::params::{
    ENVIRONMENT, GROUP, NODE_CONSISTENT_ID, NODE_ID, PROJECT, PROJECT_VERSION,
};
use crate::executor::{Scheduler, TaskHandle, WorkerPool};
use crate::heartbeat::manager::StabilityTracker;
use crate::heartbeat::types::{DegradeCause, StabilityEvent};
use crate::membership::{ClusterMembership, ClusterMessaging, RegistryHint};
use crate::storage::{StoreError, StoreTransaction, TransactionalStore, get_typed, put_typed};

pub const AVAILABLE_CACHE: &str = "registry.available";
pub const UNAVAILABLE_CACHE: &str = "registry.unavailable";
pub const STABILITY_CACHE: &str = "registry.stability";

/// Stored stability score. Carries the full descriptor so the heartbeat can probe it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityEntry {
    pub url: ServiceDescriptor,
    pub level: i32,
}

type DescriptorSet = HashSet<ServiceDescriptor>;

async fn load_set(
    txn: &mut dyn StoreTransaction,
    cache: &str,
    service_id: &str,
) -> Result<DescriptorSet, StoreError> {
    Ok(get_typed::<DescriptorSet>(txn, cache, service_id)
        .await?
        .unwrap_or_default())
}

fn save_set(
    txn: &mut dyn StoreTransaction,
    cache: &str,
    service_id: &str,
    set: &DescriptorSet,
) -> Result<(), StoreError> {
    if set.is_empty() {
        txn.remove(cache, service_id);
        Ok(())
    } else {
        put_typed(txn, cache, service_id, set)
    }
}

fn group_by_service(urls: Vec<ServiceDescriptor>) -> BTreeMap<String, Vec<ServiceDescriptor>> {
    let mut grouped: BTreeMap<String, Vec<ServiceDescriptor>> = BTreeMap::new();
    for url in urls {
        grouped
            .entry(url.service_id().to_string())
            .or_default()
            .push(url);
    }
    grouped
}

/// Order-insensitive comparison that also sees parameter changes.
fn same_contents(a: &[ServiceDescriptor], b: &[ServiceDescriptor]) -> bool {
    let a: BTreeSet<String> = a.iter().map(|d| d.to_full_string()).collect();
    let b: BTreeSet<String> = b.iter().map(|d| d.to_full_string()).collect();
    a == b
}

pub struct StoreBackedRegistry {
    store: Arc<dyn TransactionalStore>,
    membership: Arc<dyn ClusterMembership>,
    messaging: Arc<dyn ClusterMessaging>,
    breaker: Arc<dyn CircuitBreaker>,
    notify_pool: Arc<WorkerPool>,
    node: NodeConfig,
    stability: StabilityConfig,

    /// Serializes this process's read-modify-commit sequences.
    op_lock: Mutex<()>,
    /// Composed descriptors registered through this node, by identity.
    local: DashMap<String, ServiceDescriptor>,
    mirror: DashMap<String, StabilityEntry>,
    resolved: Arc<ResolvedLists>,
    /// Service listeners by query text.
    listeners: DashMap<String, (ServiceDescriptor, Listener)>,
}

impl StoreBackedRegistry {
    pub fn new(
        store: Arc<dyn TransactionalStore>,
        membership: Arc<dyn ClusterMembership>,
        messaging: Arc<dyn ClusterMessaging>,
        breaker: Arc<dyn CircuitBreaker>,
        notify_pool: Arc<WorkerPool>,
        config: &RegistryConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            membership,
            messaging,
            breaker,
            notify_pool,
            node: config.node.clone(),
            stability: config.stability.clone(),
            op_lock: Mutex::new(()),
            local: DashMap::new(),
            mirror: DashMap::new(),
            resolved: Arc::new(ResolvedLists::new()),
            listeners: DashMap::new(),
        })
    }

    /// Loads the full stability map into the local mirror.
    pub async fn initialize(&self) {
        self.stability_cache_changed(None).await;
    }

    /// Registration parameter composition: group/project/projectVersion only when
    /// absent, node identity and environment always.
    ///
    /// `nodeType` and `serviceVersion` are not touched here. `ServiceRegistration`
    /// overwrites both from the registration call; a raw descriptor keeps its own.
    fn compose(&self, mut url: ServiceDescriptor) -> ServiceDescriptor {
        url.set_parameter_if_absent(GROUP, self.node.group.clone());
        if !self.node.project.is_empty() {
            url.set_parameter_if_absent(PROJECT, self.node.project.clone());
        }
        if !self.node.project_version.is_empty() {
            url.set_parameter_if_absent(PROJECT_VERSION, self.node.project_version.clone());
        }
        url.set_parameter(NODE_ID, self.membership.local_node_id().0);
        url.set_parameter(NODE_CONSISTENT_ID, self.membership.local_consistent_id());
        url.set_parameter(ENVIRONMENT, self.node.environment.clone());
        url
    }

    fn nominal(&self, url: &ServiceDescriptor) -> StabilityEntry {
        StabilityEntry {
            url: url.clone(),
            level: self.stability.min_level,
        }
    }

    /// `None` expands to every descriptor registered through this node.
    fn targets(&self, url: Option<ServiceDescriptor>) -> Vec<ServiceDescriptor> {
        match url {
            Some(url) => vec![url],
            None => self.local.iter().map(|e| e.value().clone()).collect(),
        }
    }

    pub fn local_registered(&self) -> Vec<ServiceDescriptor> {
        self.local.iter().map(|e| e.value().clone()).collect()
    }

    pub fn stability_of(&self, url: &ServiceDescriptor) -> Option<i32> {
        self.mirror.get(&url.identity()).map(|e| e.level)
    }

    // ============================================================
    // CHANGE PROPAGATION
    // ============================================================

    async fn load_available(&self, service_id: &str) -> Result<Vec<ServiceDescriptor>, StoreError> {
        let set: DescriptorSet = match self.store.get(AVAILABLE_CACHE, service_id).await? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => DescriptorSet::new(),
        };
        let mut urls: Vec<ServiceDescriptor> = set.into_iter().collect();
        urls.sort_by_key(|d| d.to_full_string());
        Ok(urls)
    }

    /// Re-pulls the available set and notifies subscribers if it actually changed.
    pub async fn available_cache_changed(&self, service_id: &str) {
        let latest = match self.load_available(service_id).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!("Failed to refresh available set of {}: {}", service_id, e);
                return;
            }
        };

        let previous = self
            .resolved
            .replace(service_id, latest.clone())
            .unwrap_or_default();
        if same_contents(&previous, &latest) {
            tracing::trace!("Available set of {} unchanged", service_id);
            return;
        }

        tracing::debug!(
            "Available set of {} changed: {} -> {} url(s)",
            service_id,
            previous.len(),
            latest.len()
        );
        self.notify_subscribers(service_id);
    }

    /// Jobs carry no snapshot: each one reads the resolved list when it runs.
    fn notify_subscribers(&self, service_id: &str) {
        let listeners: Vec<Listener> = self
            .listeners
            .iter()
            .filter(|entry| entry.value().0.service_id() == service_id)
            .map(|entry| entry.value().1.clone())
            .collect();

        for listener in listeners {
            let resolved = self.resolved.clone();
            let job_service_id = service_id.to_string();
            if let Err(e) = self.notify_pool.submit(async move {
                resolved.deliver(&job_service_id, &listener).await;
            }) {
                tracing::warn!("Dropped notification for {}: {}", service_id, e);
            }
        }
    }

    /// `None` replays the whole stability map; `Some(uri)` merges one entry.
    pub async fn stability_cache_changed(&self, uri: Option<&str>) {
        match uri {
            None => self.resync_stability().await,
            Some(uri) => self.merge_stability(uri).await,
        }
    }

    async fn resync_stability(&self) {
        let entries = match self.store.entries(STABILITY_CACHE).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read stability map: {}", e);
                return;
            }
        };

        let mut fresh = HashMap::with_capacity(entries.len());
        for (uri, bytes) in entries {
            match bincode::deserialize::<StabilityEntry>(&bytes) {
                Ok(entry) => {
                    fresh.insert(uri, entry);
                }
                Err(e) => tracing::warn!("Skipping undecodable stability entry {}: {}", uri, e),
            }
        }

        self.mirror.retain(|uri, _| fresh.contains_key(uri));
        let count = fresh.len();
        for (uri, entry) in fresh {
            self.mirror.insert(uri, entry);
        }
        tracing::info!("Stability mirror resynchronized ({} entries)", count);
    }

    async fn merge_stability(&self, uri: &str) {
        let latest = match self.store.get(STABILITY_CACHE, uri).await {
            Ok(Some(bytes)) => match bincode::deserialize::<StabilityEntry>(&bytes) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Undecodable stability entry {}: {}", uri, e);
                    return;
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read stability of {}: {}", uri, e);
                return;
            }
        };

        let Some(entry) = latest else {
            self.mirror.remove(uri);
            return;
        };

        let previous = self
            .mirror
            .insert(uri.to_string(), entry.clone())
            .map(|e| e.level);
        if let Some(previous) = previous
            && entry.level < previous
            && entry.level <= self.stability.min_level
        {
            self.breaker.half_open(&entry.url);
        }
    }

    async fn publish_available(&self, service_id: &str) {
        self.available_cache_changed(service_id).await;
        self.messaging
            .send_to_group(RegistryHint::AvailableChanged {
                service_id: service_id.to_string(),
            })
            .await;
    }

    async fn publish_stability(&self, uri: &str) {
        self.stability_cache_changed(Some(uri)).await;
        self.messaging
            .send_to_group(RegistryHint::StabilityChanged {
                uri: uri.to_string(),
            })
            .await;
    }

    /// Full local refresh, used when hints may have been missed.
    pub async fn resync(&self) {
        self.stability_cache_changed(None).await;
        for service_id in self.resolved.service_ids() {
            self.available_cache_changed(&service_id).await;
        }
    }

    // ============================================================
    // STABILITY ADJUSTMENT
    // ============================================================

    /// Applies one heartbeat verdict. Returns the new level, or `None` when the
    /// descriptor is not tracked.
    pub async fn adjust_stability(&self, event: &StabilityEvent) -> RegistryResult<Option<i32>> {
        let uri = event.url().identity();
        let delta = match event {
            StabilityEvent::Degrade {
                cause: DegradeCause::Failure,
                ..
            } => self.stability.failure_penalty,
            StabilityEvent::Degrade {
                cause: DegradeCause::Unhealth,
                ..
            } => self.stability.unhealth_penalty,
            StabilityEvent::Recover { .. } => -self.stability.recovery_credit,
        };

        let mut txn = self.store.begin().await?;
        let Some(mut entry) = get_typed::<StabilityEntry>(txn.as_mut(), STABILITY_CACHE, &uri).await? else {
            tracing::debug!("Ignoring stability event for untracked {}", uri);
            return Ok(None);
        };

        let level = self.stability.clamp(entry.level.saturating_add(delta));
        if level == entry.level {
            return Ok(Some(level));
        }

        tracing::debug!("Stability of {}: {} -> {}", uri, entry.level, level);
        entry.level = level;
        put_typed(txn.as_mut(), STABILITY_CACHE, &uri, &entry)?;
        txn.commit().await?;

        self.publish_stability(&uri).await;
        Ok(Some(level))
    }

    // ============================================================
    // BACKGROUND CONSUMERS
    // ============================================================

    /// Re-runs local cache refreshes for hints sent by other nodes.
    pub fn spawn_hint_listener(self: &Arc<Self>, scheduler: &Scheduler) -> TaskHandle {
        let mut hints = self.messaging.listen();
        let registry = Arc::downgrade(self);

        scheduler.spawn("registry-hints", async move {
            loop {
                let hint = hints.recv().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                match hint {
                    Ok(RegistryHint::AvailableChanged { service_id }) => {
                        registry.available_cache_changed(&service_id).await;
                    }
                    Ok(RegistryHint::StabilityChanged { uri }) => {
                        registry.stability_cache_changed(Some(&uri)).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("Missed {} registry hints, resynchronizing", missed);
                        registry.resync().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn spawn_stability_listener(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<StabilityEvent>,
        scheduler: &Scheduler,
    ) -> TaskHandle {
        let registry = Arc::downgrade(self);

        scheduler.spawn("stability-events", async move {
            while let Some(event) = events.recv().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                if let Err(e) = registry.adjust_stability(&event).await {
                    tracing::warn!("Failed to adjust stability of {}: {}", event.url().identity(), e);
                }
            }
        })
    }
}

#[async_trait]
impl RegistryBackend for StoreBackedRegistry {
    async fn do_register(&self, url: ServiceDescriptor) -> RegistryResult<()> {
        let url = self.compose(url);
        let service_id = url.service_id().to_string();
        let uri = url.identity();

        {
            let _guard = self.op_lock.lock().await;
            let mut txn = self.store.begin().await?;

            let mut unavailable = load_set(txn.as_mut(), UNAVAILABLE_CACHE, &service_id).await?;
            unavailable.remove(&url);
            unavailable.insert(url.clone());
            let mut available = load_set(txn.as_mut(), AVAILABLE_CACHE, &service_id).await?;
            available.remove(&url);

            save_set(txn.as_mut(), UNAVAILABLE_CACHE, &service_id, &unavailable)?;
            save_set(txn.as_mut(), AVAILABLE_CACHE, &service_id, &available)?;
            put_typed(txn.as_mut(), STABILITY_CACHE, &uri, &self.nominal(&url))?;
            txn.commit().await?;
        }

        self.local.insert(uri.clone(), url);
        self.publish_available(&service_id).await;
        self.publish_stability(&uri).await;
        Ok(())
    }

    async fn do_unregister(&self, url: ServiceDescriptor) -> RegistryResult<()> {
        let service_id = url.service_id().to_string();
        let uri = url.identity();

        {
            let _guard = self.op_lock.lock().await;
            let mut txn = self.store.begin().await?;

            let mut unavailable = load_set(txn.as_mut(), UNAVAILABLE_CACHE, &service_id).await?;
            let mut available = load_set(txn.as_mut(), AVAILABLE_CACHE, &service_id).await?;
            unavailable.remove(&url);
            available.remove(&url);

            save_set(txn.as_mut(), UNAVAILABLE_CACHE, &service_id, &unavailable)?;
            save_set(txn.as_mut(), AVAILABLE_CACHE, &service_id, &available)?;
            txn.remove(STABILITY_CACHE, &uri);
            txn.commit().await?;
        }

        self.local.remove(&uri);
        self.publish_available(&service_id).await;
        self.publish_stability(&uri).await;
        Ok(())
    }

    async fn do_subscribe(&self, url: ServiceDescriptor, listener: Listener) -> RegistryResult<()> {
        self.listeners.insert(url.to_full_string(), (url, listener));
        Ok(())
    }

    async fn do_unsubscribe(&self, url: ServiceDescriptor, listener: Listener) -> RegistryResult<()> {
        self.listeners
            .remove_if(&url.to_full_string(), |_, (_, current)| same_listener(current, &listener));
        Ok(())
    }

    async fn do_discover(&self, url: ServiceDescriptor) -> RegistryResult<Vec<ServiceDescriptor>> {
        let service_id = url.service_id();
        if let Some(urls) = self.resolved.get(service_id) {
            return Ok(urls);
        }

        let urls = self.load_available(service_id).await?;
        self.resolved.replace(service_id, urls.clone());
        Ok(urls)
    }

    async fn do_available(&self, url: Option<ServiceDescriptor>) -> RegistryResult<()> {
        let grouped = group_by_service(self.targets(url));
        if grouped.is_empty() {
            return Ok(());
        }

        let mut touched = Vec::new();
        {
            let _guard = self.op_lock.lock().await;
            let mut txn = self.store.begin().await?;

            for (service_id, urls) in &grouped {
                let mut available = load_set(txn.as_mut(), AVAILABLE_CACHE, service_id).await?;
                let mut unavailable = load_set(txn.as_mut(), UNAVAILABLE_CACHE, service_id).await?;

                for url in urls {
                    // Keep the stored (composed) copy when there is one.
                    let stored = match unavailable.take(url).or_else(|| available.take(url)) {
                        Some(stored) => stored,
                        None => match self.local.get(&url.identity()) {
                            Some(local) => local.clone(),
                            None => self.compose(url.clone()),
                        },
                    };
                    let uri = stored.identity();
                    put_typed(txn.as_mut(), STABILITY_CACHE, &uri, &self.nominal(&stored))?;
                    available.insert(stored);
                    touched.push(uri);
                }

                save_set(txn.as_mut(), AVAILABLE_CACHE, service_id, &available)?;
                save_set(txn.as_mut(), UNAVAILABLE_CACHE, service_id, &unavailable)?;
            }
            txn.commit().await?;
        }

        tracing::info!("Marked {} descriptor(s) available", touched.len());
        for service_id in grouped.keys() {
            self.publish_available(service_id).await;
        }
        for uri in &touched {
            self.publish_stability(uri).await;
        }
        Ok(())
    }

    async fn do_unavailable(&self, url: Option<ServiceDescriptor>) -> RegistryResult<()> {
        let grouped = group_by_service(self.targets(url));
        if grouped.is_empty() {
            return Ok(());
        }

        let mut touched = Vec::new();
        {
            let _guard = self.op_lock.lock().await;
            let mut txn = self.store.begin().await?;

            for (service_id, urls) in &grouped {
                let mut available = load_set(txn.as_mut(), AVAILABLE_CACHE, service_id).await?;
                let mut unavailable = load_set(txn.as_mut(), UNAVAILABLE_CACHE, service_id).await?;

                for url in urls {
                    if let Some(stored) = available.take(url) {
                        unavailable.replace(stored);
                    }
                    let uri = url.identity();
                    txn.remove(STABILITY_CACHE, &uri);
                    touched.push(uri);
                }

                save_set(txn.as_mut(), AVAILABLE_CACHE, service_id, &available)?;
                save_set(txn.as_mut(), UNAVAILABLE_CACHE, service_id, &unavailable)?;
            }
            txn.commit().await?;
        }

        tracing::info!("Marked {} descriptor(s) unavailable", touched.len());
        for service_id in grouped.keys() {
            self.publish_available(service_id).await;
        }
        for uri in &touched {
            self.publish_stability(uri).await;
        }
        Ok(())
    }

    /// Scans every serviceId's available set; cost is O(total available descriptors).
    async fn do_unavailable_by_node(&self, node_consistent_id: String) -> RegistryResult<()> {
        let mut scanned = Vec::new();
        let mut removed = Vec::new();
        {
            let _guard = self.op_lock.lock().await;
            let mut txn = self.store.begin().await?;

            for service_id in txn.keys(AVAILABLE_CACHE).await? {
                let available = load_set(txn.as_mut(), AVAILABLE_CACHE, &service_id).await?;
                if available.is_empty() {
                    continue;
                }
                scanned.push(service_id.clone());

                let (departed, staying): (Vec<ServiceDescriptor>, Vec<ServiceDescriptor>) = available
                    .into_iter()
                    .partition(|d| d.parameter(NODE_CONSISTENT_ID) == Some(node_consistent_id.as_str()));
                if departed.is_empty() {
                    continue;
                }

                let mut unavailable = load_set(txn.as_mut(), UNAVAILABLE_CACHE, &service_id).await?;
                for url in departed {
                    let uri = url.identity();
                    txn.remove(STABILITY_CACHE, &uri);
                    removed.push(uri);
                    unavailable.replace(url);
                }

                let staying: DescriptorSet = staying.into_iter().collect();
                save_set(txn.as_mut(), AVAILABLE_CACHE, &service_id, &staying)?;
                save_set(txn.as_mut(), UNAVAILABLE_CACHE, &service_id, &unavailable)?;
            }
            txn.commit().await?;
        }

        tracing::info!(
            "Node {} departed: {} descriptor(s) moved to unavailable across {} service(s)",
            node_consistent_id,
            removed.len(),
            scanned.len()
        );
        for service_id in &scanned {
            self.publish_available(service_id).await;
        }
        for uri in &removed {
            self.publish_stability(uri).await;
        }
        Ok(())
    }
}

impl StabilityTracker for StoreBackedRegistry {
    fn tracked(&self) -> Vec<(ServiceDescriptor, i32)> {
        self.mirror
            .iter()
            .map(|e| (e.value().url.clone(), e.value().level))
            .collect()
    }

    fn level(&self, identity: &str) -> Option<i32> {
        self.mirror.get(identity).map(|e| e.level)
    }
}
