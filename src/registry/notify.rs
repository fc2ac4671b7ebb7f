use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use super::cache::SubscriptionCache;
use super::types::{Listener, NotifyListener, Registry, RegistryResult, same_listener};
use crate::descriptor::ServiceDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(pub u64);

/// Listener set for one distinct subscription query.
struct SubscriberManager {
    query: ServiceDescriptor,
    listeners: RwLock<Vec<Listener>>,
    /// Handed to the backend as the service listener. Created once so repeated
    /// subscribes install the same listener.
    handle: Listener,
}

/// Owns every manager. Managers are addressed by `ManagerId`; nothing outside the
/// arena holds a manager directly.
pub struct ManagerArena {
    managers: DashMap<ManagerId, Arc<SubscriberManager>>,
    cache: Arc<SubscriptionCache>,
    service_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ManagerArena {
    fn new(cache: Arc<SubscriptionCache>) -> Self {
        Self {
            managers: DashMap::new(),
            cache,
            service_locks: DashMap::new(),
        }
    }

    fn manager(&self, id: ManagerId) -> Option<Arc<SubscriberManager>> {
        self.managers.get(&id).map(|m| m.value().clone())
    }

    fn service_lock(&self, service_id: &str) -> Arc<Mutex<()>> {
        self.service_locks
            .entry(service_id.to_string())
            .or_default()
            .clone()
    }

    /// Fans a backend notification out to one manager's listeners, one serviceId at a time.
    ///
    /// Runs on the backend's blocking delivery threads, so holding the std mutex while
    /// listeners run never parks a runtime worker.
    fn deliver(&self, id: ManagerId, urls: Vec<ServiceDescriptor>) {
        let Some(manager) = self.manager(id) else {
            tracing::warn!("Notification for unknown subscriber manager {:?}", id);
            return;
        };

        let mut by_service: BTreeMap<String, Vec<ServiceDescriptor>> = BTreeMap::new();
        for url in urls {
            by_service
                .entry(url.service_id().to_string())
                .or_default()
                .push(url);
        }
        // An empty list still means "nothing is available" for the subscribed serviceId.
        if by_service.is_empty() {
            by_service.insert(manager.query.service_id().to_string(), Vec::new());
        }

        for (service_id, urls) in by_service {
            let lock = self.service_lock(&service_id);
            let _guard = match lock.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };

            let matching: Vec<ServiceDescriptor> = urls
                .into_iter()
                .filter(|url| manager.query.accepts(url))
                .collect();
            self.cache
                .update(&manager.query, &service_id, matching.clone());

            let listeners = match manager.listeners.read() {
                Ok(listeners) => listeners.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            };
            tracing::debug!(
                "Notifying {} listener(s) of {} with {} url(s)",
                listeners.len(),
                manager.query,
                matching.len()
            );
            for listener in listeners {
                listener.notify(matching.clone());
            }
        }
    }
}

/// The backend-facing side of a manager: carries only the id back into the arena.
struct ManagerHandle {
    id: ManagerId,
    arena: Weak<ManagerArena>,
}

impl NotifyListener for ManagerHandle {
    fn notify(&self, urls: Vec<ServiceDescriptor>) {
        if let Some(arena) = self.arena.upgrade() {
            arena.deliver(self.id, urls);
        }
    }
}

/// Aggregates listeners per subscription query and pushes discovery changes to them.
pub struct NotifyRegistry {
    inner: Arc<dyn Registry>,
    arena: Arc<ManagerArena>,
    by_query: DashMap<String, ManagerId>,
    next_id: AtomicU64,
}

impl NotifyRegistry {
    pub fn new(inner: Arc<dyn Registry>, cache: Arc<SubscriptionCache>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            arena: Arc::new(ManagerArena::new(cache)),
            by_query: DashMap::new(),
            next_id: AtomicU64::new(1),
        })
    }

    fn manager_for(&self, query: &ServiceDescriptor) -> Arc<SubscriberManager> {
        let id = *self
            .by_query
            .entry(query.to_full_string())
            .or_insert_with(|| ManagerId(self.next_id.fetch_add(1, Ordering::SeqCst)));

        self.arena
            .managers
            .entry(id)
            .or_insert_with(|| {
                tracing::debug!("Created subscriber manager {:?} for {}", id, query);
                let handle: Listener = Arc::new(ManagerHandle {
                    id,
                    arena: Arc::downgrade(&self.arena),
                });
                Arc::new(SubscriberManager {
                    query: query.clone(),
                    listeners: RwLock::new(Vec::new()),
                    handle,
                })
            })
            .value()
            .clone()
    }

    /// Number of listeners currently attached to this query.
    pub fn listener_count(&self, query: &ServiceDescriptor) -> usize {
        let Some(id) = self.by_query.get(&query.to_full_string()).map(|id| *id) else {
            return 0;
        };
        self.arena
            .manager(id)
            .map(|m| match m.listeners.read() {
                Ok(listeners) => listeners.len(),
                Err(poisoned) => poisoned.into_inner().len(),
            })
            .unwrap_or(0)
    }

    pub fn manager_count(&self) -> usize {
        self.by_query.len()
    }
}

#[async_trait]
impl Registry for NotifyRegistry {
    async fn register(&self, url: &ServiceDescriptor) -> RegistryResult<()> {
        self.inner.register(url).await
    }

    async fn unregister(&self, url: &ServiceDescriptor) -> RegistryResult<()> {
        self.inner.unregister(url).await
    }

    async fn subscribe(&self, url: &ServiceDescriptor, listener: Listener) -> RegistryResult<()> {
        if !url.is_well_formed() {
            tracing::warn!("Ignoring subscribe with malformed query {}", url);
            return Ok(());
        }

        let manager = self.manager_for(url);
        self.inner.subscribe(url, manager.handle.clone()).await?;

        {
            let mut listeners = match manager.listeners.write() {
                Ok(listeners) => listeners,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !listeners.iter().any(|l| same_listener(l, &listener)) {
                listeners.push(listener.clone());
            }
        }

        let snapshot = match self.inner.discover(url).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!("Initial discovery for {} failed: {}", url, e);
                Vec::new()
            }
        };
        listener.notify(snapshot);
        Ok(())
    }

    async fn unsubscribe(&self, url: &ServiceDescriptor, listener: Listener) -> RegistryResult<()> {
        let Some(id) = self.by_query.get(&url.to_full_string()).map(|id| *id) else {
            return Ok(());
        };
        if let Some(manager) = self.arena.manager(id) {
            let mut listeners = match manager.listeners.write() {
                Ok(listeners) => listeners,
                Err(poisoned) => poisoned.into_inner(),
            };
            listeners.retain(|l| !same_listener(l, &listener));
        }
        Ok(())
    }

    async fn discover(&self, url: &ServiceDescriptor) -> RegistryResult<Vec<ServiceDescriptor>> {
        self.inner.discover(url).await
    }

    async fn available(&self, url: Option<&ServiceDescriptor>) -> RegistryResult<()> {
        self.inner.available(url).await
    }

    async fn unavailable(&self, url: Option<&ServiceDescriptor>) -> RegistryResult<()> {
        self.inner.unavailable(url).await
    }

    async fn unavailable_by_node(&self, node_consistent_id: &str) -> RegistryResult<()> {
        self.inner.unavailable_by_node(node_consistent_id).await
    }
}
