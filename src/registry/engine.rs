use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;

use super::cache::SubscriptionCache;
use super::readiness::ReadinessSwitch;
use super::types::{Listener, Registry, RegistryBackend, RegistryResult};
use crate::descriptor::ServiceDescriptor;
use crate::executor::{Scheduler, TaskHandle};

/// Innermost layer of the registry chain.
///
/// Copies every argument before handing it to the backend, remembers what was
/// registered through this node, and ties the readiness switch to available /
/// unavailable.
pub struct RegistryCore {
    backend: Arc<dyn RegistryBackend>,
    cache: Arc<SubscriptionCache>,
    readiness: ReadinessSwitch,
    registered: DashSet<ServiceDescriptor>,
}

impl RegistryCore {
    pub fn new(
        backend: Arc<dyn RegistryBackend>,
        cache: Arc<SubscriptionCache>,
        readiness: ReadinessSwitch,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            cache,
            readiness,
            registered: DashSet::new(),
        })
    }

    /// Descriptors registered through this node and not yet unregistered.
    pub fn registered(&self) -> Vec<ServiceDescriptor> {
        self.registered.iter().map(|d| d.key().clone()).collect()
    }

    pub fn readiness(&self) -> &ReadinessSwitch {
        &self.readiness
    }

    /// Follows the readiness switch: on -> `available(None)`, off -> `unavailable(None)`.
    pub fn watch_readiness(self: &Arc<Self>, scheduler: &Scheduler) -> TaskHandle {
        let mut changes = self.readiness.watch();
        let core = Arc::downgrade(self);

        scheduler.spawn("readiness-listener", async move {
            while changes.changed().await.is_ok() {
                let on = *changes.borrow_and_update();
                let Some(core) = core.upgrade() else {
                    break;
                };

                let result = if on {
                    core.available(None).await
                } else {
                    core.unavailable(None).await
                };
                if let Err(e) = result {
                    tracing::error!(
                        "Failed to mark local services {} after readiness change: {}",
                        if on { "available" } else { "unavailable" },
                        e
                    );
                }
            }
        })
    }
}

#[async_trait]
impl Registry for RegistryCore {
    async fn register(&self, url: &ServiceDescriptor) -> RegistryResult<()> {
        if !url.is_well_formed() {
            tracing::warn!("Ignoring register of malformed descriptor {}", url);
            return Ok(());
        }

        self.registered.insert(url.clone());
        self.backend.do_register(url.clone()).await?;
        tracing::debug!("Registered {}", url);

        if self.readiness.is_on() {
            self.available(Some(url)).await?;
        }
        Ok(())
    }

    async fn unregister(&self, url: &ServiceDescriptor) -> RegistryResult<()> {
        if !url.is_well_formed() {
            tracing::warn!("Ignoring unregister of malformed descriptor {}", url);
            return Ok(());
        }

        self.registered.remove(url);
        self.backend.do_unregister(url.clone()).await?;
        tracing::debug!("Unregistered {}", url);
        Ok(())
    }

    async fn subscribe(&self, url: &ServiceDescriptor, listener: Listener) -> RegistryResult<()> {
        if !url.is_well_formed() {
            tracing::warn!("Ignoring subscribe with malformed query {}", url);
            return Ok(());
        }
        self.backend.do_subscribe(url.clone(), listener).await
    }

    async fn unsubscribe(&self, url: &ServiceDescriptor, listener: Listener) -> RegistryResult<()> {
        if !url.is_well_formed() {
            tracing::warn!("Ignoring unsubscribe with malformed query {}", url);
            return Ok(());
        }
        self.backend.do_unsubscribe(url.clone(), listener).await
    }

    async fn discover(&self, url: &ServiceDescriptor) -> RegistryResult<Vec<ServiceDescriptor>> {
        if !url.is_well_formed() {
            return Ok(Vec::new());
        }

        let cached = self.cache.get(url);
        if !cached.is_empty() {
            return Ok(cached);
        }

        let found = self.backend.do_discover(url.clone()).await?;
        Ok(found.into_iter().filter(|d| url.accepts(d)).collect())
    }

    async fn available(&self, url: Option<&ServiceDescriptor>) -> RegistryResult<()> {
        self.backend.do_available(url.cloned()).await
    }

    async fn unavailable(&self, url: Option<&ServiceDescriptor>) -> RegistryResult<()> {
        self.backend.do_unavailable(url.cloned()).await
    }

    async fn unavailable_by_node(&self, node_consistent_id: &str) -> RegistryResult<()> {
        self.backend
            .do_unavailable_by_node(node_consistent_id.to_string())
            .await
    }
}
