use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;

use super::cache::SubscriptionCache;
use super::types::{Listener, Registry, RegistryError, RegistryResult, same_listener};
use crate::descriptor::ServiceDescriptor;
use crate::descriptor::params::CRUCIAL_CHECK;

/// Listeners still waiting for a (un)subscribe of one query to go through.
#[derive(Clone)]
struct PendingSubscription {
    url: ServiceDescriptor,
    listeners: Vec<Listener>,
}

type PendingSubscriptions = DashMap<String, PendingSubscription>;

fn is_crucial(url: &ServiceDescriptor) -> bool {
    url.bool_parameter(CRUCIAL_CHECK, true)
}

fn enqueue(queue: &PendingSubscriptions, url: &ServiceDescriptor, listener: &Listener) {
    let mut pending = queue
        .entry(url.to_full_string())
        .or_insert_with(|| PendingSubscription {
            url: url.clone(),
            listeners: Vec::new(),
        });
    if !pending.listeners.iter().any(|l| same_listener(l, listener)) {
        pending.listeners.push(listener.clone());
    }
}

fn dequeue(queue: &PendingSubscriptions, url: &ServiceDescriptor, listener: &Listener) {
    let key = url.to_full_string();
    if let Some(mut pending) = queue.get_mut(&key) {
        pending.listeners.retain(|l| !same_listener(l, listener));
    }
    queue.remove_if(&key, |_, pending| pending.listeners.is_empty());
}

fn pending_count(queue: &PendingSubscriptions) -> usize {
    queue.iter().map(|p| p.listeners.len()).sum()
}

/// Outermost layer: best-effort delivery.
///
/// Failed register/unregister/subscribe/unsubscribe calls of non-crucial descriptors are
/// queued and replayed by `retry`, which the owner runs on a fixed period. Crucial
/// descriptors (`crucialCheck`, default true) surface the failure as `RegistryError::Fatal`.
pub struct FallbackRegistry {
    inner: Arc<dyn Registry>,
    cache: Arc<SubscriptionCache>,
    failed_registered: DashSet<ServiceDescriptor>,
    failed_unregistered: DashSet<ServiceDescriptor>,
    failed_subscribed: PendingSubscriptions,
    failed_unsubscribed: PendingSubscriptions,
}

impl FallbackRegistry {
    pub fn new(inner: Arc<dyn Registry>, cache: Arc<SubscriptionCache>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            cache,
            failed_registered: DashSet::new(),
            failed_unregistered: DashSet::new(),
            failed_subscribed: DashMap::new(),
            failed_unsubscribed: DashMap::new(),
        })
    }

    pub fn pending_registrations(&self) -> Vec<ServiceDescriptor> {
        self.failed_registered.iter().map(|d| d.key().clone()).collect()
    }

    pub fn pending_unregistrations(&self) -> Vec<ServiceDescriptor> {
        self.failed_unregistered.iter().map(|d| d.key().clone()).collect()
    }

    pub fn pending_subscriptions(&self) -> usize {
        pending_count(&self.failed_subscribed)
    }

    pub fn pending_unsubscriptions(&self) -> usize {
        pending_count(&self.failed_unsubscribed)
    }

    /// One retry pass: registers, then unregisters, then subscribes, then unsubscribes.
    /// The first failure in a queue ends that queue for this pass.
    pub async fn retry(&self) {
        self.retry_registered().await;
        self.retry_unregistered().await;
        self.retry_subscribed().await;
        self.retry_unsubscribed().await;
    }

    async fn retry_registered(&self) {
        let pending = self.pending_registrations();
        if pending.is_empty() {
            return;
        }
        tracing::info!("Retrying {} failed registration(s)", pending.len());

        for url in pending {
            match self.inner.register(&url).await {
                Ok(()) => {
                    self.failed_registered.remove(&url);
                }
                Err(e) => {
                    tracing::warn!("Retry register of {} failed: {}", url, e);
                    break;
                }
            }
        }
    }

    async fn retry_unregistered(&self) {
        let pending = self.pending_unregistrations();
        if pending.is_empty() {
            return;
        }
        tracing::info!("Retrying {} failed unregistration(s)", pending.len());

        for url in pending {
            match self.inner.unregister(&url).await {
                Ok(()) => {
                    self.failed_unregistered.remove(&url);
                }
                Err(e) => {
                    tracing::warn!("Retry unregister of {} failed: {}", url, e);
                    break;
                }
            }
        }
    }

    async fn retry_subscribed(&self) {
        let pending: Vec<PendingSubscription> =
            self.failed_subscribed.iter().map(|p| p.value().clone()).collect();
        if pending.is_empty() {
            return;
        }
        tracing::info!("Retrying {} failed subscription(s)", pending_count(&self.failed_subscribed));

        'queue: for entry in pending {
            for listener in entry.listeners {
                match self.inner.subscribe(&entry.url, listener.clone()).await {
                    Ok(()) => dequeue(&self.failed_subscribed, &entry.url, &listener),
                    Err(e) => {
                        tracing::warn!("Retry subscribe of {} failed: {}", entry.url, e);
                        break 'queue;
                    }
                }
            }
        }
    }

    async fn retry_unsubscribed(&self) {
        let pending: Vec<PendingSubscription> =
            self.failed_unsubscribed.iter().map(|p| p.value().clone()).collect();
        if pending.is_empty() {
            return;
        }
        tracing::info!("Retrying {} failed unsubscription(s)", pending_count(&self.failed_unsubscribed));

        'queue: for entry in pending {
            for listener in entry.listeners {
                match self.inner.unsubscribe(&entry.url, listener.clone()).await {
                    Ok(()) => dequeue(&self.failed_unsubscribed, &entry.url, &listener),
                    Err(e) => {
                        tracing::warn!("Retry unsubscribe of {} failed: {}", entry.url, e);
                        break 'queue;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Registry for FallbackRegistry {
    async fn register(&self, url: &ServiceDescriptor) -> RegistryResult<()> {
        if !url.is_well_formed() {
            tracing::warn!("Ignoring register of malformed descriptor {}", url);
            return Ok(());
        }

        self.failed_registered.remove(url);
        self.failed_unregistered.remove(url);

        if let Err(e) = self.inner.register(url).await {
            if is_crucial(url) {
                tracing::error!("Failed to register crucial descriptor {}: {}", url, e);
                return Err(RegistryError::fatal("register", url, e));
            }
            tracing::warn!("Failed to register {}, queued for retry: {}", url, e);
            self.failed_unregistered.remove(url);
            self.failed_registered.insert(url.clone());
        }
        Ok(())
    }

    async fn unregister(&self, url: &ServiceDescriptor) -> RegistryResult<()> {
        if !url.is_well_formed() {
            tracing::warn!("Ignoring unregister of malformed descriptor {}", url);
            return Ok(());
        }

        self.failed_registered.remove(url);
        self.failed_unregistered.remove(url);

        if let Err(e) = self.inner.unregister(url).await {
            if is_crucial(url) {
                tracing::error!("Failed to unregister crucial descriptor {}: {}", url, e);
                return Err(RegistryError::fatal("unregister", url, e));
            }
            tracing::warn!("Failed to unregister {}, queued for retry: {}", url, e);
            self.failed_registered.remove(url);
            self.failed_unregistered.insert(url.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, url: &ServiceDescriptor, listener: Listener) -> RegistryResult<()> {
        if !url.is_well_formed() {
            tracing::warn!("Ignoring subscribe with malformed query {}", url);
            return Ok(());
        }

        dequeue(&self.failed_subscribed, url, &listener);
        dequeue(&self.failed_unsubscribed, url, &listener);

        let Err(e) = self.inner.subscribe(url, listener.clone()).await else {
            return Ok(());
        };

        let cached = self.cache.get(url);
        if !cached.is_empty() {
            tracing::warn!(
                "Failed to subscribe {}, serving {} cached url(s) and retrying: {}",
                url,
                cached.len(),
                e
            );
            listener.notify(cached);
        } else if is_crucial(url) {
            tracing::error!("Failed to subscribe crucial query {}: {}", url, e);
            return Err(RegistryError::fatal("subscribe", url, e));
        } else {
            tracing::warn!("Failed to subscribe {}, queued for retry: {}", url, e);
        }
        enqueue(&self.failed_subscribed, url, &listener);
        Ok(())
    }

    async fn unsubscribe(&self, url: &ServiceDescriptor, listener: Listener) -> RegistryResult<()> {
        if !url.is_well_formed() {
            tracing::warn!("Ignoring unsubscribe with malformed query {}", url);
            return Ok(());
        }

        dequeue(&self.failed_subscribed, url, &listener);
        dequeue(&self.failed_unsubscribed, url, &listener);

        let Err(e) = self.inner.unsubscribe(url, listener.clone()).await else {
            return Ok(());
        };

        let cached = self.cache.get(url);
        if !cached.is_empty() {
            tracing::warn!("Failed to unsubscribe {}, queued for retry: {}", url, e);
            listener.notify(cached);
        } else if is_crucial(url) {
            tracing::error!("Failed to unsubscribe crucial query {}: {}", url, e);
            return Err(RegistryError::fatal("unsubscribe", url, e));
        } else {
            tracing::warn!("Failed to unsubscribe {}, queued for retry: {}", url, e);
        }
        enqueue(&self.failed_unsubscribed, url, &listener);
        Ok(())
    }

    async fn discover(&self, url: &ServiceDescriptor) -> RegistryResult<Vec<ServiceDescriptor>> {
        match self.inner.discover(url).await {
            Ok(urls) => Ok(urls),
            Err(e) => {
                tracing::warn!("Discovery of {} failed, returning nothing: {}", url, e);
                Ok(Vec::new())
            }
        }
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
