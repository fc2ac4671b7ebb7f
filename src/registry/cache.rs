use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::types::Listener;
use crate::descriptor::ServiceDescriptor;

/// Last notified result per subscription, partitioned by serviceId.
///
/// Written by the notify layer on every delivery, read by discovery (served from here
/// before falling back to the backend) and by the fallback layer as degraded data when
/// a subscribe fails. Keyed by the query's full text so queries that differ only in
/// parameters keep separate entries.
#[derive(Default)]
pub struct SubscriptionCache {
    entries: DashMap<String, DashMap<String, Vec<ServiceDescriptor>>>,
}

impl SubscriptionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every cached descriptor for this query across all serviceIds.
    pub fn get(&self, query: &ServiceDescriptor) -> Vec<ServiceDescriptor> {
        let Some(by_service) = self.entries.get(&query.to_full_string()) else {
            return Vec::new();
        };
        by_service
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    pub fn update(&self, query: &ServiceDescriptor, service_id: &str, urls: Vec<ServiceDescriptor>) {
        self.entries
            .entry(query.to_full_string())
            .or_default()
            .insert(service_id.to_string(), urls);
    }

    pub fn remove(&self, query: &ServiceDescriptor) {
        self.entries.remove(&query.to_full_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The backend's resolved available list per serviceId, plus the delivery path that
/// pushes it to service listeners.
///
/// Deliveries for one serviceId are serialized and each one reads the list after taking
/// the lock, so whatever order notify jobs run in, the last delivery carries the newest
/// list. Listeners run on the blocking pool and may take their time without parking
/// runtime workers.
#[derive(Default)]
pub struct ResolvedLists {
    lists: DashMap<String, Vec<ServiceDescriptor>>,
    delivery: DashMap<String, Arc<Mutex<()>>>,
}

impl ResolvedLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, service_id: &str) -> Option<Vec<ServiceDescriptor>> {
        self.lists.get(service_id).map(|urls| urls.clone())
    }

    /// Stores the latest list and returns the one it replaced.
    pub fn replace(&self, service_id: &str, urls: Vec<ServiceDescriptor>) -> Option<Vec<ServiceDescriptor>> {
        self.lists.insert(service_id.to_string(), urls)
    }

    pub fn service_ids(&self) -> Vec<String> {
        self.lists.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Hands the current list of `service_id` to `listener`.
    pub async fn deliver(&self, service_id: &str, listener: &Listener) {
        let lock = self
            .delivery
            .entry(service_id.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let urls = self.get(service_id).unwrap_or_default();
        let listener = listener.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || listener.notify(urls)).await {
            tracing::warn!("Listener of {} failed: {}", service_id, e);
        }
    }
}
