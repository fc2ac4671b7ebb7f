use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::descriptor::{DescriptorError, ServiceDescriptor};
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("backend failure: {0}")]
    Backend(String),

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),

    /// A crucial descriptor's operation failed and was not queued for retry.
    #[error("failed to {operation} {url}: {source}")]
    Fatal {
        operation: &'static str,
        url: String,
        #[source]
        source: Box<RegistryError>,
    },
}

impl RegistryError {
    pub fn fatal(operation: &'static str, url: &ServiceDescriptor, source: RegistryError) -> Self {
        Self::Fatal {
            operation,
            url: url.to_full_string(),
            source: Box::new(source),
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Receives the current matching descriptor list for a subscription.
///
/// Backend changes are delivered from a blocking-pool thread, one delivery at a time per
/// serviceId. The initial snapshot on subscribe is delivered on the caller's task.
pub trait NotifyListener: Send + Sync {
    fn notify(&self, urls: Vec<ServiceDescriptor>);
}

impl<F> NotifyListener for F
where
    F: Fn(Vec<ServiceDescriptor>) + Send + Sync,
{
    fn notify(&self, urls: Vec<ServiceDescriptor>) {
        self(urls)
    }
}

pub type Listener = Arc<dyn NotifyListener>;

/// Listener identity is the allocation, not the value.
pub fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// The public registry surface. `RegistryCore`, `NotifyRegistry` and `FallbackRegistry`
/// all implement it and are chained by composition.
///
/// `available(None)` / `unavailable(None)` mean "every descriptor registered through
/// this node".
#[async_trait]
pub trait Registry: Send + Sync {
    async fn register(&self, url: &ServiceDescriptor) -> RegistryResult<()>;

    async fn unregister(&self, url: &ServiceDescriptor) -> RegistryResult<()>;

    async fn subscribe(&self, url: &ServiceDescriptor, listener: Listener) -> RegistryResult<()>;

    async fn unsubscribe(&self, url: &ServiceDescriptor, listener: Listener) -> RegistryResult<()>;

    async fn discover(&self, url: &ServiceDescriptor) -> RegistryResult<Vec<ServiceDescriptor>>;

    async fn available(&self, url: Option<&ServiceDescriptor>) -> RegistryResult<()>;

    async fn unavailable(&self, url: Option<&ServiceDescriptor>) -> RegistryResult<()>;

    async fn unavailable_by_node(&self, node_consistent_id: &str) -> RegistryResult<()>;
}

/// Storage-facing primitives. Arguments are owned copies; implementations never see
/// caller-owned state.
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    async fn do_register(&self, url: ServiceDescriptor) -> RegistryResult<()>;

    async fn do_unregister(&self, url: ServiceDescriptor) -> RegistryResult<()>;

    /// Installs `listener` as the service listener for this query.
    async fn do_subscribe(&self, url: ServiceDescriptor, listener: Listener) -> RegistryResult<()>;

    async fn do_unsubscribe(&self, url: ServiceDescriptor, listener: Listener) -> RegistryResult<()>;

    /// Every available descriptor for the query's serviceId, unfiltered.
    async fn do_discover(&self, url: ServiceDescriptor) -> RegistryResult<Vec<ServiceDescriptor>>;

    async fn do_available(&self, url: Option<ServiceDescriptor>) -> RegistryResult<()>;

    async fn do_unavailable(&self, url: Option<ServiceDescriptor>) -> RegistryResult<()>;

    async fn do_unavailable_by_node(&self, node_consistent_id: String) -> RegistryResult<()>;
}

/// Circuit-breaker hook consulted when a degraded descriptor recovers to nominal.
pub trait CircuitBreaker: Send + Sync {
    fn half_open(&self, url: &ServiceDescriptor);
}

/// Default breaker: records the transition in the log only.
#[derive(Debug, Default)]
pub struct LoggingCircuitBreaker;

impl CircuitBreaker for LoggingCircuitBreaker {
    fn half_open(&self, url: &ServiceDescriptor) {
        tracing::info!("Half-open retry for {}", url.identity());
    }
}
