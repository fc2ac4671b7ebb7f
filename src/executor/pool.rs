//! Bounded Worker Pool
//!
//! Fire-and-forget job runner with a fixed-depth queue. Used for heartbeat probes and
//! subscriber notification.
//!
//! ## Responsibilities
//! - **Bounding**: at most `max_workers` jobs run at once and at most `queue_capacity`
//!   wait. A submit against a full queue is rejected, never blocks.
//! - **Growth**: starts `min_workers` workers and adds one whenever a job is queued while
//!   no worker is idle, up to `max_workers`.
//! - **Isolation**: each job runs in its own task so a panicking job only loses itself.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 4,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool {0} is saturated")]
    Saturated(String),
    #[error("worker pool {0} is shut down")]
    Shutdown(String),
}

pub struct WorkerPool {
    name: String,
    config: PoolConfig,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    idle: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Creates the pool and spawns its `min_workers`. Must be called inside a runtime.
    pub fn new(name: &str, config: PoolConfig) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let pool = Arc::new(Self {
            name: name.to_string(),
            config,
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            workers: Mutex::new(Vec::new()),
            idle: Arc::new(AtomicUsize::new(0)),
        });

        for _ in 0..pool.config.min_workers.max(1) {
            pool.spawn_worker();
        }

        tracing::info!(
            "Worker pool '{}' started ({}..{} workers, queue {})",
            pool.name,
            pool.config.min_workers,
            pool.config.max_workers,
            pool.config.queue_capacity
        );

        pool
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues a job. Returns `Saturated` when the queue is full; the job is dropped.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
        .ok_or_else(|| PoolError::Shutdown(self.name.clone()))?;

        match sender.try_send(Box::pin(job)) {
            Ok(()) => {
                if self.idle.load(Ordering::SeqCst) == 0 && self.worker_count() < self.config.max_workers {
                    self.spawn_worker();
                }
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(PoolError::Saturated(self.name.clone())),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PoolError::Shutdown(self.name.clone())),
        }
    }

    pub fn worker_count(&self) -> usize {
        match self.workers.lock() {
            Ok(workers) => workers.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Stops accepting jobs and aborts every worker. Queued jobs are discarded.
    pub fn shutdown(&self) {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let workers = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for worker in &workers {
            worker.abort();
        }

        tracing::info!("Worker pool '{}' stopped ({} workers)", self.name, workers.len());
    }

    fn spawn_worker(&self) {
        let mut workers = match self.workers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if workers.len() >= self.config.max_workers.max(1) {
            return;
        }

        let worker_id = workers.len();
        let receiver = self.receiver.clone();
        let idle = self.idle.clone();
        let name = self.name.clone();

        workers.push(tokio::spawn(async move {
            worker_loop(name, worker_id, receiver, idle).await;
        }));
    }
}

/// Pulls jobs until the queue closes. Each job runs in its own task.
async fn worker_loop(
    name: String,
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    idle: Arc<AtomicUsize>,
) {
    tracing::debug!("Worker {}#{} started", name, worker_id);

    loop {
        idle.fetch_add(1, Ordering::SeqCst);
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        idle.fetch_sub(1, Ordering::SeqCst);

        let Some(job) = job else {
            break;
        };

        if let Err(e) = tokio::spawn(job).await {
            tracing::error!("Job on {}#{} failed: {}", name, worker_id, e);
        }
    }

    tracing::debug!("Worker {}#{} stopped", name, worker_id);
}
