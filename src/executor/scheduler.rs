//! Recurring task scheduler.
//!
//! Every background loop in the registry (heartbeat ticks, fallback retries, event
//! consumers) is spawned through here so it can be stopped explicitly. Timing uses
//! `tokio::time`, so tests drive it with a paused clock.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};

/// Cancels one scheduled task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: String,
    abort: AbortHandle,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        self.abort.abort();
        tracing::debug!("Cancelled scheduled task '{}'", self.name);
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

#[derive(Default)]
pub struct Scheduler {
    tasks: Mutex<Vec<TaskHandle>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` every `period`, first run one period from now. Runs never overlap:
    /// the next tick waits for the previous run to finish.
    pub fn spawn_periodic<F, Fut>(&self, name: &str, period: Duration, task: F) -> TaskHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                task().await;
            }
        });

        tracing::info!("Scheduled '{}' every {:?}", task_name, period);
        self.track(task_name, handle)
    }

    /// Runs a long-lived future (typically an event consumer loop).
    pub fn spawn<Fut>(&self, name: &str, future: Fut) -> TaskHandle
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.track(name.to_string(), handle)
    }

    pub fn active(&self) -> usize {
        self.lock_tasks().iter().filter(|t| !t.is_finished()).count()
    }

    /// Cancels every task still tracked by this scheduler.
    pub fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.lock_tasks());
        for task in &tasks {
            task.abort.abort();
        }
        tracing::info!("Scheduler stopped {} task(s)", tasks.len());
    }

    fn track(&self, name: String, handle: JoinHandle<()>) -> TaskHandle {
        let task = TaskHandle {
            name,
            abort: handle.abort_handle(),
        };
        self.lock_tasks().push(task.clone());
        task
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<TaskHandle>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
