//! Worker pool: a fixed number of tokio tasks draining the [`TaskQueue`].
//!
//! Every dequeued task is checked and then replaced by a follow-up task for
//! the same source. A failed or timed-out check still produces a follow-up,
//! only later: the delay doubles with each consecutive failure up to the
//! configured cap.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use polo_core::ConfigHandle;
use polo_store::Store;

use crate::check::{CheckError, CheckOutcome, SourceCheck};
use crate::queue::{Task, TaskQueue};

/// Half the available processing units, rounded up.
pub fn default_worker_count() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.div_ceil(2).max(1)
}

/// Delay before the next check of a source after `failures` consecutive
/// failures. Zero failures means the regular poll interval.
pub fn next_delay(poll_interval: Duration, max_backoff: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return poll_interval;
    }
    let cap = max_backoff.max(poll_interval);
    let factor = 2u32.checked_pow(failures.min(31)).unwrap_or(u32::MAX);
    poll_interval
        .checked_mul(factor)
        .map_or(cap, |delay| delay.min(cap))
}

/// Everything a worker needs, shared by all workers.
pub struct WorkerContext<C> {
    pub queue: Arc<TaskQueue>,
    pub store: Arc<Store>,
    pub config: ConfigHandle,
    pub check: Arc<C>,
}

impl<C> Clone for WorkerContext<C> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            check: Arc::clone(&self.check),
        }
    }
}

/// How one task went.
#[derive(Debug)]
pub enum Attempt {
    Succeeded(CheckOutcome),
    Failed(CheckError),
    /// The source is no longer configured; no follow-up.
    Retired,
}

#[derive(Debug)]
pub struct Completed {
    pub attempt: Attempt,
    pub follow_up: Option<Task>,
}

/// Counters aggregated over all workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub checks: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub retired: u64,
}

impl PoolStats {
    fn record(&mut self, attempt: &Attempt) {
        match attempt {
            Attempt::Succeeded(_) => self.checks += 1,
            Attempt::Failed(err) => {
                self.checks += 1;
                self.failures += 1;
                if matches!(err, CheckError::TimedOut { .. }) {
                    self.timeouts += 1;
                }
            }
            Attempt::Retired => self.retired += 1,
        }
    }

    fn merge(&mut self, other: PoolStats) {
        self.checks += other.checks;
        self.failures += other.failures;
        self.timeouts += other.timeouts;
        self.retired += other.retired;
    }
}

impl<C: SourceCheck> WorkerContext<C> {
    /// Check one task and build its follow-up.
    ///
    /// The follow-up is returned, not queued, so callers decide what to do
    /// with it (the worker loop requeues it).
    pub async fn process(&self, task: Task) -> Completed {
        let config = self.config.current();
        if !config.contains_source(&task.source_id) {
            self.queue.retire(&task.source_id);
            tracing::info!(source = %task.source_id, "source no longer configured, retiring");
            return Completed {
                attempt: Attempt::Retired,
                follow_up: None,
            };
        }

        let settings = &config.settings;
        let limit = settings.check_timeout();
        let call = self.check.check(&task.source_id, &config, &self.store);
        let result = match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(CheckError::TimedOut {
                source_id: task.source_id.clone(),
                after: limit,
            }),
        };

        let (attempt, failures) = match result {
            Ok(outcome) => {
                if task.failures > 0 {
                    tracing::info!(
                        source = %task.source_id,
                        after_failures = task.failures,
                        "source check recovered",
                    );
                }
                tracing::debug!(source = %task.source_id, updated = outcome.updated, "source checked");
                (Attempt::Succeeded(outcome), 0)
            }
            Err(err) => (Attempt::Failed(err), task.failures.saturating_add(1)),
        };

        let evicted = self.store.prune();
        if evicted > 0 {
            tracing::debug!(evicted, bound = self.store.max_entries(), "store pruned");
        }

        let delay = next_delay(settings.poll_interval(), settings.max_backoff(), failures);
        if let Attempt::Failed(err) = &attempt {
            tracing::warn!(
                source = %task.source_id,
                failures,
                retry_in_secs = delay.as_secs(),
                error = %err,
                "source check failed",
            );
        }

        Completed {
            attempt,
            follow_up: Some(task.follow_up(delay, failures)),
        }
    }
}

/// Handles of the running workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<PoolStats>>,
}

impl WorkerPool {
    /// Spawn `workers` workers on the current tokio runtime.
    pub fn start<C: SourceCheck>(workers: usize, ctx: WorkerContext<C>) -> Self {
        let workers = workers.max(1);
        let handles = (0..workers)
            .map(|id| {
                let ctx = ctx.clone();
                tokio::spawn(async move { worker_loop(id, ctx).await })
            })
            .collect();
        tracing::info!(workers, "worker pool started");
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit. Workers exit once the queue is closed
    /// and their in-flight check has finished.
    pub async fn join(self) -> PoolStats {
        let mut total = PoolStats::default();
        for (id, handle) in self.handles.into_iter().enumerate() {
            match handle.await {
                Ok(stats) => total.merge(stats),
                Err(err) => tracing::error!(worker = id, error = %err, "worker task join failure"),
            }
        }
        total
    }
}

async fn worker_loop<C: SourceCheck>(id: usize, ctx: WorkerContext<C>) -> PoolStats {
    let mut stats = PoolStats::default();
    tracing::debug!(worker = id, "worker started");

    while let Some(task) = ctx.queue.dequeue().await {
        let completed = ctx.process(task).await;
        stats.record(&completed.attempt);

        if let Some(next) = completed.follow_up {
            let source = next.source_id.clone();
            if let Err(err) = ctx.queue.requeue(next) {
                tracing::debug!(worker = id, source = %source, error = %err, "follow-up not queued");
            }
        }
    }

    tracing::debug!(worker = id, checks = stats.checks, "worker stopped");
    stats
}
