//! Task queue shared by the worker pool.
//!
//! Each configured source has at most one live [`Task`]: it is either queued
//! or held by exactly one worker. Ready tasks are handed out in the order
//! they were queued; a task that is not yet due never blocks a ready one
//! behind it.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{sleep_until, timeout_at, Instant};

use polo_core::SourceId;

use crate::paths::{ENQUEUE_WAIT, QUEUE_CAPACITY};

/// A unit of work: check `source_id`, not before `not_before`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub source_id: SourceId,
    pub not_before: Instant,
    /// Consecutive failed checks of this source so far.
    pub failures: u32,
}

impl Task {
    /// A task that is due immediately.
    pub fn now(source_id: impl Into<SourceId>) -> Self {
        Self {
            source_id: source_id.into(),
            not_before: Instant::now(),
            failures: 0,
        }
    }

    /// The next task for the same source, due `delay` from now.
    pub fn follow_up(&self, delay: Duration, failures: u32) -> Self {
        Self {
            source_id: self.source_id.clone(),
            not_before: Instant::now() + delay,
            failures,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("task queue is closed")]
    Closed,

    #[error("source '{0}' already has a live task")]
    Duplicate(SourceId),

    #[error("source '{0}' is not held by a worker")]
    NotHeld(SourceId),

    #[error("task queue is full ({capacity} live sources)")]
    Full { capacity: usize },
}

#[derive(Debug, Default)]
struct QueueState {
    queued: VecDeque<Task>,
    /// Sources with a task either queued or held.
    live: HashSet<SourceId>,
    /// Sources whose task is currently owned by a worker.
    held: HashSet<SourceId>,
    closed: bool,
}

#[derive(Debug)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
    ready: Notify,
    space: Notify,
    capacity: usize,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            ready: Notify::new(),
            space: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Queue the first task for a source.
    ///
    /// Waits at most [`ENQUEUE_WAIT`] for a free slot. A source that already
    /// has a live task is refused with [`QueueError::Duplicate`].
    pub async fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        let deadline = Instant::now() + ENQUEUE_WAIT;
        loop {
            let space = self.space.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(QueueError::Closed);
                }
                if state.live.contains(&task.source_id) {
                    return Err(QueueError::Duplicate(task.source_id));
                }
                if state.live.len() < self.capacity {
                    state.live.insert(task.source_id.clone());
                    state.queued.push_back(task);
                    drop(state);
                    self.ready.notify_one();
                    return Ok(());
                }
            }

            if timeout_at(deadline, space).await.is_err() {
                return Err(QueueError::Full {
                    capacity: self.capacity,
                });
            }
        }
    }

    /// Hand the follow-up of a held task back to the queue.
    ///
    /// Never waits: the source's slot stayed reserved while it was held. After
    /// [`TaskQueue::close`] the source is released and `Closed` is returned.
    pub fn requeue(&self, task: Task) -> Result<(), QueueError> {
        let mut state = self.lock();
        if !state.held.remove(&task.source_id) {
            return Err(QueueError::NotHeld(task.source_id));
        }
        if state.closed {
            state.live.remove(&task.source_id);
            drop(state);
            self.space.notify_one();
            return Err(QueueError::Closed);
        }
        state.queued.push_back(task);
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Release a source for good (it left the configuration).
    pub fn retire(&self, source_id: &SourceId) -> bool {
        let mut state = self.lock();
        state.held.remove(source_id);
        state.queued.retain(|t| &t.source_id != source_id);
        let removed = state.live.remove(source_id);
        drop(state);
        if removed {
            self.space.notify_one();
        }
        removed
    }

    /// Wait for the next due task. `None` means the queue was closed and the
    /// worker should exit.
    pub async fn dequeue(&self) -> Option<Task> {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                let now = Instant::now();
                if let Some(idx) = state.queued.iter().position(|t| t.not_before <= now) {
                    if let Some(task) = state.queued.remove(idx) {
                        state.held.insert(task.source_id.clone());
                        let more = !state.queued.is_empty();
                        drop(state);
                        // Let another waiter re-evaluate what is left.
                        if more {
                            self.ready.notify_one();
                        }
                        return Some(task);
                    }
                }
                state.queued.iter().map(|t| t.not_before).min()
            };

            match wake_at {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Stop handing out tasks. Every blocked and future `dequeue` returns
    /// `None`; tasks still queued are discarded. Returns how many were.
    pub fn close(&self) -> usize {
        let mut state = self.lock();
        if state.closed {
            return 0;
        }
        state.closed = true;
        let discarded: Vec<Task> = state.queued.drain(..).collect();
        for task in &discarded {
            state.live.remove(&task.source_id);
        }
        drop(state);

        self.ready.notify_waiters();
        self.space.notify_waiters();
        for task in &discarded {
            tracing::debug!(source = %task.source_id, "discarding queued task on shutdown");
        }
        discarded.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Tasks waiting in the queue (not held by a worker).
    pub fn len(&self) -> usize {
        self.lock().queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queued.is_empty()
    }

    /// Sources with a queued or held task.
    pub fn live_sources(&self) -> usize {
        self.lock().live.len()
    }

    /// Sources currently held by a worker.
    pub fn held_sources(&self) -> usize {
        self.lock().held.len()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn ready_tasks_come_out_in_fifo_order() {
        let queue = TaskQueue::new();
        for id in ["a", "b", "c"] {
            queue.enqueue(Task::now(id)).await.unwrap();
        }
        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(queue.dequeue().await.unwrap().source_id.0);
        }
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(queue.held_sources(), 3);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn future_task_does_not_block_ready_task_behind_it() {
        let queue = TaskQueue::new();
        let mut later = Task::now("later");
        later.not_before = Instant::now() + Duration::from_secs(60);
        queue.enqueue(later).await.unwrap();
        queue.enqueue(Task::now("ready")).await.unwrap();

        let first = queue.dequeue().await.unwrap();
        assert_eq!(first.source_id, SourceId::from("ready"));

        let started = Instant::now();
        let second = queue.dequeue().await.unwrap();
        assert_eq!(second.source_id, SourceId::from("later"));
        assert!(Instant::now().duration_since(started) >= Duration::from_secs(59));
        assert!(Instant::now() >= second.not_before);
    }

    #[tokio::test]
    async fn second_task_for_live_source_is_refused() {
        let queue = TaskQueue::new();
        queue.enqueue(Task::now("s1")).await.unwrap();
        assert_eq!(
            queue.enqueue(Task::now("s1")).await,
            Err(QueueError::Duplicate(SourceId::from("s1")))
        );

        // Still refused while a worker holds it.
        let held = queue.dequeue().await.unwrap();
        assert_eq!(
            queue.enqueue(Task::now("s1")).await,
            Err(QueueError::Duplicate(SourceId::from("s1")))
        );

        queue.requeue(held.follow_up(Duration::ZERO, 0)).unwrap();
        assert_eq!(queue.live_sources(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn requeue_of_unheld_source_is_rejected() {
        let queue = TaskQueue::new();
        assert_eq!(
            queue.requeue(Task::now("ghost")),
            Err(QueueError::NotHeld(SourceId::from("ghost")))
        );
    }

    #[tokio::test]
    async fn retire_frees_the_source() {
        let queue = TaskQueue::new();
        queue.enqueue(Task::now("gone")).await.unwrap();
        let task = queue.dequeue().await.unwrap();
        assert!(queue.retire(&task.source_id));
        assert_eq!(queue.live_sources(), 0);
        queue.enqueue(Task::now("gone")).await.unwrap();
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn enqueue_gives_up_after_bounded_wait_when_full() {
        let queue = TaskQueue::with_capacity(1);
        queue.enqueue(Task::now("a")).await.unwrap();

        let started = Instant::now();
        let err = queue.enqueue(Task::now("b")).await.unwrap_err();
        assert_eq!(err, QueueError::Full { capacity: 1 });
        assert!(Instant::now().duration_since(started) >= ENQUEUE_WAIT);
    }

    #[tokio::test]
    async fn waiting_enqueue_succeeds_once_a_slot_frees() {
        let queue = Arc::new(TaskQueue::with_capacity(1));
        queue.enqueue(Task::now("a")).await.unwrap();
        let held = queue.dequeue().await.unwrap();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.enqueue(Task::now("b")).await })
        };
        tokio::task::yield_now().await;
        queue.retire(&held.source_id);

        waiter.await.unwrap().unwrap();
        assert_eq!(queue.live_sources(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn close_releases_every_blocked_dequeue() {
        let queue = Arc::new(TaskQueue::new());
        let waiters: Vec<_> = (0..5)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.dequeue().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.close();

        for waiter in waiters {
            let got = tokio::time::timeout(Duration::from_secs(5), waiter)
                .await
                .expect("dequeue must return after close")
                .expect("join");
            assert!(got.is_none());
        }
    }

    #[tokio::test]
    async fn close_discards_queued_and_rejects_new_work() {
        let queue = TaskQueue::new();
        queue.enqueue(Task::now("a")).await.unwrap();
        queue.enqueue(Task::now("b")).await.unwrap();
        let held = queue.dequeue().await.unwrap();

        assert_eq!(queue.close(), 1);
        assert!(queue.is_closed());
        assert_eq!(queue.dequeue().await, None);
        assert_eq!(queue.enqueue(Task::now("c")).await, Err(QueueError::Closed));

        // The held task's follow-up is refused and its slot released.
        assert_eq!(
            queue.requeue(held.follow_up(Duration::ZERO, 0)),
            Err(QueueError::Closed)
        );
        assert_eq!(queue.live_sources(), 0);
    }
}
