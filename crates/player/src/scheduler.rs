//! Cooperative FIFO task scheduler.
//!
//! Tasks are zero-argument async closures run one at a time, strictly from the
//! head of the queue. At most one drain loop exists at any time; it is spawned
//! on the ambient tokio runtime by `start`, `resume`, or an `add` while
//! running, and exits when the queue empties or the scheduler leaves
//! `Running`.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, error};

use crate::error::Result;

pub type TaskFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;
pub type ScheduledTask = Box<dyn FnOnce() -> TaskFuture + Send + 'static>;

/// Box an async closure into a [`ScheduledTask`].
pub fn task<F, Fut>(f: F) -> ScheduledTask
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move || -> TaskFuture { Box::pin(f()) })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
    Paused,
    Stopped,
}

struct Inner {
    queue: VecDeque<ScheduledTask>,
    /// Visit index -> queue length right before that visit was enqueued.
    bookmarks: BTreeMap<usize, usize>,
    state: SchedulerState,
    draining: bool,
    completed: usize,
    failed: usize,
}

#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<Mutex<Inner>>,
    idle: Arc<Notify>,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("TaskScheduler")
            .field("state", &inner.state)
            .field("queued", &inner.queue.len())
            .field("draining", &inner.draining)
            .field("completed", &inner.completed)
            .field("failed", &inner.failed)
            .finish()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                queue: VecDeque::new(),
                bookmarks: BTreeMap::new(),
                state: SchedulerState::Idle,
                draining: false,
                completed: 0,
                failed: 0,
            })),
            idle: Arc::new(Notify::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a task. Wakes the drain loop when running and not paused.
    pub fn add(&self, task: ScheduledTask) {
        let mut inner = self.lock();
        inner.queue.push_back(task);
        self.kick(inner);
    }

    /// Enqueue the tasks of one visit and record its bookmark.
    ///
    /// Returns the bookmark: the queue length right before the enqueue.
    pub fn add_visit<I>(&self, index: usize, tasks: I) -> usize
    where
        I: IntoIterator<Item = ScheduledTask>,
    {
        let mut inner = self.lock();
        let bookmark = inner.queue.len();
        inner.bookmarks.insert(index, bookmark);
        inner.queue.extend(tasks);
        self.kick(inner);
        bookmark
    }

    /// Begin draining from the head of the queue.
    ///
    /// The head task is dequeued before this returns, so a `pause` issued
    /// right afterwards still lets exactly that task run.
    pub fn start(&self) {
        let mut inner = self.lock();
        if inner.state == SchedulerState::Running {
            return;
        }
        debug!("Scheduler starting with {} queued tasks", inner.queue.len());
        inner.state = SchedulerState::Running;
        self.kick(inner);
    }

    /// Leave `Running`. The in-flight task finishes; nothing else starts.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if matches!(
            inner.state,
            SchedulerState::Running | SchedulerState::Paused
        ) {
            inner.state = SchedulerState::Stopped;
        }
    }

    pub fn pause(&self) {
        let mut inner = self.lock();
        if inner.state == SchedulerState::Running {
            inner.state = SchedulerState::Paused;
        }
    }

    /// Continue draining from exactly where `pause` left off.
    pub fn resume(&self) {
        let mut inner = self.lock();
        if inner.state != SchedulerState::Paused {
            return;
        }
        inner.state = SchedulerState::Running;
        self.kick(inner);
    }

    /// Discard the first `n` queued tasks without running them.
    ///
    /// Asking for more than is queued empties the queue. Returns how many
    /// tasks were dropped.
    pub fn skip_to(&self, n: usize) -> usize {
        let mut inner = self.lock();
        let len = inner.queue.len();
        if n > len {
            debug!("skip_to({n}) exceeds {len} queued tasks, clearing queue");
        }
        let dropped = n.min(len);
        inner.queue.drain(..dropped);
        dropped
    }

    /// Empty the queue and bookmark table and return to `Idle`.
    ///
    /// An in-flight task is not interrupted; cancel it through its token.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.queue.clear();
        inner.bookmarks.clear();
        inner.state = SchedulerState::Idle;
    }

    pub fn state(&self) -> SchedulerState {
        self.lock().state
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn is_draining(&self) -> bool {
        self.lock().draining
    }

    pub fn bookmark(&self, index: usize) -> Option<usize> {
        self.lock().bookmarks.get(&index).copied()
    }

    /// Tasks that ran to `Ok` since creation.
    pub fn completed(&self) -> usize {
        self.lock().completed
    }

    pub fn failed(&self) -> usize {
        self.lock().failed
    }

    /// Resolves once no drain loop is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_draining() {
                return;
            }
            notified.await;
        }
    }

    /// Spawn the drain loop if the scheduler is running and none is active.
    fn kick(&self, mut inner: MutexGuard<'_, Inner>) {
        if inner.state != SchedulerState::Running || inner.draining {
            return;
        }
        let Some(head) = inner.queue.pop_front() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                inner.draining = true;
                drop(inner);
                runtime.spawn(self.clone().drain(head));
            }
            Err(e) => {
                inner.queue.push_front(head);
                drop(inner);
                error!("Scheduler cannot drain outside a tokio runtime: {e}");
            }
        }
    }

    async fn drain(self, head: ScheduledTask) {
        let mut guard = DrainGuard {
            scheduler: self.clone(),
            armed: true,
        };
        let mut next = head;
        loop {
            let outcome = next().await;
            let mut inner = self.lock();
            match outcome {
                Ok(()) => inner.completed += 1,
                Err(e) => {
                    inner.failed += 1;
                    error!("Scheduled task failed: {e}");
                }
            }
            if inner.state == SchedulerState::Running
                && let Some(task) = inner.queue.pop_front()
            {
                next = task;
                continue;
            }
            // Same lock that saw the queue empty; a later `add` must spawn.
            inner.draining = false;
            drop(inner);
            guard.armed = false;
            self.idle.notify_waiters();
            return;
        }
    }
}

/// Clears the draining flag if a task panics out of the drain loop.
struct DrainGuard {
    scheduler: TaskScheduler,
    armed: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.armed {
            self.scheduler.lock().draining = false;
            self.scheduler.idle.notify_waiters();
        }
    }
}
