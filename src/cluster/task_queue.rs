//! Serialized cluster state update queue.
//!
//! Every change to the cluster state goes through this queue. A single worker
//! pops tasks in priority order (FIFO within a priority), runs the task's
//! mutation against the latest installed state, publishes the result, and
//! installs it only once publication commits. Submitters hold a
//! [`TaskHandle`] that resolves once the outcome is known.
//!
//! Installed versions are strictly increasing by one: the queue stamps
//! `previous + 1` on every state it installs.

use crate::cluster::publication::{PublishOutcome, Publisher};
use crate::core::error::{StreamError, StreamResult};
use crate::metadata::state::ClusterState;
use crate::ops::observability::StreamMetrics;
use parking_lot::Mutex;
use std::any::Any;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;

/// Task priority. Higher priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Languid,
    Low,
    Normal,
    High,
    Urgent,
    Immediate,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Languid => "LANGUID",
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
            Self::Immediate => "IMMEDIATE",
        };
        f.write_str(name)
    }
}

/// Outcome delivered to a submitter once its task has run.
#[derive(Debug, Clone)]
pub struct TaskCompletion<T> {
    /// Whether the new state was committed and installed.
    pub acknowledged: bool,
    /// The installed state, or the unchanged current state when not acknowledged.
    pub state: Arc<ClusterState>,
    /// Value returned by the mutation.
    pub output: T,
}

/// Listener for a submitted task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    source: String,
    receiver: oneshot::Receiver<StreamResult<TaskCompletion<T>>>,
}

impl<T> TaskHandle<T> {
    /// Wait for the task outcome.
    pub async fn wait(self) -> StreamResult<TaskCompletion<T>> {
        self.receiver.await.unwrap_or(Err(StreamError::QueueClosed))
    }

    /// Wait for the task outcome for at most `timeout`.
    ///
    /// A zero timeout waits without bound. On expiry the task stays queued
    /// and may still be applied later.
    pub async fn wait_timeout(self, timeout: Duration) -> StreamResult<TaskCompletion<T>> {
        if timeout.is_zero() {
            return self.wait().await;
        }
        let source = self.source;
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StreamError::QueueClosed),
            Err(_) => Err(StreamError::CommitTimeout {
                source_task: source,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

/// Queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks waiting to run.
    pub pending: usize,
    /// Version of the installed state.
    pub version: u64,
    /// Whether the worker is still running.
    pub running: bool,
}

/// Delivers the publication result of a produced state to its listener.
type Completion = Box<dyn FnOnce(StreamResult<(bool, Arc<ClusterState>)>) + Send>;

enum Executed {
    Produced {
        state: ClusterState,
        complete: Completion,
    },
    Rejected,
    Panicked,
}

trait QueuedTask: Send {
    fn source(&self) -> &str;

    fn execute(self: Box<Self>, current: &Arc<ClusterState>) -> Executed;
}

struct UpdateTask<T, F> {
    source: String,
    mutation: F,
    listener: oneshot::Sender<StreamResult<TaskCompletion<T>>>,
}

impl<T, F> QueuedTask for UpdateTask<T, F>
where
    T: Send + 'static,
    F: FnOnce(&ClusterState) -> StreamResult<(ClusterState, T)> + Send + 'static,
{
    fn source(&self) -> &str {
        &self.source
    }

    fn execute(self: Box<Self>, current: &Arc<ClusterState>) -> Executed {
        let UpdateTask {
            source,
            mutation,
            listener,
        } = *self;

        match catch_unwind(AssertUnwindSafe(|| mutation(current))) {
            Ok(Ok((state, output))) => Executed::Produced {
                state,
                complete: Box::new(move |published| {
                    let _ = listener.send(published.map(|(acknowledged, state)| TaskCompletion {
                        acknowledged,
                        state,
                        output,
                    }));
                }),
            },
            Ok(Err(err)) => {
                tracing::debug!(source = %source, error = %err, "cluster state task rejected");
                let _ = listener.send(Err(err));
                Executed::Rejected
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(source = %source, panic = %message, "cluster state task panicked");
                let _ = listener.send(Err(StreamError::TaskFailed {
                    source_task: source,
                    message,
                }));
                Executed::Panicked
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct PendingTask {
    priority: Priority,
    sequence: u64,
    task: Box<dyn QueuedTask>,
}

impl PartialEq for PendingTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for PendingTask {}

impl PartialOrd for PendingTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingTask {
    // Max-heap: higher priority first, then lower sequence first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Default)]
struct PendingQueue {
    heap: BinaryHeap<PendingTask>,
    closed: bool,
}

struct Shared {
    pending: Mutex<PendingQueue>,
    notify: Notify,
    next_sequence: AtomicU64,
    running: AtomicBool,
    state_tx: watch::Sender<Arc<ClusterState>>,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<StreamMetrics>,
}

impl Shared {
    fn execute(&self, pending: PendingTask) {
        let current = self.state_tx.borrow().clone();
        let source = pending.task.source().to_string();
        let started = Instant::now();

        tracing::debug!(
            source = %source,
            priority = %pending.priority,
            version = current.version(),
            "executing cluster state task"
        );

        match pending.task.execute(&current) {
            Executed::Rejected => self.metrics.record_task_rejected(),
            Executed::Panicked => self.metrics.record_task_failed(),
            Executed::Produced { state, complete } => {
                let next = state.with_version(current.version() + 1);
                let published = catch_unwind(AssertUnwindSafe(|| self.publisher.publish(&current, &next)));
                match published {
                    Ok(PublishOutcome::Committed) => {
                        let next = Arc::new(next);
                        self.state_tx.send_replace(next.clone());
                        self.metrics.record_task_executed(next.version());
                        tracing::debug!(
                            source = %source,
                            version = next.version(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "cluster state installed"
                        );
                        complete(Ok((true, next)));
                    }
                    Ok(PublishOutcome::NotCommitted) => {
                        self.metrics.record_task_not_committed();
                        tracing::warn!(
                            source = %source,
                            version = next.version(),
                            "cluster state publication not committed"
                        );
                        complete(Ok((false, current)));
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        self.metrics.record_task_failed();
                        tracing::error!(
                            source = %source,
                            version = next.version(),
                            panic = %message,
                            "cluster state publication panicked"
                        );
                        complete(Err(StreamError::TaskFailed {
                            source_task: source,
                            message,
                        }));
                    }
                }
            }
        }
    }
}

/// Handle to the cluster state task queue. Clones share the same queue.
#[derive(Clone)]
pub struct ClusterStateTaskQueue {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ClusterStateTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterStateTaskQueue")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ClusterStateTaskQueue {
    /// Install `initial` and spawn the worker on the current tokio runtime.
    pub fn start(
        initial: ClusterState,
        publisher: Arc<dyn Publisher>,
        metrics: Arc<StreamMetrics>,
    ) -> (Self, JoinHandle<()>) {
        let (state_tx, _) = watch::channel(Arc::new(initial));
        let shared = Arc::new(Shared {
            pending: Mutex::new(PendingQueue::default()),
            notify: Notify::new(),
            next_sequence: AtomicU64::new(0),
            running: AtomicBool::new(true),
            state_tx,
            publisher,
            metrics,
        });
        let worker = tokio::spawn(run_worker(shared.clone()));
        (Self { shared }, worker)
    }

    /// Submit a mutation of the cluster state.
    ///
    /// The mutation receives the latest installed state and returns the
    /// derived state plus an output value for the submitter. Returning an
    /// error leaves the state untouched.
    pub fn submit<T, F>(&self, source: impl Into<String>, priority: Priority, mutation: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&ClusterState) -> StreamResult<(ClusterState, T)> + Send + 'static,
    {
        let source = source.into();
        let (listener, receiver) = oneshot::channel();
        let task = UpdateTask {
            source: source.clone(),
            mutation,
            listener,
        };

        {
            let mut pending = self.shared.pending.lock();
            if pending.closed {
                tracing::debug!(source = %source, "task submitted to closed queue");
                // Dropping the task closes its listener.
                return TaskHandle { source, receiver };
            }
            let sequence = self.shared.next_sequence.fetch_add(1, AtomicOrdering::Relaxed);
            pending.heap.push(PendingTask {
                priority,
                sequence,
                task: Box::new(task),
            });
        }
        self.shared.notify.notify_one();

        TaskHandle { source, receiver }
    }

    /// The latest installed state.
    pub fn state(&self) -> Arc<ClusterState> {
        self.shared.state_tx.borrow().clone()
    }

    /// Receiver notified of every installed state.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ClusterState>> {
        self.shared.state_tx.subscribe()
    }

    /// Number of tasks waiting to run.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().heap.len()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending_count(),
            version: self.shared.state_tx.borrow().version(),
            running: self.is_running(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(AtomicOrdering::Acquire)
    }

    /// Stop accepting tasks. Already queued tasks still run.
    pub fn shutdown(&self) {
        self.shared.pending.lock().closed = true;
        self.shared.notify.notify_one();
    }
}

/// Clears the running flag however the worker exits.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, AtomicOrdering::Release);
    }
}

async fn run_worker(shared: Arc<Shared>) {
    let _running = RunningGuard(&shared.running);
    tracing::debug!("cluster state task queue worker started");
    loop {
        let next = {
            let mut pending = shared.pending.lock();
            match pending.heap.pop() {
                Some(task) => Some(task),
                None if pending.closed => break,
                None => None,
            }
        };
        match next {
            Some(task) => shared.execute(task),
            None => shared.notify.notified().await,
        }
    }
    tracing::debug!("cluster state task queue worker stopped");
}
