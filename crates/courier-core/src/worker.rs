//! Dedicated worker thread queue.
//!
//! [`WorkerQueue`] owns a single named thread with a bounded job channel.
//! Jobs run sequentially in submission order. Delayed jobs are kept in a
//! min-heap keyed by fire time and run on the same thread once due.
//!
//! # Example
//!
//! ```no_run
//! use courier_core::{Queue, WorkerQueue};
//!
//! let queue = WorkerQueue::builder().name("api-callbacks").build();
//!
//! queue.dispatch(Box::new(|| println!("on the worker")));
//! queue.stop_and_join();
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use parking_lot::Mutex;

use crate::error::{QueueError, Result};
use crate::logging::targets;
use crate::queue::{ImmediateQueue, Job, Queue};

/// Default capacity for the worker's job channel.
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// How long the worker waits on an empty channel before re-checking state.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Configuration for creating a [`WorkerQueue`].
#[derive(Debug, Clone)]
pub struct WorkerQueueConfig {
    /// Name for the worker thread.
    pub name: String,
    /// Stack size for the worker thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
    /// Capacity of the job channel.
    pub queue_capacity: usize,
}

impl Default for WorkerQueueConfig {
    fn default() -> Self {
        Self {
            name: "courier-worker".to_string(),
            stack_size: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Builder for creating worker queues with custom configuration.
#[derive(Debug, Default)]
pub struct WorkerQueueBuilder {
    config: WorkerQueueConfig,
}

impl WorkerQueueBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the thread name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the stack size for the worker thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Set the job channel capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Build and start the worker.
    pub fn build(self) -> WorkerQueue {
        WorkerQueue::with_config(self.config)
    }
}

/// A message sent to the worker thread.
enum WorkerTask {
    Execute(Job),
    Delayed { fire_at: Instant, job: Job },
    Shutdown,
}

/// A delayed job waiting in the timer heap.
struct DelayedEntry {
    fire_at: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for DelayedEntry {}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse order for min-heap; equal fire times keep submission order.
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A task the worker would not take, handed back to the submitter.
struct Rejected {
    error: QueueError,
    task: WorkerTask,
}

/// State shared between the queue handle and the worker thread.
struct WorkerState {
    running: AtomicBool,
    pending_jobs: AtomicUsize,
    thread_id: OnceLock<ThreadId>,
}

/// A queue that runs jobs on one dedicated thread.
///
/// `WorkerQueue` is `Send + Sync`; any thread may submit jobs. Dropping the
/// queue requests shutdown without blocking.
///
/// Through the [`Queue`] trait no job is ever lost: a job the worker cannot
/// take (stopped or full) runs on the calling thread instead, and a delayed
/// one on a helper thread once due. Use [`try_dispatch`](Self::try_dispatch)
/// to observe rejection instead.
pub struct WorkerQueue {
    task_sender: Sender<WorkerTask>,
    handle: Mutex<Option<JoinHandle<()>>>,
    state: Arc<WorkerState>,
    name: String,
}

impl WorkerQueue {
    /// Create a worker queue with default configuration.
    pub fn new() -> Self {
        Self::with_config(WorkerQueueConfig::default())
    }

    /// Create a builder for a worker queue.
    pub fn builder() -> WorkerQueueBuilder {
        WorkerQueueBuilder::new()
    }

    /// Create a worker queue with custom configuration.
    pub fn with_config(config: WorkerQueueConfig) -> Self {
        let (sender, receiver) = bounded(config.queue_capacity);
        let state = Arc::new(WorkerState {
            running: AtomicBool::new(true),
            pending_jobs: AtomicUsize::new(0),
            thread_id: OnceLock::new(),
        });

        let thread_state = state.clone();
        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let handle = builder
            .spawn(move || {
                let _ = thread_state.thread_id.set(thread::current().id());
                worker_loop(receiver, &thread_state);
                thread_state.running.store(false, Ordering::Release);
            })
            .expect("Failed to spawn worker thread");

        Self {
            task_sender: sender,
            handle: Mutex::new(Some(handle)),
            state,
            name: config.name,
        }
    }

    /// The process-wide default worker.
    ///
    /// Created on first use and never reconfigured. Used as the fallback
    /// context when a caller asks for asynchronous delivery without naming a
    /// queue.
    pub fn shared() -> Arc<WorkerQueue> {
        static SHARED: OnceLock<Arc<WorkerQueue>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                Arc::new(
                    WorkerQueue::builder()
                        .name("courier-shared-worker")
                        .build(),
                )
            })
            .clone()
    }

    /// Check if the worker still accepts jobs.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Number of submitted jobs that have not run yet, delayed jobs included.
    pub fn pending_jobs(&self) -> usize {
        self.state.pending_jobs.load(Ordering::Acquire)
    }

    /// Check if the caller is running on this queue's worker thread.
    pub fn is_current(&self) -> bool {
        self.state.thread_id.get() == Some(&thread::current().id())
    }

    /// Submit a job, reporting why it was rejected.
    pub fn try_dispatch(&self, job: Job) -> Result<()> {
        self.submit(WorkerTask::Execute(job))
            .map_err(|rejected| rejected.error)
    }

    /// Submit a job to run after `delay`, reporting why it was rejected.
    pub fn try_dispatch_after(&self, delay: Duration, job: Job) -> Result<()> {
        self.submit(WorkerTask::Delayed {
            fire_at: Instant::now() + delay,
            job,
        })
        .map_err(|rejected| rejected.error)
    }

    fn submit(&self, task: WorkerTask) -> std::result::Result<(), Rejected> {
        if !self.is_running() {
            return Err(Rejected {
                error: QueueError::Stopped,
                task,
            });
        }

        self.state.pending_jobs.fetch_add(1, Ordering::AcqRel);

        match self.task_sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.state.pending_jobs.fetch_sub(1, Ordering::AcqRel);
                Err(match err {
                    TrySendError::Full(task) => Rejected {
                        error: QueueError::Full,
                        task,
                    },
                    TrySendError::Disconnected(task) => Rejected {
                        error: QueueError::Stopped,
                        task,
                    },
                })
            }
        }
    }

    /// Request the worker to stop after running the jobs already queued.
    ///
    /// Delayed jobs that are not yet due move to helper threads and still
    /// run at their deadline.
    pub fn stop(&self) {
        self.state.running.store(false, Ordering::Release);
        let _ = self.task_sender.try_send(WorkerTask::Shutdown);
    }

    /// Wait for the worker thread to finish.
    ///
    /// Returns `true` if the worker was joined successfully, `false` if
    /// already joined or the thread panicked.
    pub fn join(&self) -> bool {
        let mut handle = self.handle.lock();
        if let Some(h) = handle.take() {
            h.join().is_ok()
        } else {
            false
        }
    }

    /// Stop the worker and wait for it to finish.
    pub fn stop_and_join(&self) -> bool {
        self.stop();
        self.join()
    }

    fn run_rejected(&self, rejected: Rejected) {
        tracing::warn!(
            target: targets::QUEUE,
            worker = %self.name,
            "Worker unavailable, running job off the worker: {}",
            rejected.error
        );
        run_detached(rejected.task);
    }
}

impl Default for WorkerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for WorkerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerQueue")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}

impl Queue for WorkerQueue {
    fn dispatch(&self, job: Job) {
        if let Err(rejected) = self.submit(WorkerTask::Execute(job)) {
            self.run_rejected(rejected);
        }
    }

    fn dispatch_sync(&self, job: Job) {
        // Waiting on ourselves would never return.
        if self.is_current() {
            job();
            return;
        }

        let (done_tx, done_rx) = bounded(1);
        let submitted = self.submit(WorkerTask::Execute(Box::new(move || {
            job();
            let _ = done_tx.send(());
        })));

        match submitted {
            Ok(()) => {
                let _ = done_rx.recv();
            }
            Err(rejected) => self.run_rejected(rejected),
        }
    }

    fn dispatch_after(&self, delay: Duration, job: Job) {
        let task = WorkerTask::Delayed {
            fire_at: Instant::now() + delay,
            job,
        };
        if let Err(rejected) = self.submit(task) {
            self.run_rejected(rejected);
        }
    }
}

/// Run a task without the worker: immediate jobs on the current thread,
/// delayed jobs on a helper thread at their deadline.
fn run_detached(task: WorkerTask) {
    match task {
        WorkerTask::Execute(job) => job(),
        WorkerTask::Delayed { fire_at, job } => {
            ImmediateQueue.dispatch_after(fire_at.saturating_duration_since(Instant::now()), job)
        }
        WorkerTask::Shutdown => {}
    }
}

/// The worker loop: run immediate jobs in order, fire delayed jobs when due.
fn worker_loop(receiver: Receiver<WorkerTask>, state: &WorkerState) {
    let mut timers: BinaryHeap<DelayedEntry> = BinaryHeap::new();
    let mut seq: u64 = 0;

    loop {
        run_due(&mut timers, state);

        let timeout = timers
            .peek()
            .map(|next| next.fire_at.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_POLL)
            .min(IDLE_POLL);

        match receiver.recv_timeout(timeout) {
            Ok(WorkerTask::Execute(job)) => {
                job();
                state.pending_jobs.fetch_sub(1, Ordering::AcqRel);
            }
            Ok(WorkerTask::Delayed { fire_at, job }) => {
                timers.push(DelayedEntry { fire_at, seq, job });
                seq += 1;
            }
            Ok(WorkerTask::Shutdown) => {
                while let Ok(task) = receiver.try_recv() {
                    match task {
                        WorkerTask::Execute(job) => {
                            job();
                            state.pending_jobs.fetch_sub(1, Ordering::AcqRel);
                        }
                        WorkerTask::Delayed { fire_at, job } => {
                            timers.push(DelayedEntry { fire_at, seq, job });
                            seq += 1;
                        }
                        WorkerTask::Shutdown => continue,
                    }
                }
                if !timers.is_empty() {
                    tracing::debug!(
                        target: targets::QUEUE,
                        outstanding = timers.len(),
                        "Worker stopped, moving delayed jobs to helper threads"
                    );
                }
                for entry in timers.drain() {
                    state.pending_jobs.fetch_sub(1, Ordering::AcqRel);
                    run_detached(WorkerTask::Delayed {
                        fire_at: entry.fire_at,
                        job: entry.job,
                    });
                }
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn run_due(timers: &mut BinaryHeap<DelayedEntry>, state: &WorkerState) {
    let now = Instant::now();
    while timers.peek().is_some_and(|next| next.fire_at <= now) {
        if let Some(entry) = timers.pop() {
            (entry.job)();
            state.pending_jobs.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_run_in_order() {
        let queue = WorkerQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = seen.clone();
            queue.dispatch(Box::new(move || seen.lock().push(i)));
        }
        queue.dispatch_sync(Box::new(|| {}));

        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
        assert!(queue.stop_and_join());
    }

    #[test]
    fn test_dispatch_sync_runs_on_worker_thread() {
        let queue = Arc::new(WorkerQueue::builder().name("sync-test").build());
        let name = Arc::new(Mutex::new(None));

        let n = name.clone();
        queue.dispatch_sync(Box::new(move || {
            *n.lock() = thread::current().name().map(str::to_string);
        }));

        assert_eq!(name.lock().as_deref(), Some("sync-test"));
    }

    #[test]
    fn test_dispatch_sync_from_worker_does_not_deadlock() {
        let queue = Arc::new(WorkerQueue::new());
        let (tx, rx) = bounded(1);

        let inner = queue.clone();
        queue.dispatch(Box::new(move || {
            inner.dispatch_sync(Box::new(move || {
                let _ = tx.send(());
            }));
        }));

        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn test_delayed_jobs_fire_in_deadline_order() {
        let queue = WorkerQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = bounded(2);

        let (s, t) = (seen.clone(), tx.clone());
        queue.dispatch_after(
            Duration::from_millis(60),
            Box::new(move || {
                s.lock().push("late");
                let _ = t.send(());
            }),
        );
        let (s, t) = (seen.clone(), tx);
        queue.dispatch_after(
            Duration::from_millis(10),
            Box::new(move || {
                s.lock().push("early");
                let _ = t.send(());
            }),
        );

        for _ in 0..2 {
            assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        }
        assert_eq!(*seen.lock(), vec!["early", "late"]);
    }

    #[test]
    fn test_stopped_queue_still_runs_jobs_through_trait() {
        let queue = WorkerQueue::new();
        queue.stop_and_join();

        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        queue.dispatch(Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        let r = ran.clone();
        queue.dispatch_sync(Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 2);

        let (tx, rx) = bounded(1);
        queue.dispatch_after(
            Duration::from_millis(10),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn test_stop_keeps_pending_delayed_jobs() {
        let queue = WorkerQueue::new();
        let (tx, rx) = bounded(1);
        queue.dispatch_after(
            Duration::from_millis(50),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );

        assert!(queue.stop_and_join());
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        assert_eq!(queue.pending_jobs(), 0);
    }

    #[test]
    fn test_stopped_queue_rejects_jobs() {
        let queue = WorkerQueue::new();
        queue.stop();
        assert_eq!(queue.try_dispatch(Box::new(|| {})), Err(QueueError::Stopped));
        assert!(queue.join());
        assert!(!queue.is_running());
    }
}
