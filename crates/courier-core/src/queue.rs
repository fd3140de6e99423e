//! Execution contexts.
//!
//! A [`Queue`] decides where and when a job runs. The HTTP layer hands queues
//! to transports so completion callbacks land on the caller's preferred
//! context: the calling thread, a dedicated worker, or a tokio runtime.

use std::fmt;
use std::thread;
use std::time::Duration;

use crate::logging::targets;

/// A unit of work submitted to a [`Queue`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// An execution context that runs jobs.
///
/// Every job handed to a queue must eventually run. Callers rely on this to
/// deliver completions exactly once.
pub trait Queue: Send + Sync + fmt::Debug {
    /// Schedule a job without blocking the caller.
    fn dispatch(&self, job: Job);

    /// Run a job on this queue and block the caller until it has finished.
    fn dispatch_sync(&self, job: Job);

    /// Schedule a job to run once `delay` has elapsed.
    fn dispatch_after(&self, delay: Duration, job: Job);
}

/// A queue that runs jobs on the calling thread.
///
/// `dispatch` and `dispatch_sync` both run the job before returning.
/// `dispatch_after` has no thread of its own to wait on, so it parks a
/// helper thread for the delay and runs the job there.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateQueue;

impl ImmediateQueue {
    /// Create an immediate queue.
    pub fn new() -> Self {
        Self
    }
}

impl Queue for ImmediateQueue {
    fn dispatch(&self, job: Job) {
        job();
    }

    fn dispatch_sync(&self, job: Job) {
        job();
    }

    fn dispatch_after(&self, delay: Duration, job: Job) {
        let spawned = thread::Builder::new()
            .name("courier-delay".to_string())
            .spawn(move || {
                thread::sleep(delay);
                job();
            });
        if let Err(err) = spawned {
            tracing::warn!(target: targets::QUEUE, "Failed to spawn delay thread: {}", err);
        }
    }
}

/// A queue backed by a tokio runtime.
///
/// Jobs are treated as blocking work and run on the runtime's blocking pool,
/// so a job may itself call [`Queue::dispatch_sync`] safely.
#[cfg(feature = "tokio")]
#[derive(Clone, Debug)]
pub struct TokioQueue {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio")]
impl TokioQueue {
    /// Create a queue that spawns onto the given runtime.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Create a queue for the runtime the caller is currently inside.
    ///
    /// Returns `None` when called outside of a tokio runtime.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

#[cfg(feature = "tokio")]
impl Queue for TokioQueue {
    fn dispatch(&self, job: Job) {
        self.handle.spawn_blocking(job);
    }

    fn dispatch_sync(&self, job: Job) {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        self.handle.spawn_blocking(move || {
            job();
            let _ = done_tx.send(());
        });
        if done_rx.recv().is_err() {
            tracing::warn!(target: targets::QUEUE, "Runtime dropped a synchronous job");
        }
    }

    fn dispatch_after(&self, delay: Duration, job: Job) {
        let handle = self.handle.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            handle.spawn_blocking(job);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_immediate_runs_inline() {
        let counter = Arc::new(AtomicUsize::new(0));
        let queue = ImmediateQueue::new();

        let c = counter.clone();
        queue.dispatch(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let c = counter.clone();
        queue.dispatch_sync(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_immediate_dispatch_after() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        ImmediateQueue::new().dispatch_after(
            Duration::from_millis(10),
            Box::new(move || {
                let _ = tx.send(42);
            }),
        );
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(42));
    }

    #[cfg(feature = "tokio")]
    #[test]
    fn test_tokio_queue_sync_and_delay() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime");
        let queue = TokioQueue::new(runtime.handle().clone());

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        queue.dispatch_sync(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let (tx, rx) = crossbeam_channel::bounded(1);
        queue.dispatch_after(
            Duration::from_millis(10),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }
}
