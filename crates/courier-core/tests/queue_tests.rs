//! Integration tests for queues and cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use courier_core::{
    Cancelable, CancellationToken, ImmediateQueue, Queue, QueueError, WorkerQueue,
};
use parking_lot::Mutex;

fn queues() -> Vec<(&'static str, Arc<dyn Queue>)> {
    vec![
        ("immediate", Arc::new(ImmediateQueue::new())),
        ("worker", Arc::new(WorkerQueue::builder().name("queue-tests").build())),
    ]
}

#[test]
fn test_dispatch_sync_completes_before_returning() {
    for (name, queue) in queues() {
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let c = counter.clone();
            queue.dispatch_sync(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10, "queue {}", name);
    }
}

#[test]
fn test_dispatch_after_waits() {
    for (name, queue) in queues() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let start = Instant::now();
        queue.dispatch_after(
            Duration::from_millis(40),
            Box::new(move || {
                let _ = tx.send(start.elapsed());
            }),
        );
        let elapsed = rx.recv_timeout(Duration::from_secs(2)).expect("job ran");
        assert!(elapsed >= Duration::from_millis(40), "queue {} fired early", name);
    }
}

#[test]
fn test_worker_preserves_submission_order_across_threads() {
    let queue = Arc::new(WorkerQueue::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    for i in 0..50 {
        let log = log.clone();
        queue.dispatch(Box::new(move || log.lock().push(i)));
    }
    queue.dispatch_sync(Box::new(|| {}));

    assert_eq!(*log.lock(), (0..50).collect::<Vec<_>>());
}

#[test]
fn test_worker_stop_rejects_new_jobs() {
    let queue = WorkerQueue::new();
    assert!(queue.is_running());

    assert!(queue.stop_and_join());
    assert!(!queue.is_running());
    assert_eq!(queue.try_dispatch(Box::new(|| {})), Err(QueueError::Stopped));
}

#[test]
fn test_shared_worker_is_reused() {
    let a = WorkerQueue::shared();
    let b = WorkerQueue::shared();
    assert!(Arc::ptr_eq(&a, &b));

    let (tx, rx) = crossbeam_channel::bounded(1);
    a.dispatch(Box::new(move || {
        let _ = tx.send(WorkerQueue::shared().is_current());
    }));
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(true));
}

#[test]
fn test_cancellation_token_through_trait_object() {
    let token = CancellationToken::new();
    let handle: Box<dyn Cancelable> = Box::new(token.clone());

    assert!(!token.is_cancelled());
    handle.cancel();
    handle.cancel();
    assert!(token.is_cancelled());
}
