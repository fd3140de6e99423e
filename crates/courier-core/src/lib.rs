//! Core systems for Courier.
//!
//! This crate provides the execution primitives the HTTP layer is built on:
//!
//! - **Queues**: execution contexts that decide where a callback runs
//!   (the calling thread, a dedicated worker thread, or a tokio runtime)
//! - **Worker**: a dedicated thread with its own job channel and timer heap
//! - **Cancellation**: the [`Cancelable`] trait and a shareable
//!   [`CancellationToken`]
//!
//! # Queue Example
//!
//! ```no_run
//! use std::time::Duration;
//! use courier_core::{Queue, WorkerQueue};
//!
//! let queue = WorkerQueue::new();
//!
//! // Runs on the worker thread, returns immediately
//! queue.dispatch(Box::new(|| println!("async")));
//!
//! // Blocks until the job has run on the worker thread
//! queue.dispatch_sync(Box::new(|| println!("sync")));
//!
//! // Runs on the worker thread after the delay elapses
//! queue.dispatch_after(Duration::from_millis(50), Box::new(|| println!("later")));
//!
//! queue.stop_and_join();
//! ```

mod cancel;
mod error;
pub mod logging;
mod queue;
pub mod worker;

pub use cancel::{Cancelable, CancellationToken};
pub use error::{QueueError, Result};
pub use queue::{ImmediateQueue, Job, Queue};
pub use worker::{WorkerQueue, WorkerQueueBuilder, WorkerQueueConfig};

#[cfg(feature = "tokio")]
pub use queue::TokioQueue;
