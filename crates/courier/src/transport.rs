//! The transport boundary.
//!
//! A [`Transport`] performs the actual exchange for a [`WireRequest`] and
//! reports the raw outcome through a one-shot handler. Any conforming
//! implementation can be used: [`ReqwestTransport`](crate::ReqwestTransport)
//! for real network I/O, or [`MockTransport`](crate::mock::MockTransport)
//! in tests.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use courier_core::{Cancelable, Queue};

use crate::error::SharedError;
use crate::http::{WireRequest, WireResponse};

/// The raw result of one transport exchange.
///
/// Mirrors what a network stack reports: any combination of body bytes,
/// response head, and transport error may be present.
#[derive(Clone, Debug, Default)]
pub struct TransportOutcome {
    /// Response body, if any was received.
    pub data: Option<Bytes>,
    /// Response head, if one was received.
    pub response: Option<WireResponse>,
    /// Transport-level failure.
    pub error: Option<SharedError>,
}

impl TransportOutcome {
    /// An outcome carrying a response and optional body.
    pub fn response(response: WireResponse, data: Option<Bytes>) -> Self {
        Self {
            data,
            response: Some(response),
            error: None,
        }
    }

    /// An outcome carrying only a transport error.
    pub fn error(error: SharedError) -> Self {
        Self {
            data: None,
            response: None,
            error: Some(error),
        }
    }
}

/// Completion handler for [`Transport::send`]. Called at most once.
pub type TransportHandler = Box<dyn FnOnce(TransportOutcome) + Send + 'static>;

/// Performs wire exchanges.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Send a request.
    ///
    /// `queue` is the execution context the caller would like `handler` to
    /// run on; `None` lets the transport choose. The returned handle cancels
    /// the exchange; once canceled, `handler` is never called.
    fn send(
        &self,
        request: WireRequest,
        queue: Option<Arc<dyn Queue>>,
        handler: TransportHandler,
    ) -> Box<dyn Cancelable>;
}

/// Run `handler` on `queue` if one is given, else on the current thread.
pub(crate) fn deliver(queue: Option<&Arc<dyn Queue>>, handler: TransportHandler, outcome: TransportOutcome) {
    match queue {
        Some(queue) => queue.dispatch(Box::new(move || handler(outcome))),
        None => handler(outcome),
    }
}
