//! Simulated exchanges.

use std::fmt;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use courier_core::logging::targets;
use courier_core::{Cancelable, Queue};
use http::StatusCode;
use parking_lot::Mutex;

use crate::http::{WireRequest, WireResponse};
use crate::mock::MockResponder;
use crate::transport::{TransportHandler, TransportOutcome};

struct ConnectionState {
    responded: bool,
    canceled: bool,
    responder: Option<Weak<MockResponder>>,
    handler: Option<TransportHandler>,
}

/// One simulated request/response exchange.
///
/// A connection starts active and ends either responded or canceled, exactly
/// once. Responding to or canceling a connection that already ended does
/// nothing, so a late response after a cancel is silently dropped.
pub struct MockConnection {
    request: WireRequest,
    queue: Option<Arc<dyn Queue>>,
    state: Mutex<ConnectionState>,
}

impl MockConnection {
    pub(crate) fn new(
        request: WireRequest,
        queue: Option<Arc<dyn Queue>>,
        handler: TransportHandler,
    ) -> Arc<Self> {
        Arc::new(Self {
            request,
            queue,
            state: Mutex::new(ConnectionState {
                responded: false,
                canceled: false,
                responder: None,
                handler: Some(handler),
            }),
        })
    }

    /// The request this connection carries.
    pub fn request(&self) -> &WireRequest {
        &self.request
    }

    /// The queue the sender asked completion to run on.
    pub fn queue(&self) -> Option<&Arc<dyn Queue>> {
        self.queue.as_ref()
    }

    /// Whether the connection has neither been responded to nor canceled.
    pub fn is_active(&self) -> bool {
        let state = self.state.lock();
        !state.responded && !state.canceled
    }

    /// Whether a response was delivered.
    pub fn is_responded(&self) -> bool {
        self.state.lock().responded
    }

    /// Whether the connection was canceled.
    pub fn is_canceled(&self) -> bool {
        self.state.lock().canceled
    }

    /// The responder handling this connection.
    pub fn responder(&self) -> Option<Arc<MockResponder>> {
        self.state.lock().responder.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_responder(&self, responder: &Arc<MockResponder>) {
        self.state.lock().responder = Some(Arc::downgrade(responder));
    }

    /// Respond using the assigned responder's configuration.
    ///
    /// Without a responder, an empty `200 OK` is delivered.
    pub fn respond(&self) {
        match self.responder() {
            Some(responder) => responder.respond(self),
            None => {
                let response = WireResponse::new(self.request.url.clone(), StatusCode::OK);
                self.respond_with(TransportOutcome::response(response, Some(Bytes::new())));
            }
        }
    }

    /// Deliver `outcome` to the sender.
    ///
    /// Returns `false` without delivering if the connection already ended.
    /// The handler runs on the calling thread, outside the connection lock.
    pub fn respond_with(&self, outcome: TransportOutcome) -> bool {
        let handler = {
            let mut state = self.state.lock();
            if state.responded || state.canceled {
                return false;
            }
            state.responded = true;
            state.handler.take()
        };

        tracing::debug!(target: targets::MOCK, url = %self.request.url, "Mock connection responded");
        if let Some(handler) = handler {
            handler(outcome);
        }
        true
    }

    /// Cancel the connection. Its handler is dropped without being called.
    pub fn cancel(&self) {
        let handler = {
            let mut state = self.state.lock();
            if state.responded || state.canceled {
                return;
            }
            state.canceled = true;
            state.handler.take()
        };
        drop(handler);
        tracing::debug!(target: targets::MOCK, url = %self.request.url, "Mock connection canceled");
    }
}

impl Cancelable for MockConnection {
    fn cancel(&self) {
        MockConnection::cancel(self);
    }
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockConnection")
            .field("method", &self.request.method)
            .field("url", &self.request.url.as_str())
            .field("responded", &state.responded)
            .field("canceled", &state.canceled)
            .finish()
    }
}

/// An ordered record of connections.
pub trait ConnectionLog {
    /// Every logged connection, oldest first.
    fn connections(&self) -> Vec<Arc<MockConnection>>;

    /// Whether any connection was logged.
    fn has_connection(&self) -> bool {
        !self.connections().is_empty()
    }

    /// The most recent connection.
    fn last_connection(&self) -> Option<Arc<MockConnection>> {
        self.connections().pop()
    }

    /// Whether any logged connection is still active.
    fn has_active_connection(&self) -> bool {
        self.connections().iter().any(|c| c.is_active())
    }
}
