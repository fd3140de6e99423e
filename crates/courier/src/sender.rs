//! The dispatch engine.
//!
//! A [`Sender`] drives one logical send: build the wire request, notify
//! hooks, call the transport, validate authentication (refreshing and
//! re-sending when the credentials allow it), run response processors, and
//! deliver exactly one result. Canceling a dispatch suppresses its result,
//! however late the transport or a refresh completes.

use std::fmt;
use std::sync::Arc;

use courier_core::Cancelable;
use courier_core::logging::targets;
use parking_lot::Mutex;

use crate::auth::Authentication;
use crate::error::{AuthenticationError, WebApiError, WebApiResult};
use crate::http::WireRequest;
use crate::plugin;
use crate::request::WebApiRequest;
use crate::response::WebApiResponse;
use crate::transport::{Transport, TransportOutcome};

/// Receives the result of a dispatch.
pub type ResultHandler = Box<dyn FnOnce(WebApiResult) + Send + 'static>;

struct SenderState {
    handler: Option<ResultHandler>,
    task: Option<Box<dyn Cancelable>>,
    canceled: bool,
    completed: bool,
    /// Transport calls made so far.
    attempt: u64,
    /// The latest transport call that has called back.
    answered: u64,
    refreshes: u32,
}

/// Drives a single dispatch. Not reusable.
pub(crate) struct Sender {
    request: WebApiRequest,
    transport: Arc<dyn Transport>,
    authentication: Option<Arc<dyn Authentication>>,
    requires_authentication: bool,
    max_refreshes: u32,
    state: Mutex<SenderState>,
}

impl Sender {
    /// Build `request` and send it through `transport`.
    ///
    /// A build failure is delivered to `handler` before this returns.
    pub(crate) fn start(
        request: WebApiRequest,
        transport: Arc<dyn Transport>,
        handler: ResultHandler,
    ) -> SendHandle {
        let sender = Arc::new(Sender {
            authentication: request.effective_authentication(),
            requires_authentication: request.requires_authentication(),
            max_refreshes: request.provider().max_authentication_refreshes(),
            request,
            transport,
            state: Mutex::new(SenderState {
                handler: Some(handler),
                task: None,
                canceled: false,
                completed: false,
                attempt: 0,
                answered: 0,
                refreshes: 0,
            }),
        });

        match sender.request.to_wire_request() {
            Ok(wire) => sender.dispatch(wire),
            Err(err) => {
                tracing::debug!(
                    target: targets::SENDER,
                    method = %sender.request.method(),
                    path = sender.request.path(),
                    "Request not sent: {}",
                    err
                );
                sender.finish(Err(err));
            }
        }

        SendHandle { sender }
    }

    fn dispatch(self: &Arc<Self>, wire: WireRequest) {
        if self.is_canceled() {
            return;
        }

        for hook in self.hooks() {
            hook.will_send(&wire);
        }

        let attempt = {
            let mut state = self.state.lock();
            state.attempt += 1;
            state.attempt
        };
        tracing::debug!(
            target: targets::SENDER,
            method = %wire.method,
            url = %wire.url,
            attempt,
            "Sending request"
        );

        let sender = self.clone();
        let resend = wire.clone();
        let task = self.transport.send(
            wire,
            self.request.delivery_queue().cloned(),
            Box::new(move |outcome| sender.receive(attempt, resend, outcome)),
        );

        let mut state = self.state.lock();
        if state.canceled {
            drop(state);
            task.cancel();
        } else if state.answered < attempt {
            state.task = Some(task);
        }
    }

    fn receive(self: Arc<Self>, attempt: u64, wire: WireRequest, outcome: TransportOutcome) {
        {
            let mut state = self.state.lock();
            if state.canceled {
                return;
            }
            state.answered = attempt;
            state.task = None;
        }

        for hook in self.hooks() {
            hook.did_receive(
                outcome.data.as_ref(),
                outcome.response.as_ref(),
                outcome.error.as_ref(),
            );
        }

        if let Some(error) = outcome.error {
            self.finish(Err(WebApiError::SendFailed(error)));
            return;
        }
        let Some(response) = outcome.response else {
            self.finish(Err(WebApiError::NoResponse));
            return;
        };

        if self.requires_authentication
            && let Some(authentication) = &self.authentication
            && let Some(failure) = authentication.validate(response.status, &response)
        {
            self.recover(authentication.clone(), failure, wire);
            return;
        }

        let response = WebApiResponse {
            status: response.status,
            headers: response.headers,
            data: outcome.data.unwrap_or_default(),
        };
        let result = plugin::process_response(
            self.request.provider().plugins(),
            self.request.plugin_hub(),
            response,
        );
        self.finish(result);
    }

    /// Refresh rejected credentials and re-send, or fail with `failure`.
    fn recover(
        self: &Arc<Self>,
        authentication: Arc<dyn Authentication>,
        failure: WebApiError,
        wire: WireRequest,
    ) {
        let Some(refreshable) = authentication.as_refreshable().filter(|r| r.can_refresh()) else {
            self.finish(Err(failure));
            return;
        };

        let refresh = {
            let mut state = self.state.lock();
            if state.refreshes < self.max_refreshes {
                state.refreshes += 1;
                Some(state.refreshes)
            } else {
                None
            }
        };
        let Some(refresh) = refresh else {
            tracing::warn!(
                target: targets::SENDER,
                url = %wire.url,
                max = self.max_refreshes,
                "Authentication still rejected after refreshing"
            );
            self.finish(Err(AuthenticationError::Failed.into()));
            return;
        };

        tracing::debug!(target: targets::SENDER, url = %wire.url, refresh, "Refreshing authentication");

        let sender = self.clone();
        let credentials = authentication.clone();
        refreshable.refresh(Box::new(move |refreshed| {
            if sender.is_canceled() {
                return;
            }
            if !refreshed {
                sender.finish(Err(AuthenticationError::Failed.into()));
                return;
            }
            if !credentials.is_valid() {
                sender.finish(Err(AuthenticationError::Invalid.into()));
                return;
            }
            match credentials.authenticate(wire) {
                Ok(wire) => sender.dispatch(wire),
                Err(err) => sender.finish(Err(WebApiError::from_request_error(err))),
            }
        }));
    }

    fn finish(&self, result: WebApiResult) {
        let handler = {
            let mut state = self.state.lock();
            if state.canceled || state.completed {
                return;
            }
            state.completed = true;
            state.handler.take()
        };

        if let Err(ref err) = result {
            tracing::debug!(target: targets::SENDER, path = self.request.path(), "Request failed: {}", err);
        }
        if let Some(handler) = handler {
            handler(result);
        }
    }

    fn cancel(&self) {
        let (task, handler) = {
            let mut state = self.state.lock();
            if state.canceled || state.completed {
                return;
            }
            state.canceled = true;
            (state.task.take(), state.handler.take())
        };
        drop(handler);

        tracing::debug!(target: targets::SENDER, path = self.request.path(), "Request canceled");
        if let Some(task) = task {
            task.cancel();
        }
    }

    fn is_canceled(&self) -> bool {
        self.state.lock().canceled
    }

    fn hooks(&self) -> impl Iterator<Item = &Arc<dyn plugin::HttpHook>> {
        plugin::hooks(self.request.provider().plugins(), self.request.plugin_hub())
    }
}

/// Handle to an in-flight dispatch.
///
/// Canceling is idempotent. Once canceled, the result handler is never
/// called, even if the transport answers later.
#[derive(Clone)]
pub struct SendHandle {
    sender: Arc<Sender>,
}

impl SendHandle {
    /// Cancel the dispatch.
    pub fn cancel(&self) {
        self.sender.cancel();
    }

    /// Whether the dispatch was canceled before completing.
    pub fn is_canceled(&self) -> bool {
        self.sender.is_canceled()
    }

    /// Whether a result was delivered.
    pub fn is_completed(&self) -> bool {
        self.sender.state.lock().completed
    }

    /// The endpoint being sent.
    pub fn request(&self) -> &WebApiRequest {
        &self.sender.request
    }
}

impl Cancelable for SendHandle {
    fn cancel(&self) {
        SendHandle::cancel(self);
    }
}

impl fmt::Debug for SendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.sender.state.lock();
        f.debug_struct("SendHandle")
            .field("method", &self.sender.request.method())
            .field("path", &self.sender.request.path())
            .field("attempt", &state.attempt)
            .field("canceled", &state.canceled)
            .field("completed", &state.completed)
            .finish()
    }
}
