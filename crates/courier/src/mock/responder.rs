//! Mock responders: match rules with a configured simulated response.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use courier_core::logging::targets;
use courier_core::{Job, Queue, WorkerQueue};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::error::{SharedError, share};
use crate::http::{WireRequest, WireResponse};
use crate::mock::{ConnectionLog, MockConnection, PathTemplate, RequestMatcher, TemplateValues};
use crate::transport::TransportOutcome;

/// Builds the outcome for one connection.
pub type ResponseFactory = Arc<dyn Fn(&MockConnection) -> TransportOutcome + Send + Sync>;

/// Builds the outcome for one connection from its path template values.
pub type TemplatedFactory =
    Arc<dyn Fn(&TemplateValues, &MockConnection) -> TransportOutcome + Send + Sync>;

type MatchFn = Box<dyn Fn(&WireRequest) -> bool + Send + Sync>;

/// When a responder answers the connections it receives.
#[derive(Clone, Debug, Default)]
pub enum ResponderMode {
    /// Respond on the sending call stack.
    #[default]
    Immediate,
    /// Respond on a queue, blocking the sender until done.
    Sync(Option<Arc<dyn Queue>>),
    /// Respond on a queue without blocking the sender.
    Async(Option<Arc<dyn Queue>>),
    /// Respond on a queue after a delay.
    Delay(Duration, Option<Arc<dyn Queue>>),
    /// Never respond on its own; call [`MockConnection::respond`].
    Manual,
}

#[derive(Default)]
struct ResponderConfig {
    mode: ResponderMode,
    factory: Option<ResponseFactory>,
    templated_factory: Option<TemplatedFactory>,
    error: Option<SharedError>,
    data: Option<Bytes>,
    status: Option<StatusCode>,
    headers: HeaderMap,
}

/// A rule answering matching requests with a simulated response.
///
/// Configuration methods take and return the `Arc`, so a freshly stubbed
/// responder can be configured in one chain:
///
/// ```ignore
/// mock.stub_path("/users", PathMatchMode::EqualTo, None)
///     .with_status(StatusCode::CREATED)
///     .with_json(&serde_json::json!({"id": 1}));
/// ```
///
/// A factory takes precedence over static fields; among static fields an
/// error takes precedence over data and status.
pub struct MockResponder {
    matcher: MatchFn,
    template: Option<PathTemplate>,
    base_path: String,
    config: RwLock<ResponderConfig>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockResponder {
    /// A responder for requests accepted by `matcher`.
    pub fn new(matcher: impl Fn(&WireRequest) -> bool + Send + Sync + 'static) -> Arc<Self> {
        Self::build(Box::new(matcher), None, String::new())
    }

    /// A responder for every request.
    pub fn any() -> Arc<Self> {
        Self::new(|_| true)
    }

    /// A responder for request paths matching `template` that `matcher`
    /// also accepts. Paths are taken relative to `base_path`.
    pub fn templated(
        template: PathTemplate,
        base_path: impl Into<String>,
        matcher: impl Fn(&RequestMatcher<'_>) -> bool + Send + Sync + 'static,
    ) -> Arc<Self> {
        let base_path = base_path.into();
        let pattern = template.clone();
        let base = base_path.clone();
        let matcher: MatchFn = Box::new(move |request| {
            let view = RequestMatcher::new(request, &base);
            pattern.matches(view.request_path()) && matcher(&view)
        });
        Self::build(matcher, Some(template), base_path)
    }

    fn build(matcher: MatchFn, template: Option<PathTemplate>, base_path: String) -> Arc<Self> {
        Arc::new(Self {
            matcher,
            template,
            base_path,
            config: RwLock::new(ResponderConfig::default()),
            connections: Mutex::new(Vec::new()),
        })
    }

    /// Whether this responder handles `request`.
    pub fn matches(&self, request: &WireRequest) -> bool {
        (self.matcher)(request)
    }

    /// The path template, for templated responders.
    pub fn template(&self) -> Option<&PathTemplate> {
        self.template.as_ref()
    }

    /// The current scheduling mode.
    pub fn mode(&self) -> ResponderMode {
        self.config.read().mode.clone()
    }

    pub fn with_mode(self: Arc<Self>, mode: ResponderMode) -> Arc<Self> {
        self.config.write().mode = mode;
        self
    }

    pub fn with_factory(
        self: Arc<Self>,
        factory: impl Fn(&MockConnection) -> TransportOutcome + Send + Sync + 'static,
    ) -> Arc<Self> {
        self.config.write().factory = Some(Arc::new(factory));
        self
    }

    /// Fail every connection with a transport error.
    pub fn with_error(self: Arc<Self>, error: SharedError) -> Arc<Self> {
        self.config.write().error = Some(error);
        self
    }

    pub fn with_data(self: Arc<Self>, data: impl Into<Bytes>) -> Arc<Self> {
        self.config.write().data = Some(data.into());
        self
    }

    /// Respond with `value` serialized as JSON.
    ///
    /// A value that fails to serialize is configured as the responder's
    /// error instead.
    pub fn with_json<T: Serialize + ?Sized>(self: Arc<Self>, value: &T) -> Arc<Self> {
        match serde_json::to_vec(value) {
            Ok(data) => self.with_data(data),
            Err(err) => self.with_error(share(err)),
        }
    }

    /// Respond with the contents of a file, read now.
    ///
    /// An unreadable file is configured as the responder's error instead.
    pub fn with_file(self: Arc<Self>, path: impl AsRef<Path>) -> Arc<Self> {
        match std::fs::read(path.as_ref()) {
            Ok(data) => self.with_data(data),
            Err(err) => self.with_error(share(err)),
        }
    }

    pub fn with_status(self: Arc<Self>, status: StatusCode) -> Arc<Self> {
        self.config.write().status = Some(status);
        self
    }

    /// Replace all response headers.
    pub fn with_headers(self: Arc<Self>, headers: HeaderMap) -> Arc<Self> {
        self.config.write().headers = headers;
        self
    }

    /// Set one response header.
    pub fn with_header(self: Arc<Self>, name: HeaderName, value: HeaderValue) -> Arc<Self> {
        self.config.write().headers.insert(name, value);
        self
    }

    /// Build outcomes from path template values.
    ///
    /// Values are empty for responders without a template.
    pub fn with_templated_factory(
        self: Arc<Self>,
        factory: impl Fn(&TemplateValues, &MockConnection) -> TransportOutcome + Send + Sync + 'static,
    ) -> Arc<Self> {
        self.config.write().templated_factory = Some(Arc::new(factory));
        self
    }

    /// Respond with the data `block` yields for the template values, or
    /// `404 Not Found` when it yields nothing.
    pub fn with_templated_data(
        self: Arc<Self>,
        block: impl Fn(&TemplateValues) -> Option<Bytes> + Send + Sync + 'static,
    ) -> Arc<Self> {
        let weak = Arc::downgrade(&self);
        self.with_templated_factory(move |values, connection| match block(values) {
            Some(data) => {
                let response = match weak.upgrade() {
                    Some(responder) => responder.make_response(connection),
                    None => WireResponse::new(connection.request().url.clone(), StatusCode::OK),
                };
                TransportOutcome::response(response, Some(data))
            }
            None => {
                let response =
                    WireResponse::new(connection.request().url.clone(), StatusCode::NOT_FOUND);
                TransportOutcome::response(response, None)
            }
        })
    }

    /// Like [`with_templated_data`](Self::with_templated_data) with a JSON
    /// value.
    pub fn with_templated_json(
        self: Arc<Self>,
        block: impl Fn(&TemplateValues) -> Option<serde_json::Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        self.with_templated_data(move |values| {
            block(values)
                .and_then(|value| serde_json::to_vec(&value).ok())
                .map(Bytes::from)
        })
    }

    /// Like [`with_templated_data`](Self::with_templated_data) with the
    /// contents of a file.
    pub fn with_templated_file(
        self: Arc<Self>,
        block: impl Fn(&TemplateValues) -> Option<PathBuf> + Send + Sync + 'static,
    ) -> Arc<Self> {
        self.with_templated_data(move |values| {
            block(values)
                .and_then(|path| std::fs::read(path).ok())
                .map(Bytes::from)
        })
    }

    /// Take a connection and schedule its response according to the mode.
    pub fn connect(self: &Arc<Self>, connection: Arc<MockConnection>) {
        self.connections.lock().push(connection.clone());
        connection.set_responder(self);

        let mode = self.mode();
        tracing::debug!(
            target: targets::MOCK,
            url = %connection.request().url,
            ?mode,
            "Mock responder connected"
        );

        let fallback = connection.queue().cloned();
        let responder = self.clone();
        let job: Job = Box::new(move || responder.respond(&connection));
        match mode {
            ResponderMode::Immediate => job(),
            ResponderMode::Sync(queue) => queue_for(queue, fallback).dispatch_sync(job),
            ResponderMode::Async(queue) => queue_for(queue, fallback).dispatch(job),
            ResponderMode::Delay(delay, queue) => queue_for(queue, fallback).dispatch_after(delay, job),
            ResponderMode::Manual => {}
        }
    }

    /// Respond to `connection` with the configured outcome, unless it
    /// already ended.
    pub fn respond(&self, connection: &MockConnection) {
        if !connection.is_active() {
            return;
        }
        let outcome = self.make_outcome(connection);
        connection.respond_with(outcome);
    }

    /// The outcome configured for `connection`.
    pub fn make_outcome(&self, connection: &MockConnection) -> TransportOutcome {
        let (templated_factory, factory, error, data) = {
            let config = self.config.read();
            (
                config.templated_factory.clone(),
                config.factory.clone(),
                config.error.clone(),
                config.data.clone(),
            )
        };

        if let Some(factory) = templated_factory {
            return factory(&self.template_values(connection), connection);
        }
        if let Some(factory) = factory {
            return factory(connection);
        }
        if let Some(error) = error {
            return TransportOutcome::error(error);
        }
        TransportOutcome::response(self.make_response(connection), data)
    }

    /// The response head configured for `connection`: the configured status
    /// (default `200 OK`) and headers at the request's URL.
    pub fn make_response(&self, connection: &MockConnection) -> WireResponse {
        let config = self.config.read();
        let mut response = WireResponse::new(
            connection.request().url.clone(),
            config.status.unwrap_or(StatusCode::OK),
        );
        response.headers = config.headers.clone();
        response
    }

    /// Placeholder values parsed from the connection's request path.
    pub fn template_values(&self, connection: &MockConnection) -> TemplateValues {
        match &self.template {
            Some(template) => {
                let view = RequestMatcher::new(connection.request(), &self.base_path);
                template.extract(view.request_path())
            }
            None => TemplateValues::new(),
        }
    }
}

/// The responder's queue, else the connection's, else the shared worker.
fn queue_for(configured: Option<Arc<dyn Queue>>, connection: Option<Arc<dyn Queue>>) -> Arc<dyn Queue> {
    configured
        .or(connection)
        .unwrap_or_else(|| WorkerQueue::shared() as Arc<dyn Queue>)
}

impl ConnectionLog for MockResponder {
    fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections.lock().clone()
    }
}

impl fmt::Debug for MockResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.config.read();
        f.debug_struct("MockResponder")
            .field("template", &self.template.as_ref().map(PathTemplate::as_str))
            .field("mode", &config.mode)
            .field("status", &config.status)
            .field("has_factory", &(config.factory.is_some() || config.templated_factory.is_some()))
            .field("has_error", &config.error.is_some())
            .field("connections", &self.connections.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use crossbeam_channel::{Receiver, bounded};
    use std::io::Write;
    use url::Url;

    fn connect(responder: &Arc<MockResponder>, path: &str) -> (Arc<MockConnection>, Receiver<TransportOutcome>) {
        let (tx, rx) = bounded(1);
        let url = Url::parse("http://test.stub").unwrap().join(path).unwrap();
        let connection = MockConnection::new(
            WireRequest::new(HttpMethod::Get, url),
            None,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        responder.connect(connection.clone());
        (connection, rx)
    }

    #[test]
    fn test_static_response() {
        let responder = MockResponder::any()
            .with_status(StatusCode::CREATED)
            .with_header(http::header::ETAG, HeaderValue::from_static("v1"))
            .with_json(&serde_json::json!({"id": 1}));

        let (connection, rx) = connect(&responder, "/users");
        let outcome = rx.try_recv().unwrap();
        let response = outcome.response.unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.header("etag"), Some("v1"));
        assert_eq!(outcome.data.unwrap().as_ref(), br#"{"id":1}"#);
        assert!(connection.is_responded());
        assert_eq!(responder.connections().len(), 1);
    }

    #[test]
    fn test_error_wins_over_data() {
        let error = share(std::io::Error::other("offline"));
        let responder = MockResponder::any().with_data("ignored").with_error(error);

        let (_, rx) = connect(&responder, "/");
        let outcome = rx.try_recv().unwrap();

        assert!(outcome.error.is_some());
        assert!(outcome.response.is_none());
        assert!(outcome.data.is_none());
    }

    #[test]
    fn test_factory_wins_over_static_fields() {
        let responder = MockResponder::any()
            .with_status(StatusCode::IM_A_TEAPOT)
            .with_factory(|connection| {
                let response = WireResponse::new(connection.request().url.clone(), StatusCode::ACCEPTED);
                TransportOutcome::response(response, None)
            });

        let (_, rx) = connect(&responder, "/");
        assert_eq!(rx.try_recv().unwrap().response.unwrap().status, StatusCode::ACCEPTED);
    }

    #[test]
    fn test_file_response() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"from disk").unwrap();

        let responder = MockResponder::any().with_file(file.path());
        let (_, rx) = connect(&responder, "/");
        assert_eq!(rx.try_recv().unwrap().data.unwrap().as_ref(), b"from disk");

        let missing = MockResponder::any().with_file("/definitely/not/here.json");
        let (_, rx) = connect(&missing, "/");
        assert!(rx.try_recv().unwrap().error.is_some());
    }

    #[test]
    fn test_templated_data_or_not_found() {
        let responder = MockResponder::templated(PathTemplate::new("/users/{id}"), "", |_| true)
            .with_templated_json(|values| match values.get("id").map(String::as_str) {
                Some("1") => Some(serde_json::json!({"name": "one"})),
                _ => None,
            });

        let (_, rx) = connect(&responder, "/users/1");
        let found = rx.try_recv().unwrap();
        assert_eq!(found.response.unwrap().status, StatusCode::OK);
        assert_eq!(found.data.unwrap().as_ref(), br#"{"name":"one"}"#);

        let (_, rx) = connect(&responder, "/users/2");
        let missing = rx.try_recv().unwrap();
        assert_eq!(missing.response.unwrap().status, StatusCode::NOT_FOUND);
        assert!(missing.data.is_none());
    }

    #[test]
    fn test_manual_mode_waits() {
        let responder = MockResponder::any().with_mode(ResponderMode::Manual);
        let (connection, rx) = connect(&responder, "/");

        assert!(rx.try_recv().is_err());
        assert!(responder.has_active_connection());

        connection.respond();
        assert!(rx.try_recv().is_ok());
        assert!(!responder.has_active_connection());
    }

    #[test]
    fn test_async_and_delay_modes_use_queue() {
        let queue: Arc<dyn Queue> = Arc::new(WorkerQueue::new());

        let responder = MockResponder::any().with_mode(ResponderMode::Async(Some(queue.clone())));
        let (_, rx) = connect(&responder, "/");
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());

        let responder = MockResponder::any()
            .with_mode(ResponderMode::Delay(Duration::from_millis(30), Some(queue)));
        let (connection, rx) = connect(&responder, "/");
        assert!(connection.is_active());
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn test_sync_mode_blocks_until_responded() {
        let responder = MockResponder::any().with_mode(ResponderMode::Sync(None));
        let (connection, rx) = connect(&responder, "/");

        assert!(connection.is_responded());
        assert!(rx.try_recv().is_ok());
    }
}
