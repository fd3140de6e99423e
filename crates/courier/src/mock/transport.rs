//! The mock transport.

use std::fmt;
use std::sync::Arc;

use courier_core::logging::targets;
use courier_core::{Cancelable, Queue};
use parking_lot::{Mutex, RwLock};

use crate::http::{HttpMethod, WireRequest};
use crate::mock::{ConnectionLog, MockConnection, MockResponder, PathMatchMode, PathTemplate, RequestMatcher};
use crate::transport::{Transport, TransportHandler};

/// A transport answering requests from registered responders.
///
/// Each request goes to the first responder whose predicate accepts it.
/// Unmatched requests go to the pass-through transport when one is set, and
/// otherwise get an empty `200 OK`.
///
/// # Example
///
/// ```ignore
/// let mock = Arc::new(MockTransport::new());
/// mock.stub_template("/users/{id}", Some(HttpMethod::Get))
///     .with_templated_json(|values| Some(json!({ "id": values["id"] })));
///
/// let provider = Provider::builder("https://api.example.com")
///     .transport(mock.clone())
///     .build()?;
/// ```
pub struct MockTransport {
    responders: RwLock<Vec<Arc<MockResponder>>>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    passthrough: Option<Arc<dyn Transport>>,
    base_path: String,
    default_responder: Arc<MockResponder>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A mock transport with no responders and no pass-through.
    pub fn new() -> Self {
        Self {
            responders: RwLock::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
            passthrough: None,
            base_path: String::new(),
            default_responder: MockResponder::any(),
        }
    }

    /// Send unmatched requests to `transport`.
    pub fn with_passthrough(mut self, transport: Arc<dyn Transport>) -> Self {
        self.passthrough = Some(transport);
        self
    }

    /// Match stubbed paths relative to `base_path`.
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into().trim_end_matches('/').to_string();
        self
    }

    /// The base path stubbed paths are relative to.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The pass-through transport, if any.
    pub fn passthrough(&self) -> Option<&Arc<dyn Transport>> {
        self.passthrough.as_ref()
    }

    /// Registered responders, in match order.
    pub fn responders(&self) -> Vec<Arc<MockResponder>> {
        self.responders.read().clone()
    }

    /// Register a responder after those already registered.
    pub fn add_responder(&self, responder: Arc<MockResponder>) -> Arc<MockResponder> {
        self.responders.write().push(responder.clone());
        responder
    }

    /// Stub every request.
    pub fn stub(&self) -> Arc<MockResponder> {
        self.add_responder(MockResponder::any())
    }

    /// Stub requests accepted by `matcher`.
    pub fn stub_match(
        &self,
        matcher: impl Fn(&RequestMatcher<'_>) -> bool + Send + Sync + 'static,
    ) -> Arc<MockResponder> {
        let base_path = self.base_path.clone();
        self.add_responder(MockResponder::new(move |request| {
            matcher(&RequestMatcher::new(request, &base_path))
        }))
    }

    /// Stub requests by path, and by method when one is given.
    pub fn stub_path(
        &self,
        path: impl Into<String>,
        mode: PathMatchMode,
        method: Option<HttpMethod>,
    ) -> Arc<MockResponder> {
        let path = path.into();
        self.stub_match(move |matcher| {
            if let Some(method) = method
                && !matcher.method_eq(method)
            {
                return false;
            }
            mode.matches(matcher.request_path(), &path)
        })
    }

    /// Stub requests whose path matches `template`, and that `matcher`
    /// accepts.
    pub fn stub_template_match(
        &self,
        template: &str,
        matcher: impl Fn(&RequestMatcher<'_>) -> bool + Send + Sync + 'static,
    ) -> Arc<MockResponder> {
        self.add_responder(MockResponder::templated(
            PathTemplate::new(template),
            self.base_path.clone(),
            matcher,
        ))
    }

    /// Stub requests whose path matches `template`, and by method when one
    /// is given.
    pub fn stub_template(&self, template: &str, method: Option<HttpMethod>) -> Arc<MockResponder> {
        self.stub_template_match(template, move |matcher| {
            method.is_none_or(|method| matcher.method_eq(method))
        })
    }
}

impl Transport for MockTransport {
    fn send(
        &self,
        request: WireRequest,
        queue: Option<Arc<dyn Queue>>,
        handler: TransportHandler,
    ) -> Box<dyn Cancelable> {
        let responders = self.responders();
        let target = responders.into_iter().find(|r| r.matches(&request));

        if target.is_none()
            && let Some(passthrough) = &self.passthrough
        {
            tracing::debug!(
                target: targets::MOCK,
                method = %request.method,
                url = %request.url,
                "No responder matched, passing through"
            );
            return passthrough.send(request, queue, handler);
        }

        let connection = MockConnection::new(request, queue, handler);
        self.connections.lock().push(connection.clone());

        let responder = target.unwrap_or_else(|| self.default_responder.clone());
        responder.connect(connection.clone());
        Box::new(connection)
    }
}

impl ConnectionLog for MockTransport {
    fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections.lock().clone()
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("base_path", &self.base_path)
            .field("responders", &self.responders.read().len())
            .field("connections", &self.connections.lock().len())
            .field("passthrough", &self.passthrough.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportOutcome;
    use crossbeam_channel::{Receiver, bounded};
    use http::StatusCode;
    use url::Url;

    fn send(transport: &dyn Transport, method: HttpMethod, url: &str) -> Receiver<TransportOutcome> {
        let (tx, rx) = bounded(1);
        transport.send(
            WireRequest::new(method, Url::parse(url).unwrap()),
            None,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        rx
    }

    fn status(rx: Receiver<TransportOutcome>) -> StatusCode {
        rx.try_recv().unwrap().response.unwrap().status
    }

    #[test]
    fn test_no_responders_answers_ok() {
        let mock = MockTransport::new();
        let outcome = send(&mock, HttpMethod::Get, "http://api.test/anything").try_recv().unwrap();

        assert_eq!(outcome.response.unwrap().status, StatusCode::OK);
        assert!(outcome.data.is_none_or(|d| d.is_empty()));
        assert!(outcome.error.is_none());
        assert!(mock.has_connection());
    }

    #[test]
    fn test_first_match_wins() {
        let mock = MockTransport::new();
        let first = mock
            .stub_path("/users", PathMatchMode::Prefix, None)
            .with_status(StatusCode::ACCEPTED);
        let second = mock
            .stub_path("/users/1", PathMatchMode::EqualTo, None)
            .with_status(StatusCode::CREATED);

        assert_eq!(status(send(&mock, HttpMethod::Get, "http://api.test/users/1")), StatusCode::ACCEPTED);
        assert_eq!(first.connections().len(), 1);
        assert!(!second.has_connection());
    }

    #[test]
    fn test_method_filter_and_base_path() {
        let mock = MockTransport::new().with_base_path("/v1/");
        mock.stub_path("/users", PathMatchMode::EqualTo, Some(HttpMethod::Post))
            .with_status(StatusCode::CREATED);

        assert_eq!(status(send(&mock, HttpMethod::Post, "http://api.test/v1/users")), StatusCode::CREATED);
        assert_eq!(status(send(&mock, HttpMethod::Get, "http://api.test/v1/users")), StatusCode::OK);
    }

    #[test]
    fn test_template_stub() {
        let mock = MockTransport::new();
        mock.stub_template("/users/{id}", Some(HttpMethod::Get))
            .with_templated_data(|values| values.get("id").map(|id| id.clone().into()));

        let outcome = send(&mock, HttpMethod::Get, "http://api.test/users/42?x=1").try_recv().unwrap();
        assert_eq!(outcome.data.unwrap().as_ref(), b"42");

        assert_eq!(status(send(&mock, HttpMethod::Get, "http://api.test/users")), StatusCode::OK);
    }

    #[test]
    fn test_unmatched_goes_to_passthrough() {
        let real = Arc::new(MockTransport::new());
        real.stub().with_status(StatusCode::NO_CONTENT);

        let mock = MockTransport::new().with_passthrough(real.clone());
        mock.stub_path("/local", PathMatchMode::EqualTo, None);

        assert_eq!(status(send(&mock, HttpMethod::Get, "http://api.test/remote")), StatusCode::NO_CONTENT);
        assert!(!mock.has_connection());
        assert!(real.has_connection());

        assert_eq!(status(send(&mock, HttpMethod::Get, "http://api.test/local")), StatusCode::OK);
        assert_eq!(mock.connections().len(), 1);
    }
}
