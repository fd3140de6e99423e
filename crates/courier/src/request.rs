//! Endpoint descriptors.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use courier_core::Queue;
use courier_core::logging::targets;
use http::header::{CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use url::Url;

use crate::auth::Authentication;
use crate::error::{AuthenticationError, RequestBuildError, Result, WebApiError, WebApiResult, share};
use crate::http::{HttpMethod, ReqwestTransport, WireRequest};
use crate::plugin::{self, Plugin, PluginHub};
use crate::provider::Provider;
use crate::sender::{SendHandle, Sender};
use crate::transport::Transport;

/// How endpoint parameters are placed in the wire request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParameterEncoding {
    /// Query string for GET, HEAD and DELETE; form body otherwise.
    #[default]
    Url,
    /// JSON object body.
    Json,
}

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
const JSON_CONTENT_TYPE: &str = "application/json";

/// One endpoint of a [`Provider`]'s API, with per-request configuration.
///
/// Anything left unset falls back to the provider: authentication
/// requirement, credentials, transport and parameter encoding. Per-request
/// plugins run after the provider's.
#[derive(Clone)]
pub struct WebApiRequest {
    provider: Provider,
    path: String,
    method: HttpMethod,
    require_authentication: Option<bool>,
    authentication: Option<Arc<dyn Authentication>>,
    transport: Option<Arc<dyn Transport>>,
    queue: Option<Arc<dyn Queue>>,
    plugins: Option<PluginHub>,
    query_items: Vec<(String, String)>,
    headers: http::HeaderMap,
    parameters: Map<String, Value>,
    parameter_encoding: Option<ParameterEncoding>,
    body: Option<Bytes>,
}

impl WebApiRequest {
    /// Describe `method path` on `provider`.
    pub fn new(provider: Provider, method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            provider,
            path: path.into(),
            method,
            require_authentication: None,
            authentication: None,
            transport: None,
            queue: None,
            plugins: None,
            query_items: Vec::new(),
            headers: http::HeaderMap::new(),
            parameters: Map::new(),
            parameter_encoding: None,
            body: None,
        }
    }

    // Configuration

    /// Override whether this endpoint requires authentication.
    pub fn require_authentication(mut self, required: bool) -> Self {
        self.require_authentication = Some(required);
        self
    }

    /// Override the provider's credentials.
    pub fn authentication(mut self, authentication: Arc<dyn Authentication>) -> Self {
        self.authentication = Some(authentication);
        self
    }

    /// Override the provider's transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Ask the transport to deliver completions on `queue`.
    pub fn queue(mut self, queue: Arc<dyn Queue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Set the request-level plugin hub.
    pub fn plugins(mut self, plugins: PluginHub) -> Self {
        self.plugins = Some(plugins);
        self
    }

    /// Register a plugin in the request-level hub.
    pub fn plugin<P: Plugin>(mut self, plugin: Arc<P>) -> Self {
        self.plugins = Some(self.plugins.take().unwrap_or_default().add(plugin));
        self
    }

    /// Add a query item.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_items.push((key.into(), value.into()));
        self
    }

    /// Add a header, replacing any default with the same name.
    pub fn header(
        mut self,
        name: impl TryInto<http::HeaderName>,
        value: impl TryInto<http::HeaderValue>,
    ) -> Self {
        if let (Ok(name), Ok(value)) = (name.try_into(), value.try_into()) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Add a parameter, encoded according to the parameter encoding.
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Add every field of a serializable struct or map as a parameter.
    ///
    /// Values that do not serialize to a JSON object are ignored.
    pub fn parameters<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(Value::Object(map)) => self.parameters.extend(map),
            Ok(_) => {
                tracing::warn!(target: targets::REQUEST, "Parameters must serialize to an object");
            }
            Err(err) => {
                tracing::error!(target: targets::REQUEST, "Failed to serialize parameters: {}", err);
            }
        }
        self
    }

    /// Override the provider's parameter encoding.
    pub fn parameter_encoding(mut self, encoding: ParameterEncoding) -> Self {
        self.parameter_encoding = Some(encoding);
        self
    }

    /// Set a raw body. A body replaces any parameters in the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    // Accessors

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// The request-level plugin hub.
    pub fn plugin_hub(&self) -> Option<&PluginHub> {
        self.plugins.as_ref()
    }

    pub fn delivery_queue(&self) -> Option<&Arc<dyn Queue>> {
        self.queue.as_ref()
    }

    /// Whether authentication is required, after provider fallback.
    pub fn requires_authentication(&self) -> bool {
        self.require_authentication
            .unwrap_or_else(|| self.provider.require_authentication())
    }

    /// The credentials in effect, after provider fallback.
    pub fn effective_authentication(&self) -> Option<Arc<dyn Authentication>> {
        self.authentication
            .clone()
            .or_else(|| self.provider.authentication().cloned())
    }

    /// The transport in effect: this request's, else the provider's, else
    /// the shared [`ReqwestTransport`].
    pub fn effective_transport(&self) -> Arc<dyn Transport> {
        self.transport
            .clone()
            .or_else(|| self.provider.transport().cloned())
            .unwrap_or_else(|| ReqwestTransport::shared() as Arc<dyn Transport>)
    }

    pub fn effective_parameter_encoding(&self) -> ParameterEncoding {
        self.parameter_encoding
            .unwrap_or_else(|| self.provider.parameter_encoding())
    }

    // Building

    /// Build the wire request: URL, then method, headers and body, then
    /// authentication and request processors.
    pub fn to_wire_request(&self) -> Result<WireRequest> {
        let wire = self
            .make_wire_request()
            .map_err(|err| WebApiError::InvalidRequest(share(err)))?;
        self.process_wire_request(wire)
    }

    /// The base URL joined with the path and query items.
    pub fn make_url(&self) -> std::result::Result<Url, RequestBuildError> {
        let mut url = self.provider.base_url().clone();

        let base = url.path().trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        let joined = if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        };
        url.set_path(&joined);

        if !self.query_items.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_items {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// The unauthenticated wire request with parameters encoded.
    pub fn make_wire_request(&self) -> std::result::Result<WireRequest, RequestBuildError> {
        let mut wire = WireRequest::new(self.method, self.make_url()?);

        wire.headers = self.provider.default_headers().clone();
        for (name, value) in &self.headers {
            wire.headers.insert(name.clone(), value.clone());
        }

        if let Some(body) = &self.body {
            wire.body = Some(body.clone());
        } else if !self.parameters.is_empty() {
            self.encode_parameters(&mut wire)?;
        }

        Ok(wire)
    }

    /// Apply authentication when required, then request processors.
    pub fn process_wire_request(&self, wire: WireRequest) -> Result<WireRequest> {
        let mut wire = wire;

        if self.requires_authentication() {
            let authentication = self
                .effective_authentication()
                .ok_or(AuthenticationError::Missing)?;
            if !authentication.is_valid() {
                return Err(AuthenticationError::Invalid.into());
            }
            wire = authentication
                .authenticate(wire)
                .map_err(WebApiError::from_request_error)?;
        }

        plugin::process_request(self.provider.plugins(), self.plugins.as_ref(), wire)
            .map_err(WebApiError::from_request_error)
    }

    fn encode_parameters(&self, wire: &mut WireRequest) -> std::result::Result<(), RequestBuildError> {
        match self.effective_parameter_encoding() {
            ParameterEncoding::Url if self.method.encodes_parameters_in_url() => {
                let mut pairs = wire.url.query_pairs_mut();
                for (key, value) in &self.parameters {
                    pairs.append_pair(key, &parameter_text(value));
                }
            }
            ParameterEncoding::Url => {
                let mut form = url::form_urlencoded::Serializer::new(String::new());
                for (key, value) in &self.parameters {
                    form.append_pair(key, &parameter_text(value));
                }
                wire.body = Some(Bytes::from(form.finish()));
                set_default_content_type(wire, FORM_CONTENT_TYPE);
            }
            ParameterEncoding::Json => {
                wire.body = Some(Bytes::from(serde_json::to_vec(&self.parameters)?));
                set_default_content_type(wire, JSON_CONTENT_TYPE);
            }
        }
        Ok(())
    }

    // Sending

    /// Send with the transport in effect.
    pub fn send(&self, handler: impl FnOnce(WebApiResult) + Send + 'static) -> SendHandle {
        self.send_by(self.effective_transport(), handler)
    }

    /// Send with an explicit transport.
    pub fn send_by(
        &self,
        transport: Arc<dyn Transport>,
        handler: impl FnOnce(WebApiResult) + Send + 'static,
    ) -> SendHandle {
        Sender::start(self.clone(), transport, Box::new(handler))
    }

    /// Send and decode a successful body as JSON.
    pub fn send_and_decode<T>(&self, handler: impl FnOnce(Result<T>) + Send + 'static) -> SendHandle
    where
        T: DeserializeOwned + 'static,
    {
        self.send(move |result| handler(crate::response::decode_json(result)))
    }

    /// Send and wait for the result.
    ///
    /// Dropping the future cancels the dispatch.
    pub async fn send_async(&self) -> WebApiResult {
        let (tx, rx) = oneshot::channel();
        let handle = self.send(move |result| {
            let _ = tx.send(result);
        });
        let guard = CancelOnDrop(Some(handle));

        let result = rx.await;
        guard.disarm();
        result.unwrap_or(Err(WebApiError::NoResponse))
    }

    /// Like [`send_async`](Self::send_async), decoding the body as JSON.
    pub async fn send_async_decode<T: DeserializeOwned>(&self) -> Result<T> {
        crate::response::decode_json(self.send_async().await)
    }
}

impl fmt::Debug for WebApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("require_authentication", &self.require_authentication)
            .field("has_authentication", &self.authentication.is_some())
            .field("plugins", &self.plugins)
            .field("query_items", &self.query_items)
            .field("parameters", &self.parameters)
            .finish()
    }
}

struct CancelOnDrop(Option<SendHandle>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.cancel();
        }
    }
}

fn parameter_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn set_default_content_type(wire: &mut WireRequest, content_type: &'static str) {
    if !wire.headers.contains_key(CONTENT_TYPE) {
        wire.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::BearerTokenAuthentication;
    use crate::error::SharedError;

    fn provider(base: &str) -> Provider {
        Provider::builder(base).build().unwrap()
    }

    #[derive(Debug)]
    struct Unusable;

    impl Authentication for Unusable {
        fn is_valid(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_make_url_joins_path_and_query() {
        let request = provider("https://api.example.com/v1/")
            .get("/users")
            .query("page", "2");
        assert_eq!(
            request.make_url().unwrap().as_str(),
            "https://api.example.com/v1/users?page=2"
        );

        let root = provider("https://api.example.com").get("status");
        assert_eq!(root.make_url().unwrap().as_str(), "https://api.example.com/status");
    }

    #[test]
    fn test_url_encoding_by_method() {
        let get = provider("https://api.example.com")
            .get("/search")
            .parameter("q", "rust lang")
            .parameter("limit", 10)
            .make_wire_request()
            .unwrap();
        assert_eq!(get.url.query(), Some("limit=10&q=rust+lang"));
        assert!(get.body.is_none());

        let post = provider("https://api.example.com")
            .post("/search")
            .parameter("q", "rust")
            .make_wire_request()
            .unwrap();
        assert_eq!(post.body.as_deref(), Some(&b"q=rust"[..]));
        assert_eq!(post.header("content-type"), Some(FORM_CONTENT_TYPE));
    }

    #[test]
    fn test_json_encoding_and_body_precedence() {
        let json = provider("https://api.example.com")
            .post("/users")
            .parameter_encoding(ParameterEncoding::Json)
            .parameter("name", "ana")
            .make_wire_request()
            .unwrap();
        assert_eq!(json.body.as_deref(), Some(&br#"{"name":"ana"}"#[..]));
        assert_eq!(json.header("content-type"), Some(JSON_CONTENT_TYPE));

        let raw = provider("https://api.example.com")
            .post("/users")
            .parameter("name", "ana")
            .body("raw")
            .make_wire_request()
            .unwrap();
        assert_eq!(raw.body.as_deref(), Some(&b"raw"[..]));
    }

    #[test]
    fn test_request_headers_override_defaults() {
        let provider = Provider::builder("https://api.example.com")
            .default_header("accept", "text/plain")
            .default_header("x-client", "courier")
            .build()
            .unwrap();

        let wire = provider
            .get("/")
            .header("accept", "application/json")
            .make_wire_request()
            .unwrap();
        assert_eq!(wire.header("accept"), Some("application/json"));
        assert_eq!(wire.header("x-client"), Some("courier"));
    }

    #[test]
    fn test_authentication_resolution() {
        let provider = provider("https://api.example.com");

        let missing = provider.get("/me").require_authentication(true).to_wire_request();
        assert!(matches!(missing, Err(ref e) if e.is_authentication(AuthenticationError::Missing)));

        let invalid = provider
            .get("/me")
            .require_authentication(true)
            .authentication(Arc::new(Unusable))
            .to_wire_request();
        assert!(matches!(invalid, Err(ref e) if e.is_authentication(AuthenticationError::Invalid)));

        let wire = provider
            .get("/me")
            .require_authentication(true)
            .authentication(Arc::new(BearerTokenAuthentication::new("t0k").unwrap()))
            .to_wire_request()
            .unwrap();
        assert_eq!(wire.header("authorization"), Some("Bearer t0k"));

        let unrequired = provider
            .get("/public")
            .authentication(Arc::new(Unusable))
            .to_wire_request();
        assert!(unrequired.is_ok());
    }

    #[test]
    fn test_processor_errors_are_normalized() {
        let hub = PluginHub::new().add_request_processor(Arc::new(
            |_: WireRequest| -> std::result::Result<WireRequest, SharedError> {
                Err(share(std::io::Error::other("rejected")))
            },
        ));
        let result = provider("https://api.example.com").get("/").plugins(hub).to_wire_request();
        assert!(matches!(result, Err(WebApiError::InvalidRequest(_))));

        let passthrough = PluginHub::new().add_request_processor(Arc::new(
            |_: WireRequest| -> std::result::Result<WireRequest, SharedError> {
                Err(share(WebApiError::NoResponse))
            },
        ));
        let result = provider("https://api.example.com").get("/").plugins(passthrough).to_wire_request();
        assert!(matches!(result, Err(WebApiError::NoResponse)));
    }
}
