//! Providers: the shared defaults of one remote API.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use courier::{BearerTokenAuthentication, Provider, ResponseStatusValidator};
//!
//! let provider = Provider::builder("https://api.example.com/v1")
//!     .require_authentication(true)
//!     .authentication(Arc::new(BearerTokenAuthentication::new("token")?))
//!     .plugin(Arc::new(ResponseStatusValidator))
//!     .build()?;
//!
//! provider.get("/users").send(|result| println!("{:?}", result));
//! ```

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::auth::Authentication;
use crate::error::RequestBuildError;
use crate::http::HttpMethod;
use crate::mock::MockTransport;
use crate::plugin::{Plugin, PluginHub};
use crate::request::{ParameterEncoding, WebApiRequest};
use crate::transport::Transport;

/// Default cap on credential refreshes per dispatch.
pub const DEFAULT_MAX_AUTHENTICATION_REFRESHES: u32 = 3;

/// Builder for a [`Provider`].
pub struct ProviderBuilder {
    base_url: String,
    parameter_encoding: ParameterEncoding,
    plugins: PluginHub,
    require_authentication: bool,
    authentication: Option<Arc<dyn Authentication>>,
    transport: Option<Arc<dyn Transport>>,
    default_headers: http::HeaderMap,
    max_authentication_refreshes: u32,
}

impl ProviderBuilder {
    /// Create a new builder with the specified base URL.
    ///
    /// All endpoint paths are appended to this URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            parameter_encoding: ParameterEncoding::default(),
            plugins: PluginHub::new(),
            require_authentication: false,
            authentication: None,
            transport: None,
            default_headers: http::HeaderMap::new(),
            max_authentication_refreshes: DEFAULT_MAX_AUTHENTICATION_REFRESHES,
        }
    }

    /// Set how endpoint parameters are encoded by default.
    pub fn parameter_encoding(mut self, encoding: ParameterEncoding) -> Self {
        self.parameter_encoding = encoding;
        self
    }

    /// Replace the provider-level plugin hub.
    pub fn plugins(mut self, plugins: PluginHub) -> Self {
        self.plugins = plugins;
        self
    }

    /// Register a plugin in the provider-level hub.
    pub fn plugin<P: Plugin>(mut self, plugin: Arc<P>) -> Self {
        self.plugins = self.plugins.add(plugin);
        self
    }

    /// Whether endpoints require authentication unless they say otherwise.
    pub fn require_authentication(mut self, required: bool) -> Self {
        self.require_authentication = required;
        self
    }

    /// Set the default credentials.
    pub fn authentication(mut self, authentication: Arc<dyn Authentication>) -> Self {
        self.authentication = Some(authentication);
        self
    }

    /// Set the default transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Add a header sent with every request.
    pub fn default_header(
        mut self,
        name: impl TryInto<http::HeaderName>,
        value: impl TryInto<http::HeaderValue>,
    ) -> Self {
        if let (Ok(name), Ok(value)) = (name.try_into(), value.try_into()) {
            self.default_headers.insert(name, value);
        }
        self
    }

    /// Cap how many times one dispatch may refresh rejected credentials.
    pub fn max_authentication_refreshes(mut self, max: u32) -> Self {
        self.max_authentication_refreshes = max;
        self
    }

    /// Replace the transport with a mock.
    ///
    /// The current transport, if any, becomes the mock's pass-through, and
    /// stubbed paths are taken relative to the base URL's path.
    pub fn stub_transport(mut self) -> (Self, Arc<MockTransport>) {
        let base_path = Url::parse(&self.base_url)
            .map(|url| url.path().to_string())
            .unwrap_or_default();

        let mut mock = MockTransport::new().with_base_path(base_path);
        if let Some(passthrough) = self.transport.take() {
            mock = mock.with_passthrough(passthrough);
        }
        let mock = Arc::new(mock);
        self.transport = Some(mock.clone());
        (self, mock)
    }

    /// Build the provider.
    pub fn build(self) -> Result<Provider, RequestBuildError> {
        let base_url = Url::parse(&self.base_url)?;

        Ok(Provider {
            inner: Arc::new(ProviderInner {
                base_url,
                parameter_encoding: self.parameter_encoding,
                plugins: self.plugins,
                require_authentication: self.require_authentication,
                authentication: self.authentication,
                transport: self.transport,
                default_headers: self.default_headers,
                max_authentication_refreshes: self.max_authentication_refreshes,
            }),
        })
    }
}

struct ProviderInner {
    base_url: Url,
    parameter_encoding: ParameterEncoding,
    plugins: PluginHub,
    require_authentication: bool,
    authentication: Option<Arc<dyn Authentication>>,
    transport: Option<Arc<dyn Transport>>,
    default_headers: http::HeaderMap,
    max_authentication_refreshes: u32,
}

/// The shared defaults of one remote API.
///
/// Cheap to clone; every [`WebApiRequest`] keeps a handle to its provider.
/// Configuration is fixed once built, so a provider can be read from any
/// number of concurrent dispatches.
#[derive(Clone)]
pub struct Provider {
    inner: Arc<ProviderInner>,
}

impl Provider {
    /// Create a new builder for configuring a provider.
    pub fn builder(base_url: impl Into<String>) -> ProviderBuilder {
        ProviderBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn parameter_encoding(&self) -> ParameterEncoding {
        self.inner.parameter_encoding
    }

    /// The provider-level plugin hub.
    pub fn plugins(&self) -> &PluginHub {
        &self.inner.plugins
    }

    pub fn require_authentication(&self) -> bool {
        self.inner.require_authentication
    }

    pub fn authentication(&self) -> Option<&Arc<dyn Authentication>> {
        self.inner.authentication.as_ref()
    }

    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.inner.transport.as_ref()
    }

    pub fn default_headers(&self) -> &http::HeaderMap {
        &self.inner.default_headers
    }

    pub fn max_authentication_refreshes(&self) -> u32 {
        self.inner.max_authentication_refreshes
    }

    /// Describe an endpoint of this API.
    pub fn request(&self, method: HttpMethod, path: impl Into<String>) -> WebApiRequest {
        WebApiRequest::new(self.clone(), method, path)
    }

    pub fn get(&self, path: impl Into<String>) -> WebApiRequest {
        self.request(HttpMethod::Get, path)
    }

    pub fn post(&self, path: impl Into<String>) -> WebApiRequest {
        self.request(HttpMethod::Post, path)
    }

    pub fn put(&self, path: impl Into<String>) -> WebApiRequest {
        self.request(HttpMethod::Put, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> WebApiRequest {
        self.request(HttpMethod::Delete, path)
    }

    pub fn patch(&self, path: impl Into<String>) -> WebApiRequest {
        self.request(HttpMethod::Patch, path)
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("base_url", &self.inner.base_url.as_str())
            .field("parameter_encoding", &self.inner.parameter_encoding)
            .field("plugins", &self.inner.plugins)
            .field("require_authentication", &self.inner.require_authentication)
            .field("has_authentication", &self.inner.authentication.is_some())
            .field("transport", &self.inner.transport)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ConnectionLog;

    #[test]
    fn test_builder_defaults() {
        let provider = Provider::builder("https://api.example.com/v1").build().unwrap();

        assert_eq!(provider.base_url().as_str(), "https://api.example.com/v1");
        assert_eq!(provider.parameter_encoding(), ParameterEncoding::Url);
        assert!(!provider.require_authentication());
        assert!(provider.authentication().is_none());
        assert!(provider.transport().is_none());
        assert!(provider.plugins().is_empty());
        assert_eq!(provider.max_authentication_refreshes(), DEFAULT_MAX_AUTHENTICATION_REFRESHES);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            Provider::builder("not a url").build(),
            Err(RequestBuildError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_stub_transport_wraps_existing() {
        let real: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let (builder, mock) = Provider::builder("https://api.example.com/v1/")
            .transport(real)
            .stub_transport();
        let provider = builder.build().unwrap();

        assert_eq!(mock.base_path(), "/v1");
        assert!(mock.passthrough().is_some());
        assert!(!mock.has_connection());
        assert!(provider.transport().is_some());
    }
}
