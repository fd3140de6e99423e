//! Wire response type.

use http::StatusCode;
use url::Url;

/// The head of a response as reported by a transport.
#[derive(Clone, Debug)]
pub struct WireResponse {
    /// The final URL of the exchange.
    pub url: Url,
    /// The HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: http::HeaderMap,
}

impl WireResponse {
    /// Create a response head with no headers.
    pub fn new(url: Url, status: StatusCode) -> Self {
        Self {
            url,
            status,
            headers: http::HeaderMap::new(),
        }
    }

    /// Get a header value as a string.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }
}
