//! Error types for Courier.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// A shareable, type-erased error cause.
///
/// Causes are reference-counted so a single configured error (for example
/// a mock responder's) can be delivered to any number of dispatches.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Wrap any error as a [`SharedError`].
pub fn share<E>(err: E) -> SharedError
where
    E: StdError + Send + Sync + 'static,
{
    Arc::new(err)
}

/// Authentication failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationError {
    /// Required authentication is missing in both request and provider.
    Missing,
    /// Authentication is invalid; the request was not sent.
    Invalid,
    /// The server rejected the authentication (normally 401 Unauthorized).
    Failed,
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "Endpoint requires authentication. Request not sent."),
            Self::Invalid => write!(f, "Authentication is invalid. Request not sent."),
            Self::Failed => write!(f, "Server failed the authentication."),
        }
    }
}

impl StdError for AuthenticationError {}

/// Failures delivered to a request's result handler.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WebApiError {
    /// Authentication is missing, invalid, or was rejected.
    #[error("Authentication error: {0}")]
    Authentication(AuthenticationError),

    /// The wire request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(SharedError),

    /// The transport failed to send the request.
    #[error("Send request failed: {0}")]
    SendFailed(SharedError),

    /// The transport completed without an error but also without a response.
    #[error("No response received")]
    NoResponse,

    /// The response was rejected by a processor or could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(SharedError),
}

impl WebApiError {
    /// Check if this is an authentication error of the given kind.
    pub fn is_authentication(&self, kind: AuthenticationError) -> bool {
        matches!(self, Self::Authentication(k) if *k == kind)
    }

    /// Normalize a build-stage error: engine errors pass through unchanged,
    /// anything else becomes [`WebApiError::InvalidRequest`].
    pub(crate) fn from_request_error(err: SharedError) -> Self {
        match err.downcast_ref::<WebApiError>() {
            Some(api) => api.clone(),
            None => Self::InvalidRequest(err),
        }
    }

    /// Normalize a response-stage error: engine errors pass through
    /// unchanged, anything else becomes [`WebApiError::InvalidResponse`].
    pub(crate) fn from_response_error(err: SharedError) -> Self {
        match err.downcast_ref::<WebApiError>() {
            Some(api) => api.clone(),
            None => Self::InvalidResponse(err),
        }
    }
}

impl From<AuthenticationError> for WebApiError {
    fn from(err: AuthenticationError) -> Self {
        Self::Authentication(err)
    }
}

/// Errors raised while decoding a response body.
#[derive(Debug, thiserror::Error)]
pub enum ResponseDecodeError {
    /// The response carried no body.
    #[error("HTTP response has no data")]
    NoData,

    /// The body was not in the expected shape.
    #[error("Invalid http response data: {0}")]
    InvalidData(String),

    /// The body was not valid JSON for the target type.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while building a wire request.
#[derive(Debug, thiserror::Error)]
pub enum RequestBuildError {
    /// The base URL and path did not form a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Parameters could not be encoded into the body.
    #[error("Parameter encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A specialized Result type for Courier operations.
pub type Result<T> = std::result::Result<T, WebApiError>;

/// The value delivered to a request's result handler.
pub type WebApiResult = Result<crate::response::WebApiResponse>;
