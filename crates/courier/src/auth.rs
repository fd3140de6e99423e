//! Authentication capabilities.
//!
//! An [`Authentication`] stamps outgoing requests and judges whether a
//! received status means the credentials were rejected. Credentials that can
//! renew themselves additionally implement [`RefreshableAuthentication`] and
//! expose it through [`Authentication::as_refreshable`].

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{AUTHORIZATION, HeaderValue};
use http::StatusCode;

use crate::error::{AuthenticationError, SharedError, WebApiError, share};
use crate::http::{WireRequest, WireResponse};

/// Completion callback for [`RefreshableAuthentication::refresh`].
pub type RefreshHandler = Box<dyn FnOnce(bool) + Send + 'static>;

/// Credentials applied to requests and checked against responses.
pub trait Authentication: Send + Sync + fmt::Debug {
    /// Whether the credentials are usable. A request requiring
    /// authentication is not sent while this is `false`.
    fn is_valid(&self) -> bool {
        true
    }

    /// Apply the credentials to a request.
    fn authenticate(&self, request: WireRequest) -> Result<WireRequest, SharedError> {
        Ok(request)
    }

    /// Check a received response, returning the failure it represents.
    fn validate(&self, status: StatusCode, _response: &WireResponse) -> Option<WebApiError> {
        if status == StatusCode::UNAUTHORIZED {
            Some(AuthenticationError::Failed.into())
        } else {
            None
        }
    }

    /// These credentials as refreshable ones, if they support refresh.
    fn as_refreshable(&self) -> Option<&dyn RefreshableAuthentication> {
        None
    }
}

/// Credentials that can obtain new values after being rejected.
pub trait RefreshableAuthentication: Authentication {
    /// Whether a refresh may be attempted right now.
    fn can_refresh(&self) -> bool;

    /// Obtain new credentials.
    ///
    /// `on_complete` must be called exactly once, from any thread, with
    /// whether the refresh succeeded.
    fn refresh(&self, on_complete: RefreshHandler);
}

/// Authentication that sets the `Authorization` header to a fixed value.
#[derive(Clone)]
pub struct HeaderAuthentication {
    value: HeaderValue,
}

impl HeaderAuthentication {
    /// Create from a full header value.
    pub fn new(value: impl AsRef<str>) -> Result<Self, SharedError> {
        let mut value = HeaderValue::from_str(value.as_ref()).map_err(share)?;
        value.set_sensitive(true);
        Ok(Self { value })
    }

    /// The header value that will be sent.
    pub fn value(&self) -> &HeaderValue {
        &self.value
    }
}

impl fmt::Debug for HeaderAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderAuthentication")
            .field("value", &"<redacted>")
            .finish()
    }
}

impl Authentication for HeaderAuthentication {
    fn authenticate(&self, request: WireRequest) -> Result<WireRequest, SharedError> {
        Ok(request.with_header(AUTHORIZATION, self.value.clone()))
    }
}

/// HTTP Basic authentication: `Authorization: Basic base64(user:password)`.
#[derive(Clone, Debug)]
pub struct BasicAuthentication(HeaderAuthentication);

impl BasicAuthentication {
    /// Create from a user name and password.
    pub fn new(user: &str, password: &str) -> Result<Self, SharedError> {
        let encoded = STANDARD.encode(format!("{user}:{password}"));
        HeaderAuthentication::new(format!("Basic {encoded}")).map(Self)
    }
}

/// Bearer token authentication: `Authorization: Bearer <token>`.
#[derive(Clone, Debug)]
pub struct BearerTokenAuthentication(HeaderAuthentication);

impl BearerTokenAuthentication {
    /// Create from a token.
    pub fn new(token: &str) -> Result<Self, SharedError> {
        HeaderAuthentication::new(format!("Bearer {token}")).map(Self)
    }
}

/// Token authentication with a custom header format.
///
/// The format must contain `{token}`, which is replaced by the token.
#[derive(Clone, Debug)]
pub struct CustomTokenAuthentication(HeaderAuthentication);

impl CustomTokenAuthentication {
    /// Default header format.
    pub const DEFAULT_FORMAT: &'static str = "Token token={token}";

    /// Create with the default `Token token=<token>` format.
    pub fn new(token: &str) -> Result<Self, SharedError> {
        Self::with_format(token, Self::DEFAULT_FORMAT)
    }

    /// Create with a custom format.
    pub fn with_format(token: &str, format: &str) -> Result<Self, SharedError> {
        HeaderAuthentication::new(format.replace("{token}", token)).map(Self)
    }
}

macro_rules! delegate_header_authentication {
    ($($ty:ty),*) => {
        $(
            impl $ty {
                /// The header value that will be sent.
                pub fn value(&self) -> &HeaderValue {
                    self.0.value()
                }
            }

            impl Authentication for $ty {
                fn authenticate(&self, request: WireRequest) -> Result<WireRequest, SharedError> {
                    self.0.authenticate(request)
                }
            }
        )*
    };
}

delegate_header_authentication!(
    BasicAuthentication,
    BearerTokenAuthentication,
    CustomTokenAuthentication
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpMethod;

    fn wire() -> WireRequest {
        WireRequest::new(
            HttpMethod::Get,
            url::Url::parse("http://test.api/users").expect("url"),
        )
    }

    #[derive(Debug)]
    struct Plain;
    impl Authentication for Plain {}

    #[test]
    fn test_default_validation_flags_401_only() {
        let response = WireResponse::new(
            url::Url::parse("http://test.api").expect("url"),
            StatusCode::UNAUTHORIZED,
        );
        let err = Plain.validate(StatusCode::UNAUTHORIZED, &response);
        assert!(matches!(
            err,
            Some(WebApiError::Authentication(AuthenticationError::Failed))
        ));
        assert!(Plain.validate(StatusCode::FORBIDDEN, &response).is_none());
        assert!(Plain.is_valid());
        assert!(Plain.as_refreshable().is_none());
    }

    #[test]
    fn test_header_authentications() {
        let basic = BasicAuthentication::new("user", "pass").expect("basic");
        let request = basic.authenticate(wire()).expect("authenticated");
        assert_eq!(request.header("authorization"), Some("Basic dXNlcjpwYXNz"));

        let bearer = BearerTokenAuthentication::new("abc").expect("bearer");
        let request = bearer.authenticate(wire()).expect("authenticated");
        assert_eq!(request.header("authorization"), Some("Bearer abc"));

        let custom = CustomTokenAuthentication::new("abc").expect("custom");
        assert_eq!(custom.value(), "Token token=abc");

        let custom = CustomTokenAuthentication::with_format("abc", "Key {token}").expect("custom");
        assert_eq!(custom.value(), "Key abc");
    }

    #[test]
    fn test_header_value_rejects_newlines() {
        assert!(BearerTokenAuthentication::new("bad\ntoken").is_err());
    }
}
