//! Response value delivered to result handlers.

use bytes::Bytes;
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{ResponseDecodeError, Result, WebApiError, WebApiResult, share};

/// A validated response: status, headers, and the raw body.
///
/// Response processors receive and return this type; the body is only
/// changed by processors.
#[derive(Clone, Debug)]
pub struct WebApiResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: http::HeaderMap,
    /// The raw response body. Empty when the transport delivered none.
    pub data: Bytes,
}

impl Default for WebApiResponse {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

impl WebApiResponse {
    /// Create a response with the given status, no headers, and no body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: http::HeaderMap::new(),
            data: Bytes::new(),
        }
    }

    /// Replace the body.
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Check if the response indicates success (2xx status).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get the body as UTF-8 text.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.data.to_vec()).map_err(|err| {
            WebApiError::InvalidResponse(share(ResponseDecodeError::InvalidData(err.to_string())))
        })
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.data.is_empty() {
            return Err(WebApiError::InvalidResponse(share(ResponseDecodeError::NoData)));
        }
        serde_json::from_slice(&self.data)
            .map_err(|err| WebApiError::InvalidResponse(share(ResponseDecodeError::from(err))))
    }
}

/// Decode a dispatch result into a typed value.
pub fn decode_json<T: DeserializeOwned>(result: WebApiResult) -> Result<T> {
    result.and_then(|response| response.json())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_decoding() {
        let response = WebApiResponse::default().with_data(&b"[0, 1]"[..]);
        let values: Vec<i32> = response.json().expect("valid json");
        assert_eq!(values, vec![0, 1]);
    }

    #[test]
    fn test_empty_body_is_no_data() {
        let err = WebApiResponse::default().json::<Vec<i32>>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid response: HTTP response has no data");
    }

    #[test]
    fn test_decode_passes_failures_through() {
        let result: WebApiResult = Err(WebApiError::NoResponse);
        assert!(matches!(
            decode_json::<serde_json::Value>(result),
            Err(WebApiError::NoResponse)
        ));
    }
}
