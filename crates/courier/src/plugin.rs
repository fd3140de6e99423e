//! Plugin hub: request processors, response processors, and hooks.
//!
//! A plugin is any value implementing one or more of the interception
//! traits. [`PluginHub::add`] probes a plugin through the [`Plugin`] trait
//! and registers it in every list whose capability it offers. Registration
//! order is invocation order.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use courier::{HttpHook, Plugin, PluginHub, WireRequest};
//!
//! struct Logger;
//!
//! impl HttpHook for Logger {
//!     fn will_send(&self, request: &WireRequest) {
//!         println!("-> {} {}", request.method, request.url);
//!     }
//! }
//!
//! impl Plugin for Logger {
//!     fn as_hook(self: Arc<Self>) -> Option<Arc<dyn HttpHook>> {
//!         Some(self)
//!     }
//! }
//!
//! let hub = PluginHub::new().add(Arc::new(Logger));
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{SharedError, WebApiError, share};
use crate::http::{WireRequest, WireResponse};
use crate::response::WebApiResponse;

/// Transforms or rejects a wire request before it is sent.
pub trait RequestProcessor: Send + Sync {
    /// Process the request, returning the request to send.
    fn process_request(&self, request: WireRequest) -> Result<WireRequest, SharedError>;
}

/// Transforms or rejects a response before it reaches the result handler.
pub trait ResponseProcessor: Send + Sync {
    /// Process the response, returning the response to deliver.
    fn process_response(&self, response: WebApiResponse) -> Result<WebApiResponse, SharedError>;
}

/// Observes the transport exchange. Hooks cannot alter data.
pub trait HttpHook: Send + Sync {
    /// Called before a request is handed to the transport.
    fn will_send(&self, _request: &WireRequest) {}

    /// Called with the raw transport outcome, before any validation.
    fn did_receive(
        &self,
        _data: Option<&Bytes>,
        _response: Option<&WireResponse>,
        _error: Option<&SharedError>,
    ) {
    }
}

/// Capability probe used by [`PluginHub::add`].
///
/// Each method defaults to `None`; a plugin overrides the ones matching the
/// interception traits it implements.
pub trait Plugin: Send + Sync + 'static {
    /// This plugin as a request processor, if it is one.
    fn as_request_processor(self: Arc<Self>) -> Option<Arc<dyn RequestProcessor>> {
        None
    }

    /// This plugin as a response processor, if it is one.
    fn as_response_processor(self: Arc<Self>) -> Option<Arc<dyn ResponseProcessor>> {
        None
    }

    /// This plugin as a hook, if it is one.
    fn as_hook(self: Arc<Self>) -> Option<Arc<dyn HttpHook>> {
        None
    }
}

impl<F> RequestProcessor for F
where
    F: Fn(WireRequest) -> Result<WireRequest, SharedError> + Send + Sync,
{
    fn process_request(&self, request: WireRequest) -> Result<WireRequest, SharedError> {
        self(request)
    }
}

impl<F> ResponseProcessor for F
where
    F: Fn(WebApiResponse) -> Result<WebApiResponse, SharedError> + Send + Sync,
{
    fn process_response(&self, response: WebApiResponse) -> Result<WebApiResponse, SharedError> {
        self(response)
    }
}

/// Ordered interception lists.
///
/// Cloning a hub is cheap; plugins are shared. Hubs are meant to be fully
/// configured before the first dispatch that uses them.
#[derive(Clone, Default)]
pub struct PluginHub {
    request_processors: Vec<Arc<dyn RequestProcessor>>,
    response_processors: Vec<Arc<dyn ResponseProcessor>>,
    hooks: Vec<Arc<dyn HttpHook>>,
}

impl PluginHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin into every list whose capability it offers.
    pub fn add<P: Plugin>(mut self, plugin: Arc<P>) -> Self {
        if let Some(processor) = plugin.clone().as_request_processor() {
            self.request_processors.push(processor);
        }
        if let Some(processor) = plugin.clone().as_response_processor() {
            self.response_processors.push(processor);
        }
        if let Some(hook) = plugin.as_hook() {
            self.hooks.push(hook);
        }
        self
    }

    /// Register a request processor.
    pub fn add_request_processor(mut self, processor: Arc<dyn RequestProcessor>) -> Self {
        self.request_processors.push(processor);
        self
    }

    /// Register a response processor.
    pub fn add_response_processor(mut self, processor: Arc<dyn ResponseProcessor>) -> Self {
        self.response_processors.push(processor);
        self
    }

    /// Register a hook.
    pub fn add_hook(mut self, hook: Arc<dyn HttpHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Registered request processors, in invocation order.
    pub fn request_processors(&self) -> &[Arc<dyn RequestProcessor>] {
        &self.request_processors
    }

    /// Registered response processors, in invocation order.
    pub fn response_processors(&self) -> &[Arc<dyn ResponseProcessor>] {
        &self.response_processors
    }

    /// Registered hooks, in invocation order.
    pub fn hooks(&self) -> &[Arc<dyn HttpHook>] {
        &self.hooks
    }

    /// Check if no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.request_processors.is_empty()
            && self.response_processors.is_empty()
            && self.hooks.is_empty()
    }
}

impl fmt::Debug for PluginHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHub")
            .field("request_processors", &self.request_processors.len())
            .field("response_processors", &self.response_processors.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Rejects responses whose status is outside `200..=399`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseStatusValidator;

/// The status a [`ResponseStatusValidator`] rejected.
#[derive(Debug, thiserror::Error)]
#[error("Unacceptable HTTP status {0}")]
pub struct UnacceptableStatus(pub http::StatusCode);

impl ResponseProcessor for ResponseStatusValidator {
    fn process_response(&self, response: WebApiResponse) -> Result<WebApiResponse, SharedError> {
        if (200..=399).contains(&response.status.as_u16()) {
            Ok(response)
        } else {
            Err(share(UnacceptableStatus(response.status)))
        }
    }
}

impl Plugin for ResponseStatusValidator {
    fn as_response_processor(self: Arc<Self>) -> Option<Arc<dyn ResponseProcessor>> {
        Some(self)
    }
}

/// Run request processors of both tiers, provider level first.
pub(crate) fn process_request(
    provider: &PluginHub,
    request: Option<&PluginHub>,
    mut wire: WireRequest,
) -> Result<WireRequest, SharedError> {
    for processor in tiers(provider, request).flat_map(|hub| hub.request_processors.iter()) {
        wire = processor.process_request(wire)?;
    }
    Ok(wire)
}

/// Run response processors of both tiers, provider level first.
pub(crate) fn process_response(
    provider: &PluginHub,
    request: Option<&PluginHub>,
    mut response: WebApiResponse,
) -> Result<WebApiResponse, WebApiError> {
    for processor in tiers(provider, request).flat_map(|hub| hub.response_processors.iter()) {
        response = processor
            .process_response(response)
            .map_err(WebApiError::from_response_error)?;
    }
    Ok(response)
}

/// Every hook of both tiers, provider level first.
pub(crate) fn hooks<'a>(
    provider: &'a PluginHub,
    request: Option<&'a PluginHub>,
) -> impl Iterator<Item = &'a Arc<dyn HttpHook>> {
    tiers(provider, request).flat_map(|hub| hub.hooks.iter())
}

fn tiers<'a>(
    provider: &'a PluginHub,
    request: Option<&'a PluginHub>,
) -> impl Iterator<Item = &'a PluginHub> {
    std::iter::once(provider).chain(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RequestProcessor for Recorder {
        fn process_request(&self, request: WireRequest) -> Result<WireRequest, SharedError> {
            self.log.lock().push(format!("{}:request", self.name));
            Ok(request)
        }
    }

    impl HttpHook for Recorder {
        fn will_send(&self, _request: &WireRequest) {
            self.log.lock().push(format!("{}:will_send", self.name));
        }
    }

    impl Plugin for Recorder {
        fn as_request_processor(self: Arc<Self>) -> Option<Arc<dyn RequestProcessor>> {
            Some(self)
        }

        fn as_hook(self: Arc<Self>) -> Option<Arc<dyn HttpHook>> {
            Some(self)
        }
    }

    fn wire() -> WireRequest {
        WireRequest::new(
            crate::HttpMethod::Get,
            url::Url::parse("http://test.api/users").expect("url"),
        )
    }

    #[test]
    fn test_add_registers_every_capability() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = PluginHub::new().add(Arc::new(Recorder { name: "a", log }));

        assert_eq!(hub.request_processors().len(), 1);
        assert_eq!(hub.hooks().len(), 1);
        assert!(hub.response_processors().is_empty());
    }

    #[test]
    fn test_provider_tier_runs_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let provider = PluginHub::new().add(Arc::new(Recorder {
            name: "provider",
            log: log.clone(),
        }));
        let request = PluginHub::new().add(Arc::new(Recorder {
            name: "request",
            log: log.clone(),
        }));

        process_request(&provider, Some(&request), wire()).expect("processed");
        for hook in hooks(&provider, Some(&request)) {
            hook.will_send(&wire());
        }

        assert_eq!(
            *log.lock(),
            vec![
                "provider:request",
                "request:request",
                "provider:will_send",
                "request:will_send",
            ]
        );
    }

    #[test]
    fn test_closure_processors() {
        let hub = PluginHub::new()
            .add_response_processor(Arc::new(
                |response: WebApiResponse| -> Result<WebApiResponse, SharedError> {
                    Ok(response.with_data(&b"first"[..]))
                },
            ))
            .add_response_processor(Arc::new(
                |mut response: WebApiResponse| -> Result<WebApiResponse, SharedError> {
                    response.status = StatusCode::CREATED;
                    Ok(response)
                },
            ));

        let processed = process_response(&hub, None, WebApiResponse::default()).expect("ok");
        assert_eq!(processed.status, StatusCode::CREATED);
        assert_eq!(&processed.data[..], b"first");
    }

    #[test]
    fn test_processor_failure_discards_prior_transformations() {
        let hub = PluginHub::new()
            .add_response_processor(Arc::new(
                |response: WebApiResponse| -> Result<WebApiResponse, SharedError> {
                    Ok(response.with_data(&b"changed"[..]))
                },
            ))
            .add(Arc::new(ResponseStatusValidator));

        let response = WebApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR);
        let err = process_response(&hub, None, response).unwrap_err();
        assert!(matches!(err, WebApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_status_validator_range() {
        let validator = ResponseStatusValidator;
        for code in [200, 201, 304] {
            let status = StatusCode::from_u16(code).expect("status");
            assert!(validator.process_response(WebApiResponse::new(status)).is_ok());
        }
        for code in [401, 500] {
            let status = StatusCode::from_u16(code).expect("status");
            assert!(validator.process_response(WebApiResponse::new(status)).is_err());
        }
    }
}
