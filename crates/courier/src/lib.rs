//! Courier: a declarative HTTP endpoint client.
//!
//! A [`Provider`] holds the shared defaults of a remote API: base URL,
//! credentials, plugins and transport. Each [`WebApiRequest`] describes one
//! endpoint call and is sent by the dispatch engine, which delivers exactly
//! one result to the handler, or none if the send was canceled.
//!
//! ```ignore
//! use std::sync::Arc;
//! use courier::{BearerTokenAuthentication, Provider};
//!
//! let provider = Provider::builder("https://api.example.com/v1")
//!     .require_authentication(true)
//!     .authentication(Arc::new(BearerTokenAuthentication::new("token")?))
//!     .build()?;
//!
//! let handle = provider
//!     .get("/users/{id}".replace("{id}", "7"))
//!     .send(|result| match result {
//!         Ok(response) => println!("{} bytes", response.data.len()),
//!         Err(err) => eprintln!("{}", err),
//!     });
//!
//! // Changed our mind:
//! handle.cancel();
//! ```
//!
//! # Plugins
//!
//! Request processors, response processors and hooks are registered in a
//! [`PluginHub`], either on the provider or on a single request. Provider
//! plugins always run first.
//!
//! # Authentication
//!
//! An [`Authentication`] stamps requests and judges responses. When a
//! response is rejected and the credentials implement
//! [`RefreshableAuthentication`], the engine refreshes them and re-sends,
//! up to [`ProviderBuilder::max_authentication_refreshes`] times.
//!
//! # Testing
//!
//! [`mock::MockTransport`] stands in for the network:
//!
//! ```ignore
//! let (builder, mock) = Provider::builder("https://api.example.com/v1").stub_transport();
//! let provider = builder.build()?;
//!
//! mock.stub_template("/users/{id}", Some(HttpMethod::Get))
//!     .with_templated_json(|values| Some(json!({ "id": values["id"] })));
//! ```

mod auth;
mod error;
pub mod http;
pub mod mock;
mod plugin;
mod provider;
mod request;
mod response;
mod sender;
mod transport;

pub use auth::{
    Authentication, BasicAuthentication, BearerTokenAuthentication, CustomTokenAuthentication,
    HeaderAuthentication, RefreshHandler, RefreshableAuthentication,
};
pub use error::{
    AuthenticationError, RequestBuildError, ResponseDecodeError, Result, SharedError, WebApiError,
    WebApiResult, share,
};
pub use crate::http::{
    HttpMethod, ReqwestTransport, ReqwestTransportBuilder, ReqwestTransportConfig, WireRequest,
    WireResponse,
};
pub use plugin::{
    HttpHook, Plugin, PluginHub, RequestProcessor, ResponseProcessor, ResponseStatusValidator,
    UnacceptableStatus,
};
pub use provider::{DEFAULT_MAX_AUTHENTICATION_REFRESHES, Provider, ProviderBuilder};
pub use request::{ParameterEncoding, WebApiRequest};
pub use response::{WebApiResponse, decode_json};
pub use sender::{ResultHandler, SendHandle};
pub use transport::{Transport, TransportHandler, TransportOutcome};

pub use courier_core::{Cancelable, CancellationToken, ImmediateQueue, Queue, TokioQueue, WorkerQueue};
