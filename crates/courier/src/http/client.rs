//! Real network transport built on reqwest.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use courier_core::logging::targets;
use courier_core::{Cancelable, Queue};
use parking_lot::Mutex;
use reqwest::redirect::Policy;
use tokio::sync::oneshot;

use crate::error::{SharedError, share};
use crate::http::{WireRequest, WireResponse};
use crate::transport::{Transport, TransportHandler, TransportOutcome, deliver};

/// Configuration for the reqwest transport.
#[derive(Clone, Debug)]
pub struct ReqwestTransportConfig {
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Whether to follow redirects.
    pub follow_redirects: bool,
    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
    /// Default user agent.
    pub user_agent: Option<String>,
}

impl Default for ReqwestTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(10)),
            follow_redirects: true,
            max_redirects: 10,
            user_agent: Some(format!("Courier/{} (Rust)", env!("CARGO_PKG_VERSION"))),
        }
    }
}

/// Builder for a [`ReqwestTransport`].
#[derive(Debug, Default)]
pub struct ReqwestTransportBuilder {
    config: ReqwestTransportConfig,
    runtime: Option<tokio::runtime::Handle>,
}

impl ReqwestTransportBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Disable request timeout.
    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = None;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Disable redirect following.
    pub fn no_redirects(mut self) -> Self {
        self.config.follow_redirects = false;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Run exchanges on this runtime instead of the shared one.
    pub fn runtime(mut self, handle: tokio::runtime::Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<ReqwestTransport, SharedError> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        if self.config.follow_redirects {
            builder = builder.redirect(Policy::limited(self.config.max_redirects));
        } else {
            builder = builder.redirect(Policy::none());
        }

        if let Some(ref ua) = self.config.user_agent {
            builder = builder.user_agent(ua);
        }

        let client = builder.build().map_err(share)?;
        let runtime = self.runtime.unwrap_or_else(|| runtime::get().handle().clone());

        Ok(ReqwestTransport {
            client,
            runtime,
            config: self.config,
        })
    }
}

/// A transport performing real HTTP exchanges with reqwest.
///
/// Exchanges run on a tokio runtime; without an explicit queue the
/// completion handler runs on that runtime's worker thread.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    runtime: tokio::runtime::Handle,
    config: ReqwestTransportConfig,
}

impl ReqwestTransport {
    /// Create a builder for configuring a transport.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::new()
    }

    /// The process-wide default transport, created on first use.
    ///
    /// Used when neither the call, the request, nor the provider names a
    /// transport.
    pub fn shared() -> Arc<ReqwestTransport> {
        static SHARED: OnceLock<Arc<ReqwestTransport>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                Arc::new(
                    ReqwestTransportBuilder::new()
                        .build()
                        .expect("Failed to create HTTP transport with default configuration"),
                )
            })
            .clone()
    }

    /// Get the transport's configuration.
    pub fn config(&self) -> &ReqwestTransportConfig {
        &self.config
    }

    async fn execute(client: reqwest::Client, request: WireRequest) -> TransportOutcome {
        let mut builder = client
            .request(request.method.to_reqwest(), request.url.clone())
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return TransportOutcome::error(share(err)),
        };

        let head = WireResponse {
            url: response.url().clone(),
            status: response.status(),
            headers: response.headers().clone(),
        };

        match response.bytes().await {
            Ok(data) => TransportOutcome::response(head, Some(data)),
            Err(err) => TransportOutcome {
                data: None,
                response: Some(head),
                error: Some(share(err)),
            },
        }
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("config", &self.config)
            .finish()
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: WireRequest,
        queue: Option<Arc<dyn Queue>>,
        handler: TransportHandler,
    ) -> Box<dyn Cancelable> {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let client = self.client.clone();
        let method = request.method;
        let url = request.url.clone();

        self.runtime.spawn(async move {
            tokio::select! {
                outcome = Self::execute(client, request) => {
                    tracing::debug!(target: targets::TRANSPORT, %method, %url, "Exchange finished");
                    deliver(queue.as_ref(), handler, outcome);
                }
                Ok(()) = cancel_rx => {
                    tracing::debug!(target: targets::TRANSPORT, %method, %url, "Exchange canceled");
                }
            }
        });

        Box::new(ReqwestTask {
            cancel_tx: Mutex::new(Some(cancel_tx)),
        })
    }
}

/// Cancel handle for an in-flight reqwest exchange.
struct ReqwestTask {
    cancel_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl Cancelable for ReqwestTask {
    fn cancel(&self) {
        if let Some(tx) = self.cancel_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

/// Runtime management for network exchanges.
pub mod runtime {
    use std::sync::OnceLock;
    use tokio::runtime::Runtime;

    static RUNTIME: OnceLock<Runtime> = OnceLock::new();

    /// Initialize the shared runtime.
    ///
    /// Called implicitly on first use. Call it early to control when the
    /// runtime threads start.
    pub fn init() -> &'static Runtime {
        RUNTIME.get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .thread_name("courier-net")
                .enable_all()
                .build()
                .expect("Failed to create tokio runtime")
        })
    }

    /// Get a reference to the shared runtime, creating it if needed.
    pub fn get() -> &'static Runtime {
        init()
    }
}
