//! Logging targets for Courier.
//!
//! Courier uses the `tracing` crate for instrumentation and never installs a
//! subscriber itself. To see logs, install one in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("courier=debug,courier_core=debug")
//!     .init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Queue and worker target.
    pub const QUEUE: &str = "courier_core::queue";
    /// Endpoint building target.
    pub const REQUEST: &str = "courier::request";
    /// Dispatch engine target.
    pub const SENDER: &str = "courier::sender";
    /// Real network transport target.
    pub const TRANSPORT: &str = "courier::transport";
    /// Mock transport target.
    pub const MOCK: &str = "courier::mock";
}
