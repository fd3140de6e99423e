//! Wire-level HTTP types.
//!
//! These are the fully resolved values exchanged with a transport: the
//! request about to be sent and the response head that came back. They are
//! plain value snapshots; processors replace them rather than mutate them.

pub mod client;
mod request;
mod response;

pub use client::{ReqwestTransport, ReqwestTransportBuilder, ReqwestTransportConfig};
pub use request::{HttpMethod, WireRequest};
pub use response::WireResponse;
