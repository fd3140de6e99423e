//! A deterministic in-process transport for tests.
//!
//! [`MockTransport`] routes each request to the first matching
//! [`MockResponder`], which answers through a [`MockConnection`] on the
//! schedule its [`ResponderMode`] describes. Connections and responders keep
//! an ordered [`ConnectionLog`] for assertions.

mod connection;
mod matcher;
mod responder;
mod template;
mod transport;

pub use connection::{ConnectionLog, MockConnection};
pub use matcher::{PathMatchMode, RequestMatcher};
pub use responder::{MockResponder, ResponderMode, ResponseFactory, TemplatedFactory};
pub use template::{PathTemplate, TemplateValues};
pub use transport::MockTransport;
