//! # HTTP Transport
//!
//! Adapts the dispatch core to `may_minihttp`. Each connection is served on
//! its own coroutine; [`AppService`] converts the wire request into an
//! [`HttpRequest`](crate::http::HttpRequest), hands it to the
//! [`Dispatcher`](crate::dispatcher::Dispatcher) and writes the one response
//! the dispatcher produced. Stopping the server aborts requests still in
//! the dispatcher.

mod http_server;
mod in_flight;
mod request;
mod response;
mod service;
mod shutdown;

pub use http_server::{HttpServer, ServerHandle};
pub use in_flight::{InFlight, InFlightGuard};
pub use request::{build_request, into_http_request, read_body, RequestError};
pub use response::write_response;
pub use service::{health_endpoint, metrics_endpoint, AppService};
#[cfg(unix)]
pub use shutdown::wait_for_shutdown_signal;
pub use shutdown::serve_until_shutdown;
