//! Transport-agnostic request and response types.
//!
//! The dispatcher consumes an [`HttpRequest`] and writes at most one
//! [`HandlerResponse`] into a [`ResponseWriter`]; the transport adapter in
//! [`crate::server`] converts to and from the wire.

mod request;
mod response;

pub use request::{parse_cookies, parse_query_params, HeaderVec, HttpRequest, MAX_INLINE_HEADERS};
pub use response::{HandlerResponse, ResponseWriter};
