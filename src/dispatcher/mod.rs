//! # Dispatcher Module
//!
//! The dispatcher is the per-request entry point of the core. For every
//! request it:
//!
//! 1. Creates a [`RequestContext`](crate::context::RequestContext) with a
//!    fresh request scope under the application scope
//! 2. Runs the frozen [`MiddlewareChain`](crate::middleware::MiddlewareChain)
//! 3. Maps any error that unwinds out of the chain to a structured body
//! 4. Writes a fallback 404 when nothing else produced a response
//! 5. Releases the request scope
//!
//! ## Error Handling
//!
//! - Errors keep their status and code; internal errors are logged with
//!   `tracing::error!` and sent as a generic `INTERNAL_SERVER_ERROR`
//! - Panics inside the chain are caught and treated as internal errors
//! - Aborted requests write nothing
//!
//! ```rust
//! use brrtcore::application::Application;
//! use brrtcore::config::AppConfig;
//! use brrtcore::http::HttpRequest;
//! use http::Method;
//!
//! let app = Application::new(AppConfig::default());
//! let dispatcher = app.start().unwrap();
//! let (response, report) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/missing"));
//! assert_eq!(report.status, Some(404));
//! assert_eq!(response.unwrap().body["error"]["code"], "NOT_FOUND");
//! ```

mod core;

pub use core::{DispatchReport, Dispatcher};
