//! # brrtcore
//!
//! **brrtcore** is the request dispatch core of a web framework: hierarchical
//! dependency injection, REST route matching and a grouped middleware chain,
//! running on `may` coroutines behind a `may_minihttp` transport.
//!
//! ## Overview
//!
//! Given an incoming request, the core resolves which registered operation
//! handles it, builds a per-request dependency-injection scope, runs a
//! configurable middleware chain and produces exactly one response or a
//! structured error. A GraphQL endpoint is served by the same chain as a
//! single middleware entry, so both protocol frontends share one request
//! lifecycle, one binding-resolution discipline and one error contract.
//!
//! ## Architecture
//!
//! Components, leaf first:
//!
//! - **[`registry`]** - scoped binding registry: keys, providers, tags, views
//! - **[`router`]** - route table with radix matching and conflict detection
//! - **[`context`]** - per-request scope, request handle, response writer
//! - **[`middleware`]** - grouped middleware chain and built-in entries
//! - **[`dispatcher`]** - orchestrates one request end to end
//! - **[`graphql`]** - GraphQL bridge as an `invoke-operation` entry
//! - **[`application`]** - assembles the above from [`config`]
//! - **[`server`]** - `may_minihttp` transport adapter
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as server::AppService
//!     participant Disp as dispatcher::Dispatcher
//!     participant Ctx as context::RequestContext
//!     participant Chain as middleware::MiddlewareChain
//!     participant Op as Operation
//!
//!     Client->>Server: HTTP request
//!     Server->>Disp: handle(HttpRequest, writer, abort)
//!     Disp->>Ctx: child scope of the application scope
//!     Disp->>Chain: run(ctx)
//!     Chain->>Chain: send-response, cors, middleware
//!     Chain->>Chain: find-route (binds operation.*)
//!     Chain->>Chain: authentication, parse-params
//!     Chain->>Op: invoke-operation
//!     Op-->>Chain: OperationResult or DispatchError
//!     Chain-->>Disp: unwinds through outer entries
//!     Disp->>Disp: map error, fallback 404
//!     Disp-->>Server: exactly one response
//!     Server-->>Client: HTTP response
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brrtcore::application::Application;
//! use brrtcore::config::AppConfig;
//! use brrtcore::context::RequestContext;
//! use brrtcore::error::DispatchError;
//! use brrtcore::http::HttpRequest;
//! use brrtcore::operation::{OperationArgs, OperationResult};
//! use brrtcore::router::RouteSpec;
//! use http::Method;
//! use serde_json::json;
//!
//! fn get_pet(_: &mut RequestContext, args: &OperationArgs) -> Result<OperationResult, DispatchError> {
//!     Ok(json!({ "id": args.get("id") }).into())
//! }
//!
//! let mut app = Application::new(AppConfig::default());
//! app.route(RouteSpec::handler(Method::GET, "/pets/{id}", "get_pet", get_pet)).unwrap();
//! let dispatcher = app.start().unwrap();
//!
//! let (response, _) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/pets/7"));
//! assert_eq!(response.unwrap().body, json!({ "id": "7" }));
//! ```
//!
//! ## Concurrency
//!
//! Registration happens on one thread before [`application::Application::start`].
//! Afterwards the route table is frozen behind an `Arc` and every request runs
//! on its own coroutine with its own scope; the application scope is only
//! read. Request scopes never outlive their request.
//!
//! ## Errors
//!
//! Every failure is a [`error::DispatchError`] with a stable `code`. Errors
//! that reach the dispatcher are written as
//! `{"error": {"statusCode", "code", "message"}}`; internal errors are masked
//! and logged with the original cause.

pub mod application;
pub mod cli;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod echo;
pub mod error;
pub mod graphql;
pub mod http;
pub mod keys;
pub mod logging;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod router;
pub mod runtime_config;
pub mod server;

pub use application::{Application, Component};
pub use config::AppConfig;
pub use context::{AbortHandle, RequestContext, RequestId};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{DispatchError, ErrorKind};
pub use registry::{Binding, BindingKey, Scope, ScopeKind};
pub use router::{RouteSpec, RouteTable};
