//! # Middleware Chain
//!
//! Middleware entries are registered into a [`Scope`](crate::registry::Scope)
//! as tagged bindings and ordered by an explicit group list (see
//! [`DEFAULT_GROUP_ORDER`]). Within a group, entries run in registration
//! order. The resulting [`MiddlewareChain`] is built once and replayed for
//! every request.
//!
//! Each entry receives the [`RequestContext`](crate::context::RequestContext)
//! and a [`Next`] continuation. Calling `next.run(ctx)` runs the rest of the
//! chain and hands back its result, so outer entries observe errors raised
//! further in:
//!
//! ```text
//! send-response ─► cors ─► middleware ─► find-route ─► authentication ─► parse-params ─► invoke-operation
//!       ▲                                                                                        │
//!       └──────────────────────── Ok(Some(response)) / Err(error) ◄─────────────────────────────┘
//! ```
//!
//! ## Built-in entries
//!
//! | Entry | Group |
//! |-------|-------|
//! | [`SendResponseMiddleware`] | `send-response` |
//! | [`CorsMiddleware`] | `cors` |
//! | [`TracingMiddleware`], [`MetricsMiddleware`] | `middleware` |
//! | [`FindRouteMiddleware`] | `find-route` |
//! | [`AuthMiddleware`] | `authentication` |
//! | [`ParseParamsMiddleware`] | `parse-params` |
//! | [`InvokeOperationMiddleware`] | `invoke-operation` |

mod auth;
mod core;
mod cors;
mod find_route;
mod invoke;
mod metrics;
mod parse_params;
mod send_response;
mod tracing;

pub use auth::{
    ApiKeyAuthenticator, AuthMiddleware, Authenticator, BearerTokenAuthenticator, Principal,
};
pub use core::{
    groups, register_middleware, ChainBuilder, ChainConfigError, ChainResult, Middleware,
    MiddlewareChain, MiddlewareEntry, Next, CHAIN_TAG, DEFAULT_GROUP_ORDER, GROUP_TAG,
    MIDDLEWARE_TAG, REST_CHAIN,
};
pub use cors::{CorsConfigError, CorsMiddleware, CorsMiddlewareBuilder, OriginValidation};
pub use find_route::FindRouteMiddleware;
pub use invoke::InvokeOperationMiddleware;
pub use metrics::MetricsMiddleware;
pub use parse_params::ParseParamsMiddleware;
pub use send_response::SendResponseMiddleware;
pub use tracing::TracingMiddleware;
