//! Well-known binding keys used by the dispatch core.
//!
//! Every request scope is seeded with the `http.*` keys before the chain
//! runs; the `operation.*` keys are added once the route has been found.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::context::RequestId;
use crate::http::{HttpRequest, ResponseWriter};
use crate::middleware::Principal;
use crate::registry::BindingKey;
use crate::router::{RouteSpec, RouteTable};

/// The incoming request
pub static HTTP_REQUEST: Lazy<BindingKey<HttpRequest>> =
    Lazy::new(|| BindingKey::create("http.request"));

/// The single-write response sink
pub static HTTP_RESPONSE: Lazy<BindingKey<ResponseWriter>> =
    Lazy::new(|| BindingKey::create("http.response"));

pub static REQUEST_ID: Lazy<BindingKey<RequestId>> =
    Lazy::new(|| BindingKey::create("http.requestId"));

/// The matched route
pub static OPERATION_ROUTE: Lazy<BindingKey<RouteSpec>> =
    Lazy::new(|| BindingKey::create("operation.route"));

/// Decoded path parameters of the matched route
pub static OPERATION_PATH_PARAMS: Lazy<BindingKey<HashMap<String, String>>> =
    Lazy::new(|| BindingKey::create("operation.pathParams"));

/// Prefix for per-parameter bindings, `operation.params.<name>`
pub const OPERATION_PARAMS_PREFIX: &str = "operation.params.";

/// The application route table
pub static ROUTES: Lazy<BindingKey<RouteTable>> = Lazy::new(|| BindingKey::create("rest.routes"));

/// Principal established by the authentication entry
pub static CURRENT_USER: Lazy<BindingKey<Principal>> =
    Lazy::new(|| BindingKey::create("security.user"));

/// Key of the binding for path parameter `name`
#[must_use]
pub fn operation_param(name: &str) -> String {
    format!("{OPERATION_PARAMS_PREFIX}{name}")
}
