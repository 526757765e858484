//! Router core module - hot path for request routing.
//!
//! # JSF Compliance (Rule 206)
//!
//! This module is part of the request hot path. Path parameters are kept in
//! stack-allocated `SmallVec`s and parameter names are shared `Arc<str>`s
//! taken from the route tree.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use http::Method;
use serde_json::json;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::radix::{param_name_of, split_path, RadixRouter};
use super::spec::RouteSpec;
use crate::error::DispatchError;
use crate::keys;
use crate::registry::{Binding, Scope};

/// Maximum number of path/query parameters before heap allocation.
/// Most REST APIs have ≤4 path params (e.g., /users/{id}/posts/{postId}).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage for the hot path.
///
/// Param names use `Arc<str>` because they come from the static route tree;
/// values are per-request data from the URL.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Result of successfully matching a request to a route
#[derive(Debug, Clone)]
pub struct MatchedRoute {
    /// The matched route (Arc to avoid expensive clones)
    pub spec: Arc<RouteSpec>,
    /// Decoded path parameters in pattern order
    pub path_params: ParamVec,
}

impl MatchedRoute {
    /// Get a path parameter by name
    ///
    /// Uses "last write wins" semantics if a pattern repeats a name.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Convert path_params to a HashMap
    /// Note: This allocates - use get_path_param() in hot paths instead
    #[must_use]
    pub fn path_params_map(&self) -> HashMap<String, String> {
        self.path_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Publish the match into a request scope: `operation.route`,
    /// `operation.pathParams`, and one `operation.params.<name>` per parameter.
    pub fn update_bindings(&self, scope: &Scope) {
        scope.add(Binding::new(keys::OPERATION_ROUTE.as_str()).to_arc(Arc::clone(&self.spec)));
        scope.add(Binding::constant(
            &keys::OPERATION_PATH_PARAMS,
            self.path_params_map(),
        ));
        for (name, value) in &self.path_params {
            scope.add(Binding::new(keys::operation_param(name)).to(value.clone()));
        }
    }
}

/// Normalize a route pattern: leading slash, no trailing slash (except root),
/// no empty segments.
///
/// # Errors
///
/// Returns a validation error for malformed parameter segments or a
/// parameter name used twice.
pub fn normalize_pattern(pattern: &str) -> Result<String, DispatchError> {
    let segments = split_path(pattern);
    let mut seen = HashSet::new();
    for segment in &segments {
        let has_brace = segment.contains('{') || segment.contains('}');
        match param_name_of(segment) {
            Some(name) if is_valid_param_name(name) => {
                if !seen.insert(name) {
                    return Err(invalid_pattern(pattern, "duplicate parameter name"));
                }
            }
            Some(_) => return Err(invalid_pattern(pattern, "invalid parameter name")),
            None if has_brace => {
                return Err(invalid_pattern(pattern, "parameters must span a whole segment"))
            }
            None => {}
        }
    }
    if segments.is_empty() {
        return Ok("/".to_string());
    }
    let mut normalized = String::with_capacity(pattern.len());
    for segment in segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    Ok(normalized)
}

fn is_valid_param_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn invalid_pattern(pattern: &str, reason: &str) -> DispatchError {
    DispatchError::validation(format!("Invalid route pattern '{pattern}': {reason}"))
        .with_code("INVALID_ROUTE_PATTERN")
}

/// Registered routes and the segment tree used to match them
///
/// Registration happens at startup; matching is read-only and can be shared
/// between coroutines behind an `Arc`.
#[derive(Clone, Default)]
pub struct RouteTable {
    radix_router: RadixRouter,
    routes: Vec<Arc<RouteSpec>>,
    /// `(method, normalized pattern)` pairs already registered
    index: HashSet<(Method, String)>,
    /// Base path prefix for all routes (e.g., `/api/v1`)
    base_path: String,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table whose patterns are all registered under `base_path`
    #[must_use]
    pub fn with_base_path(base_path: &str) -> Self {
        let base_path = base_path.trim_end_matches('/');
        Self {
            base_path: base_path.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Register a route.
    ///
    /// # Errors
    ///
    /// - `Conflict` if a route with the same method and normalized pattern exists
    /// - `Validation` if the pattern is malformed
    ///
    /// The table is unchanged when registration fails.
    pub fn register(&mut self, spec: RouteSpec) -> Result<Arc<RouteSpec>, DispatchError> {
        let normalized = self.check_available(&spec.method, &spec.path_pattern)?;
        let index_key = (spec.method.clone(), normalized.clone());

        let spec = Arc::new(RouteSpec {
            path_pattern: normalized.clone(),
            ..spec
        });
        self.radix_router.insert(&normalized, Arc::clone(&spec));
        self.index.insert(index_key);
        self.routes.push(Arc::clone(&spec));

        debug!(
            method = %spec.method,
            path_pattern = %spec.path_pattern,
            operation = %spec.operation_name(),
            routes_count = self.routes.len(),
            "Route registered"
        );
        Ok(spec)
    }

    /// Whether a request for `method` and `path` would match a route; no
    /// events are logged
    #[must_use]
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.radix_router.route(method, path).is_some()
    }

    /// Whether `method` and `pattern` (before the base path is applied)
    /// are already taken
    #[must_use]
    pub fn is_registered(&self, method: &Method, pattern: &str) -> bool {
        normalize_pattern(&format!("{}{}", self.base_path, pattern))
            .is_ok_and(|normalized| self.index.contains(&(method.clone(), normalized)))
    }

    /// Validate `pattern` and make sure `method` is free for it; returns the
    /// normalized full pattern
    ///
    /// # Errors
    ///
    /// The same errors as [`RouteTable::register`]; nothing is modified.
    pub fn check_available(
        &self,
        method: &Method,
        pattern: &str,
    ) -> Result<String, DispatchError> {
        let normalized = normalize_pattern(&format!("{}{}", self.base_path, pattern))?;
        if self.index.contains(&(method.clone(), normalized.clone())) {
            warn!(
                method = %method,
                path_pattern = %normalized,
                "Duplicate route registration rejected"
            );
            return Err(DispatchError::conflict(format!(
                "Route {method} {normalized} is already registered"
            ))
            .with_code("ROUTE_CONFLICT"));
        }
        Ok(normalized)
    }

    /// Match a request against the table.
    ///
    /// # Errors
    ///
    /// - `NotFound` when no pattern matches the path
    /// - `MethodNotAllowed` when patterns match but none for this method;
    ///   `details.allowed` lists the accepted methods
    pub fn match_route(&self, method: &Method, path: &str) -> Result<MatchedRoute, DispatchError> {
        // RT1: Route match attempt
        debug!(
            method = %method,
            path = %path,
            algorithm = "radix_tree",
            "Route match attempt"
        );

        let match_start = Instant::now();
        let result = self.radix_router.route(method, path);
        let match_duration = match_start.elapsed();

        if let Some((spec, path_params)) = result {
            if match_duration > Duration::from_millis(1) {
                warn!(
                    method = %method,
                    path = %path,
                    route_pattern = %spec.path_pattern,
                    duration_us = match_duration.as_micros(),
                    "Slow route matching detected"
                );
            } else {
                info!(
                    method = %method,
                    path = %path,
                    operation = %spec.operation_name(),
                    route_pattern = %spec.path_pattern,
                    path_params = ?path_params,
                    duration_us = match_duration.as_micros(),
                    "Route matched"
                );
            }
            return Ok(MatchedRoute { spec, path_params });
        }

        let allowed = self.radix_router.allowed_methods(path);
        if !allowed.is_empty() {
            let allowed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
            warn!(
                method = %method,
                path = %path,
                allowed = ?allowed,
                "Method not allowed"
            );
            return Err(DispatchError::method_not_allowed(format!(
                "Method {method} is not allowed for {path}"
            ))
            .with_details(json!({ "allowed": allowed })));
        }

        // RT4: No route found (404)
        warn!(
            method = %method,
            path = %path,
            duration_us = match_duration.as_micros(),
            "No route matched"
        );
        Err(DispatchError::not_found(format!(
            "Endpoint \"{method} {path}\" not found."
        )))
    }

    /// Registered routes in registration order
    #[must_use]
    pub fn routes(&self) -> &[Arc<RouteSpec>] {
        &self.routes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Log every registered route
    pub fn dump_routes(&self) {
        info!(
            base_path = %self.base_path,
            routes_count = self.routes.len(),
            "Route table"
        );
        for spec in &self.routes {
            info!(
                method = %spec.method,
                path_pattern = %spec.path_pattern,
                operation = %spec.operation_name(),
                "Route"
            );
        }
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("base_path", &self.base_path)
            .field("routes", &self.routes.len())
            .finish()
    }
}
