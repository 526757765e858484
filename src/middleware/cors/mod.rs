//! CORS (Cross-Origin Resource Sharing) entry for the `cors` group.
//!
//! - Preflight requests (`OPTIONS` with `Origin` and
//!   `Access-Control-Request-Method`) are answered here and never reach
//!   route matching.
//! - Other cross-origin requests are checked against the allowed origins;
//!   the inner chain runs and CORS headers are added to its response.
//! - Same-origin requests and requests without `Origin` pass through untouched.
//!
//! A disallowed origin, method, or header fails with `Forbidden`.

mod builder;
mod error;

pub use builder::CorsMiddlewareBuilder;
pub use error::CorsConfigError;

use http::Method;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::core::{ChainResult, Middleware, Next};
use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::http::{HandlerResponse, HeaderVec, HttpRequest};

fn default_methods() -> Vec<Method> {
    vec![
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ]
}

/// Origin validation strategy
#[derive(Clone)]
pub enum OriginValidation {
    /// Exact string matching
    Exact(Vec<String>),
    /// Allow all origins
    Wildcard,
    /// Exact list plus regex patterns
    Patterns { exact: Vec<String>, patterns: Vec<Regex> },
    /// Custom validation function
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl std::fmt::Debug for OriginValidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OriginValidation::Exact(origins) => f.debug_tuple("Exact").field(origins).finish(),
            OriginValidation::Wildcard => write!(f, "Wildcard"),
            OriginValidation::Patterns { exact, patterns } => f
                .debug_struct("Patterns")
                .field("exact", exact)
                .field(
                    "patterns",
                    &patterns.iter().map(Regex::as_str).collect::<Vec<_>>(),
                )
                .finish(),
            OriginValidation::Custom(_) => write!(f, "Custom(<function>)"),
        }
    }
}

impl OriginValidation {
    fn is_allowed(&self, origin: &str) -> bool {
        match self {
            OriginValidation::Exact(origins) => origins.iter().any(|o| o == origin),
            OriginValidation::Wildcard => true,
            OriginValidation::Patterns { exact, patterns } => {
                exact.iter().any(|o| o == origin) || patterns.iter().any(|re| re.is_match(origin))
            }
            OriginValidation::Custom(validator) => validator(origin),
        }
    }

    fn is_wildcard(&self) -> bool {
        matches!(self, OriginValidation::Wildcard)
    }
}

/// CORS policy; build with [`CorsMiddlewareBuilder`]
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    origin_validation: OriginValidation,
    allowed_headers: Vec<String>,
    allowed_methods: Vec<Method>,
    allow_credentials: bool,
    expose_headers: Vec<String>,
    max_age: Option<u32>,
}

impl CorsMiddleware {
    /// Allow every origin; for development only
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            origin_validation: OriginValidation::Wildcard,
            ..Self::default()
        }
    }

    /// Origins accepted by `validator`
    #[must_use]
    pub fn with_custom_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.origin_validation = OriginValidation::Custom(Arc::new(validator));
        self
    }

    /// Value for `Access-Control-Allow-Origin`, or `None` if not allowed
    fn validate_origin(&self, origin: &str) -> Option<String> {
        if !self.origin_validation.is_allowed(origin) {
            return None;
        }
        if self.origin_validation.is_wildcard() {
            Some("*".to_string())
        } else {
            Some(origin.to_string())
        }
    }

    /// Same-origin requests carry an `Origin` whose host matches `Host`
    fn is_same_origin(req: &HttpRequest, origin: &str) -> bool {
        let Some(host) = req.get_header("host") else {
            return false;
        };
        let Some((_, origin_host_port)) = origin.split_once("://") else {
            return false;
        };
        let origin_host = origin_host_port.split(':').next().unwrap_or(origin_host_port);
        host.eq_ignore_ascii_case(origin_host) || host.eq_ignore_ascii_case(origin_host_port)
    }

    fn is_preflight(req: &HttpRequest) -> bool {
        req.method == Method::OPTIONS
            && req.get_header("origin").is_some()
            && req.get_header("access-control-request-method").is_some()
    }

    fn methods_header(&self) -> String {
        self.allowed_methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn preflight(&self, req: &HttpRequest, origin: String) -> Result<HandlerResponse, DispatchError> {
        let requested = req
            .get_header("access-control-request-method")
            .and_then(|m| m.parse::<Method>().ok());
        match requested {
            Some(method) if self.allowed_methods.contains(&method) => {}
            _ => {
                warn!(origin = %origin, "CORS preflight: method not allowed");
                return Err(denied("CORS preflight method not allowed"));
            }
        }

        if let Some(headers) = req.get_header("access-control-request-headers") {
            let allow_all = self.allowed_headers.iter().any(|h| h == "*");
            let rejected = headers
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .find(|h| !allow_all && !self.allowed_headers.iter().any(|a| a.eq_ignore_ascii_case(h)));
            if let Some(header) = rejected {
                warn!(origin = %origin, header = %header, "CORS preflight: header not allowed");
                return Err(denied("CORS preflight header not allowed"));
            }
        }

        let mut headers = HeaderVec::new();
        headers.push((Arc::from("access-control-allow-origin"), origin));
        headers.push((Arc::from("access-control-allow-methods"), self.methods_header()));
        headers.push((
            Arc::from("access-control-allow-headers"),
            self.allowed_headers.join(", "),
        ));
        if self.allow_credentials {
            headers.push((Arc::from("access-control-allow-credentials"), "true".to_string()));
        }
        if let Some(age) = self.max_age {
            headers.push((Arc::from("access-control-max-age"), age.to_string()));
        }
        headers.push((Arc::from("vary"), "Origin".to_string()));
        Ok(HandlerResponse::new(204, headers, Value::Null))
    }

    fn decorate(&self, res: &mut HandlerResponse, origin: String) {
        res.set_header("access-control-allow-origin", origin);
        if self.allow_credentials {
            res.set_header("access-control-allow-credentials", "true".to_string());
        }
        if !self.expose_headers.is_empty() {
            res.set_header("access-control-expose-headers", self.expose_headers.join(", "));
        }
        res.set_header("vary", "Origin".to_string());
    }
}

fn denied(message: &str) -> DispatchError {
    DispatchError::forbidden(message).with_code("CORS_REJECTED")
}

/// Secure default: no origins allowed
impl Default for CorsMiddleware {
    fn default() -> Self {
        Self {
            origin_validation: OriginValidation::Exact(vec![]),
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            allowed_methods: default_methods(),
            allow_credentials: false,
            expose_headers: vec![],
            max_age: None,
        }
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult {
        let origin = match ctx.request().get_header("origin") {
            Some(origin) if !Self::is_same_origin(ctx.request(), origin) => origin.to_string(),
            Some(_) => {
                debug!(request_id = %ctx.request_id(), "CORS: same-origin request");
                return next.run(ctx);
            }
            None => return next.run(ctx),
        };

        let Some(allowed_origin) = self.validate_origin(&origin) else {
            warn!(request_id = %ctx.request_id(), origin = %origin, "CORS: origin not allowed");
            return Err(denied("CORS origin not allowed"));
        };

        if Self::is_preflight(ctx.request()) {
            return self.preflight(ctx.request(), allowed_origin).map(Some);
        }

        let mut result = next.run(ctx)?;
        if let Some(response) = result.as_mut() {
            self.decorate(response, allowed_origin);
        }
        Ok(result)
    }
}
