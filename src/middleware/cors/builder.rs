use http::Method;
use regex::Regex;

use super::{CorsConfigError, CorsMiddleware, OriginValidation};
use crate::config::CorsConfig;

/// Builder for [`CorsMiddleware`] with a fluent API
///
/// ```rust
/// use brrtcore::middleware::CorsMiddlewareBuilder;
/// use http::Method;
///
/// let cors = CorsMiddlewareBuilder::new()
///     .allowed_origins(&["https://example.com"])
///     .allowed_methods(&[Method::GET, Method::POST])
///     .allow_credentials(true)
///     .max_age(3600)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct CorsMiddlewareBuilder {
    allowed_origins: Vec<String>,
    origin_patterns: Vec<String>,
    allowed_headers: Vec<String>,
    allowed_methods: Vec<Method>,
    allow_credentials: bool,
    expose_headers: Vec<String>,
    max_age: Option<u32>,
    /// first `allowed_methods` entry from config that is not an HTTP method
    bad_method: Option<String>,
}

impl CorsMiddlewareBuilder {
    /// Secure defaults: no origins, `Content-Type` and `Authorization`
    /// headers, the common methods, no credentials.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allowed_origins: vec![],
            origin_patterns: vec![],
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            allowed_methods: super::default_methods(),
            allow_credentials: false,
            expose_headers: vec![],
            max_age: None,
            bad_method: None,
        }
    }

    /// Builder pre-filled from the `cors` section of the application config
    #[must_use]
    pub fn from_config(config: &CorsConfig) -> Self {
        let mut builder = Self::new();
        builder.allowed_origins = config.allowed_origins.clone();
        builder.origin_patterns = config.origin_patterns.clone();
        if !config.allowed_headers.is_empty() {
            builder.allowed_headers = config.allowed_headers.clone();
        }
        let mut methods = Vec::with_capacity(config.allowed_methods.len());
        for raw in &config.allowed_methods {
            match raw.to_ascii_uppercase().parse::<Method>() {
                Ok(method) => methods.push(method),
                Err(_) => {
                    builder.bad_method.get_or_insert_with(|| raw.clone());
                }
            }
        }
        if !methods.is_empty() {
            builder.allowed_methods = methods;
        }
        builder.allow_credentials = config.allow_credentials;
        builder.expose_headers = config.expose_headers.clone();
        builder.max_age = config.max_age;
        builder
    }

    /// Exact origins; `*` allows every origin
    #[must_use]
    pub fn allowed_origins(mut self, origins: &[&str]) -> Self {
        self.allowed_origins = origins.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Regex patterns matched against the whole origin
    #[must_use]
    pub fn origin_patterns(mut self, patterns: &[&str]) -> Self {
        self.origin_patterns = patterns.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn allowed_methods(mut self, methods: &[Method]) -> Self {
        self.allowed_methods = methods.to_vec();
        self
    }

    /// Use `&["*"]` to allow all request headers
    #[must_use]
    pub fn allowed_headers(mut self, headers: &[&str]) -> Self {
        self.allowed_headers = headers.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    #[must_use]
    pub fn expose_headers(mut self, headers: &[&str]) -> Self {
        self.expose_headers = headers.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Preflight cache duration in seconds
    #[must_use]
    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// - `WildcardWithCredentials` for `*` together with credentials
    /// - `InvalidOriginFormat` for an exact origin without a scheme
    /// - `InvalidPattern` for a regex that does not compile
    /// - `InvalidMethod` for a configured method that does not parse
    pub fn build(self) -> Result<CorsMiddleware, CorsConfigError> {
        if let Some(method) = self.bad_method {
            return Err(CorsConfigError::InvalidMethod { method });
        }
        let wildcard = self.allowed_origins.iter().any(|o| o == "*");
        if self.allow_credentials && wildcard {
            return Err(CorsConfigError::WildcardWithCredentials);
        }
        if let Some(origin) = self
            .allowed_origins
            .iter()
            .find(|o| *o != "*" && !o.contains("://"))
        {
            return Err(CorsConfigError::InvalidOriginFormat {
                origin: origin.clone(),
            });
        }

        let origin_validation = if wildcard {
            OriginValidation::Wildcard
        } else if !self.origin_patterns.is_empty() {
            let mut patterns = Vec::with_capacity(self.origin_patterns.len());
            for pattern in &self.origin_patterns {
                let re = Regex::new(pattern).map_err(|e| CorsConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                patterns.push(re);
            }
            OriginValidation::Patterns {
                exact: self.allowed_origins,
                patterns,
            }
        } else {
            OriginValidation::Exact(self.allowed_origins)
        };

        Ok(CorsMiddleware {
            origin_validation,
            allowed_headers: self.allowed_headers,
            allowed_methods: self.allowed_methods,
            allow_credentials: self.allow_credentials,
            expose_headers: self.expose_headers,
            max_age: self.max_age,
        })
    }
}

impl Default for CorsMiddlewareBuilder {
    fn default() -> Self {
        Self::new()
    }
}
