use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::core::{ChainResult, Middleware, Next};
use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::http::HttpRequest;
use crate::keys;
use crate::registry::Binding;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    #[must_use]
    pub fn new(id: &str, roles: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            roles: roles.iter().map(|r| (*r).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Extracts a principal from request credentials
pub trait Authenticator: Send + Sync {
    /// Scheme name used in logs
    fn scheme(&self) -> &str;

    /// `Ok(None)` when the request carries no credentials for this scheme.
    ///
    /// # Errors
    ///
    /// `Unauthorized` when credentials are present but invalid.
    fn authenticate(&self, req: &HttpRequest) -> Result<Option<Principal>, DispatchError>;
}

/// `Authorization: Bearer <token>` against a static token table
#[derive(Debug, Clone, Default)]
pub struct BearerTokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl BearerTokenAuthenticator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: &str, principal: Principal) -> Self {
        self.tokens.insert(token.to_string(), principal);
        self
    }
}

impl Authenticator for BearerTokenAuthenticator {
    fn scheme(&self) -> &str {
        "bearer"
    }

    fn authenticate(&self, req: &HttpRequest) -> Result<Option<Principal>, DispatchError> {
        let Some(header) = req.get_header("authorization") else {
            return Ok(None);
        };
        let Some(token) = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
        else {
            return Ok(None);
        };
        self.tokens
            .get(token.trim())
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                DispatchError::unauthorized("Invalid bearer token").with_code("INVALID_TOKEN")
            })
    }
}

/// API key in a request header
#[derive(Debug, Clone)]
pub struct ApiKeyAuthenticator {
    header: String,
    keys: HashMap<String, Principal>,
}

impl ApiKeyAuthenticator {
    #[must_use]
    pub fn new(header: &str) -> Self {
        Self {
            header: header.to_ascii_lowercase(),
            keys: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: &str, principal: Principal) -> Self {
        self.keys.insert(key.to_string(), principal);
        self
    }
}

impl Authenticator for ApiKeyAuthenticator {
    fn scheme(&self) -> &str {
        "api-key"
    }

    fn authenticate(&self, req: &HttpRequest) -> Result<Option<Principal>, DispatchError> {
        match req.get_header(&self.header) {
            None => Ok(None),
            Some(key) => self.keys.get(key).cloned().map(Some).ok_or_else(|| {
                DispatchError::unauthorized("Invalid API key").with_code("INVALID_API_KEY")
            }),
        }
    }
}

/// Enforces per-operation access rules.
///
/// Operations without a rule are public. For a protected operation the
/// authenticators are tried in order; the first principal found is bound
/// at `security.user` in the request scope. No principal yields
/// `Unauthorized`; a principal lacking every required role yields `Forbidden`.
#[derive(Clone, Default)]
pub struct AuthMiddleware {
    authenticators: Vec<Arc<dyn Authenticator>>,
    /// operation name → roles, any of which grants access (empty = any principal)
    rules: HashMap<String, Vec<String>>,
}

impl AuthMiddleware {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_authenticator<A: Authenticator + 'static>(mut self, authenticator: A) -> Self {
        self.authenticators.push(Arc::new(authenticator));
        self
    }

    /// Require authentication (and one of `roles`, if any) for `operation`
    #[must_use]
    pub fn protect(mut self, operation: &str, roles: &[&str]) -> Self {
        self.rules.insert(
            operation.to_string(),
            roles.iter().map(|r| (*r).to_string()).collect(),
        );
        self
    }

    fn authenticate(&self, req: &HttpRequest) -> Result<Option<Principal>, DispatchError> {
        for authenticator in &self.authenticators {
            if let Some(principal) = authenticator.authenticate(req)? {
                debug!(scheme = authenticator.scheme(), principal = %principal.id, "Authenticated");
                return Ok(Some(principal));
            }
        }
        Ok(None)
    }
}

impl Middleware for AuthMiddleware {
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult {
        let Some(operation) = ctx.matched_route().map(|m| m.spec.operation_name()) else {
            return next.run(ctx);
        };
        let Some(required) = self.rules.get(&operation) else {
            return next.run(ctx);
        };

        let Some(principal) = self.authenticate(ctx.request())? else {
            warn!(request_id = %ctx.request_id(), operation = %operation, "Missing credentials");
            return Err(DispatchError::unauthorized("Authentication required"));
        };
        if !required.is_empty() && !required.iter().any(|r| principal.has_role(r)) {
            warn!(
                request_id = %ctx.request_id(),
                operation = %operation,
                principal = %principal.id,
                "Insufficient role"
            );
            return Err(DispatchError::forbidden(format!(
                "Access to {operation} is not permitted"
            )));
        }

        ctx.bind(Binding::constant(&keys::CURRENT_USER, principal));
        next.run(ctx)
    }
}

impl std::fmt::Debug for AuthMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthMiddleware")
            .field(
                "schemes",
                &self.authenticators.iter().map(|a| a.scheme()).collect::<Vec<_>>(),
            )
            .field("rules", &self.rules)
            .finish()
    }
}
