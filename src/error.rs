//! # Error Module
//!
//! Every failure inside the dispatch core is a [`DispatchError`]. Errors carry an
//! [`ErrorKind`] which decides the HTTP status and the stable machine-readable
//! `code` that reaches the client, plus a human message and optional details.
//!
//! Internal errors keep their original message and source for logging, but the
//! client-visible body produced by [`DispatchError::to_body`] never contains them:
//!
//! ```json
//! { "error": { "message": "Internal Server Error", "code": "INTERNAL_SERVER_ERROR", "statusCode": 500 } }
//! ```

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Classification of a dispatch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No matching route, or a required binding is absent
    NotFound,
    /// Duplicate route registration
    Conflict,
    /// The path matched but no route accepts the method
    MethodNotAllowed,
    /// Parameter or body shape rejected
    Validation,
    /// Missing or invalid credentials
    Unauthorized,
    /// Credentials valid but insufficient
    Forbidden,
    /// Anything unanticipated, including factory failures and panics
    Internal,
    /// The transport went away before the chain finished
    RequestAborted,
}

impl ErrorKind {
    /// HTTP status code for this kind
    #[must_use]
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::MethodNotAllowed => 405,
            ErrorKind::Validation => 422,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::Internal => 500,
            // nginx convention for "client closed request"; never written to a live socket
            ErrorKind::RequestAborted => 499,
        }
    }

    /// Stable machine-readable code for this kind
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Internal => "INTERNAL_SERVER_ERROR",
            ErrorKind::RequestAborted => "REQUEST_ABORTED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Codes whose messages carry registry internals
const MASKED_CODES: [&str; 2] = ["BINDING_NOT_FOUND", "CIRCULAR_DEPENDENCY"];

/// Error raised anywhere in route matching, binding resolution or the chain
#[derive(Debug, Clone)]
pub struct DispatchError {
    kind: ErrorKind,
    message: String,
    code: Option<String>,
    details: Option<Value>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl DispatchError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            details: None,
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MethodNotAllowed, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn aborted() -> Self {
        Self::new(ErrorKind::RequestAborted, "request aborted by transport")
    }

    /// Wrap an arbitrary error as an internal error, keeping it as the source
    pub fn from_source<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: ErrorKind::Internal,
            message: err.to_string(),
            code: None,
            details: None,
            source: Some(Arc::new(err)),
        }
    }

    /// Override the machine-readable code (e.g. `BINDING_NOT_FOUND`)
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach client-visible details (ignored for internal errors)
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn code(&self) -> &str {
        self.code.as_deref().unwrap_or_else(|| self.kind.code())
    }

    #[must_use]
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    /// Whether the client sees a generic message instead of `message()`.
    ///
    /// True for internal errors and for registry errors whose message names
    /// binding keys or scopes.
    #[must_use]
    pub fn is_masked(&self) -> bool {
        self.kind == ErrorKind::Internal || MASKED_CODES.contains(&self.code())
    }

    /// Build the client-visible error body.
    ///
    /// Masked errors get a generic message and no details; the original
    /// stays on `self` for logging.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let error = if self.kind == ErrorKind::Internal {
            ErrorPayload {
                message: "Internal Server Error".to_string(),
                code: ErrorKind::Internal.code().to_string(),
                status_code: ErrorKind::Internal.status(),
                details: None,
            }
        } else if self.is_masked() {
            ErrorPayload {
                message: "Not Found".to_string(),
                code: self.code().to_string(),
                status_code: self.status(),
                details: None,
            }
        } else {
            ErrorPayload {
                message: self.message.clone(),
                code: self.code().to_string(),
                status_code: self.status(),
                details: self.details.clone(),
            }
        };
        ErrorBody { error }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::from_source(err)
    }
}

/// Wire format of an error response: `{ "error": { ... } }`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
    pub code: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}
