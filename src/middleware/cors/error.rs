use std::fmt;

/// Rejected CORS policy, reported by [`super::CorsMiddlewareBuilder::build`]
/// before the chain is assembled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsConfigError {
    /// `*` in `allowed_origins` while `allow_credentials` is on
    WildcardWithCredentials,
    /// Exact origin missing its scheme
    InvalidOriginFormat { origin: String },
    InvalidPattern { pattern: String, reason: String },
    /// Entry in `allowed_methods` that is not an HTTP method token
    InvalidMethod { method: String },
}

impl fmt::Display for CorsConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid cors config: ")?;
        match self {
            Self::WildcardWithCredentials => {
                f.write_str("allow_credentials requires explicit origins, not '*'")
            }
            Self::InvalidOriginFormat { origin } => {
                write!(f, "origin '{origin}' must look like https://host[:port]")
            }
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "origin pattern '{pattern}' does not compile: {reason}")
            }
            Self::InvalidMethod { method } => write!(f, "'{method}' is not an HTTP method"),
        }
    }
}

impl std::error::Error for CorsConfigError {}
