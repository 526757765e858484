use http::Method;
use may_minihttp::Request;
use std::fmt;
use std::io::{self, Read};
use tracing::debug;

use crate::error::{ErrorBody, ErrorPayload};
use crate::http::{HandlerResponse, HttpRequest};

/// The transport could not turn the wire request into an [`HttpRequest`]
#[derive(Debug)]
pub enum RequestError {
    InvalidMethod(String),
    PayloadTooLarge { limit: usize },
    Body(io::Error),
}

impl RequestError {
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            RequestError::InvalidMethod(_) | RequestError::Body(_) => 400,
            RequestError::PayloadTooLarge { .. } => 413,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::InvalidMethod(_) | RequestError::Body(_) => "BAD_REQUEST",
            RequestError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
        }
    }

    /// Error response in the same shape the dispatcher writes
    #[must_use]
    pub fn to_response(&self) -> HandlerResponse {
        let body = ErrorBody {
            error: ErrorPayload {
                message: self.to_string(),
                code: self.code().to_string(),
                status_code: self.status(),
                details: None,
            },
        };
        HandlerResponse::json(
            self.status(),
            serde_json::to_value(body).unwrap_or(serde_json::Value::Null),
        )
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::InvalidMethod(m) => write!(f, "Invalid HTTP method '{m}'"),
            RequestError::PayloadTooLarge { limit } => {
                write!(f, "Request body exceeds {limit} bytes")
            }
            RequestError::Body(e) => write!(f, "Failed to read request body: {e}"),
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RequestError::Body(e) => Some(e),
            _ => None,
        }
    }
}

/// Convert a `may_minihttp::Request`, reading at most `max_body_bytes` of body
///
/// # Errors
///
/// Unknown method, oversized body, or an I/O failure while reading it.
pub fn into_http_request(req: Request, max_body_bytes: usize) -> Result<HttpRequest, RequestError> {
    let headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();
    let mut request = build_request(req.method(), req.path(), &headers)?;

    if let Some(declared) = request
        .get_header("content-length")
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        if declared > max_body_bytes {
            return Err(RequestError::PayloadTooLarge {
                limit: max_body_bytes,
            });
        }
    }
    let body = read_body(req.body(), max_body_bytes)?;
    if !body.is_empty() {
        request = request.with_body(body);
    }
    Ok(request)
}

/// Method, target and headers into an [`HttpRequest`]
///
/// # Errors
///
/// `InvalidMethod` when the method token is not valid.
pub fn build_request(
    method: &str,
    target: &str,
    headers: &[(String, String)],
) -> Result<HttpRequest, RequestError> {
    let method: Method = method
        .parse()
        .map_err(|_| RequestError::InvalidMethod(method.to_string()))?;
    let mut request = HttpRequest::new(method, target);
    for (name, value) in headers {
        request = request.with_header(name, value);
    }
    debug!(
        method = %request.method,
        path = %request.path,
        header_count = request.headers.len(),
        cookie_count = request.cookies.len(),
        query_count = request.query_params.len(),
        "Request parsed"
    );
    Ok(request)
}

/// Read the whole body, failing once it grows past `limit`
///
/// # Errors
///
/// `PayloadTooLarge` or the underlying read error.
pub fn read_body<R: Read>(reader: R, limit: usize) -> Result<Vec<u8>, RequestError> {
    let mut body = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    reader
        .take(cap)
        .read_to_end(&mut body)
        .map_err(RequestError::Body)?;
    if body.len() > limit {
        return Err(RequestError::PayloadTooLarge { limit });
    }
    Ok(body)
}
