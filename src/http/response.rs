use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

use super::HeaderVec;
use crate::error::DispatchError;

/// Response produced by an operation or a middleware entry
///
/// A `Value::String` body is sent as `text/plain`; any other value is sent as
/// JSON. `Value::Null` with status 204 produces an empty body.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HandlerResponse {
    /// HTTP status code (200, 404, 500, etc.)
    pub status: u16,
    /// HTTP response headers (stack-allocated for ≤16 headers)
    #[serde(skip_serializing)]
    pub headers: HeaderVec,
    /// Response body
    pub body: Value,
}

impl HandlerResponse {
    #[must_use]
    pub fn new(status: u16, headers: HeaderVec, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Create a JSON response with default headers
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "application/json".to_string()));
        Self {
            status,
            headers,
            body,
        }
    }

    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    #[must_use]
    pub fn no_content() -> Self {
        Self::new(204, HeaderVec::new(), Value::Null)
    }

    /// Structured error response; internal details are never included
    #[must_use]
    pub fn from_error(err: &DispatchError) -> Self {
        let body = serde_json::to_value(err.to_body()).unwrap_or(Value::Null);
        Self::json(err.to_body().error.status_code, body)
    }

    /// Get a header by name
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or update a header
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }
}

/// Single-write response sink shared by everything in one request.
///
/// The first [`ResponseWriter::write`] wins; later attempts are rejected,
/// counted, and logged.
#[derive(Clone, Default)]
pub struct ResponseWriter {
    slot: Arc<Mutex<Option<HandlerResponse>>>,
    written: Arc<AtomicBool>,
    rejected: Arc<AtomicUsize>,
}

impl ResponseWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the response; returns `false` if one was already written
    pub fn write(&self, response: HandlerResponse) -> bool {
        if self.written.swap(true, Ordering::AcqRel) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                status = response.status,
                "Response already written - ignoring additional write"
            );
            return false;
        }
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(response);
        true
    }

    #[must_use]
    pub fn is_written(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }

    /// Number of writes rejected because a response was already written
    #[must_use]
    pub fn rejected_writes(&self) -> usize {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Status of the written response, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.status)
    }

    /// Take the written response for the transport. The writer stays marked
    /// as written, so nothing else can be written afterwards.
    #[must_use]
    pub fn take(&self) -> Option<HandlerResponse> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("written", &self.is_written())
            .field("rejected", &self.rejected_writes())
            .finish()
    }
}
