use dashmap::DashMap;
use may_minihttp::Response;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::warn;

use crate::http::HandlerResponse;

/// Distinct header lines kept in the intern table
const MAX_INTERNED_HEADERS: usize = 4096;

/// `may_minihttp` only accepts `&'static str` header lines; repeated lines
/// share one allocation
static HEADER_LINES: Lazy<DashMap<String, &'static str>> = Lazy::new(DashMap::new);

pub(crate) fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        499 => "Client Closed Request",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// `None` once the table is full and the line is new
fn header_line(name: &str, value: &str) -> Option<&'static str> {
    let line = format!("{name}: {value}");
    if let Some(interned) = HEADER_LINES.get(&line) {
        return Some(*interned);
    }
    if HEADER_LINES.len() >= MAX_INTERNED_HEADERS {
        warn!(header = %name, "Header intern table full, header dropped");
        return None;
    }
    let leaked: &'static str = Box::leak(line.clone().into_boxed_str());
    Some(*HEADER_LINES.entry(line).or_insert(leaked))
}

/// Serialize `response` onto the wire
pub fn write_response(res: &mut Response, response: &HandlerResponse) {
    res.status_code(usize::from(response.status), status_reason(response.status));

    let mut has_content_type = false;
    for (name, value) in &response.headers {
        if name.eq_ignore_ascii_case("content-type") {
            has_content_type = true;
        }
        // may_minihttp writes its own
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        if let Some(line) = header_line(name, value) {
            res.header(line);
        }
    }

    match &response.body {
        Value::Null if response.status == 204 || response.status == 304 => {}
        Value::String(text) => {
            if !has_content_type {
                res.header("Content-Type: text/plain; charset=utf-8");
            }
            res.body_vec(text.clone().into_bytes());
        }
        other => {
            if !has_content_type {
                res.header("Content-Type: application/json");
            }
            res.body_vec(serde_json::to_vec(other).unwrap_or_default());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(405), "Method Not Allowed");
        assert_eq!(status_reason(422), "Unprocessable Entity");
        assert_eq!(status_reason(499), "Client Closed Request");
        assert_eq!(status_reason(299), "Unknown");
    }

    #[test]
    fn test_header_lines_are_interned() {
        let a = header_line("x-intern-test", "v1").unwrap();
        let b = header_line("x-intern-test", "v1").unwrap();
        assert_eq!(a, "x-intern-test: v1");
        assert!(std::ptr::eq(a, b));
    }
}
