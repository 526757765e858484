use http::Method;
use once_cell::sync::OnceCell;
use serde_json::Value;
use smallvec::SmallVec;
use std::sync::Arc;

use crate::error::DispatchError;
use crate::router::ParamVec;

/// Maximum inline headers/cookies before heap allocation
/// Most requests have ≤16 headers (JSF: no heap in hot path)
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header/cookie storage for the hot path
///
/// Header names use `Arc<str>` so repeated names clone in O(1).
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Transport-agnostic request handed to the dispatcher.
///
/// The transport adapter fills this in from whatever it parsed off the wire;
/// the dispatch core never sees the raw connection.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request path without query string
    pub path: String,
    /// Parsed query string parameters
    pub query_params: ParamVec,
    /// HTTP headers (lowercase names)
    pub headers: HeaderVec,
    /// Parsed cookies from the Cookie header
    pub cookies: HeaderVec,
    body: Option<Vec<u8>>,
    /// Outcome of the first [`HttpRequest::json_body`] call
    parsed_body: OnceCell<Result<Option<Value>, DispatchError>>,
}

impl HttpRequest {
    /// Build a request from a method and a URI path that may carry a query string
    #[must_use]
    pub fn new(method: Method, uri: &str) -> Self {
        let path = uri.split('?').next().unwrap_or("/");
        let path = if path.is_empty() { "/" } else { path };
        Self {
            method,
            path: path.to_string(),
            query_params: parse_query_params(uri),
            headers: HeaderVec::new(),
            cookies: HeaderVec::new(),
            body: None,
            parsed_body: OnceCell::new(),
        }
    }

    /// Add a header; the name is stored lowercase. A `cookie` header is also
    /// split into [`HttpRequest::cookies`].
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name == "cookie" {
            self.cookies.extend(parse_cookies(value));
        }
        self.headers.push((Arc::from(name.as_str()), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self.parsed_body = OnceCell::new();
        self
    }

    /// Raw request body
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Set a JSON body and the matching content type
    #[must_use]
    pub fn with_json(self, body: &Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get a query parameter by name (last write wins)
    #[inline]
    #[must_use]
    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    #[must_use]
    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON.
    ///
    /// Returns `Ok(None)` for an absent or empty body and a validation error
    /// when the body is not valid JSON. The body is parsed once; later calls
    /// return the cached outcome.
    pub fn json_body(&self) -> Result<Option<&Value>, DispatchError> {
        self.parsed_body
            .get_or_init(|| match self.body.as_deref() {
                None | Some([]) => Ok(None),
                Some(bytes) => serde_json::from_slice(bytes).map(Some).map_err(|e| {
                    DispatchError::validation("Request body is not valid JSON")
                        .with_code("INVALID_JSON_BODY")
                        .with_details(Value::String(e.to_string()))
                }),
            })
            .as_ref()
            .map(Option::as_ref)
            .map_err(Clone::clone)
    }
}

/// Parse `a=b; c=d` cookie header values
pub fn parse_cookies(header: &str) -> HeaderVec {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim().to_string();
            Some((Arc::from(name), value))
        })
        .collect()
}

/// Parse query string parameters from a URL path
///
/// Extracts everything after the `?` character and URL-decodes parameter names and values.
pub fn parse_query_params(path: &str) -> ParamVec {
    match path.find('?') {
        Some(pos) => url::form_urlencoded::parse(path[pos + 1..].as_bytes())
            .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
            .collect(),
        None => ParamVec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies("a=b; c=d");
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[1].1, "d");
    }

    #[test]
    fn test_parse_query_params() {
        let q = parse_query_params("/p?x=1&y=hello%20world");
        assert_eq!(q[0].1, "1");
        assert_eq!(q[1].1, "hello world");
    }

    #[test]
    fn test_request_splits_query_and_headers() {
        let req = HttpRequest::new(Method::GET, "/recipes?limit=10&limit=20")
            .with_header("X-Api-Key", "secret")
            .with_header("Cookie", "session=abc");
        assert_eq!(req.path, "/recipes");
        assert_eq!(req.get_query_param("limit"), Some("20"));
        assert_eq!(req.get_header("x-api-key"), Some("secret"));
        assert_eq!(req.get_cookie("session"), Some("abc"));
    }

    #[test]
    fn test_invalid_json_is_validation_error() {
        let req = HttpRequest::new(Method::POST, "/recipes").with_body("{not json");
        let err = req.json_body().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(HttpRequest::new(Method::GET, "/").json_body().unwrap().is_none());
    }

    #[test]
    fn test_json_body_is_parsed_once() {
        let req = HttpRequest::new(Method::POST, "/recipes").with_body(r#"{"title":"soup"}"#);
        let first = req.json_body().unwrap().unwrap();
        let second = req.json_body().unwrap().unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first["title"], "soup");

        // clones carry the cache; a new body replaces it
        let copy = req.clone();
        assert_eq!(copy.json_body().unwrap().unwrap()["title"], "soup");
        let replaced = copy.with_body(r#"{"title":"bread"}"#);
        assert_eq!(replaced.json_body().unwrap().unwrap()["title"], "bread");
        assert_eq!(replaced.body(), Some(&br#"{"title":"bread"}"#[..]));
    }
}
