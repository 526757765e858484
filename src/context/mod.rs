//! # Request Context
//!
//! One [`RequestContext`] exists per request. It owns a fresh request scope
//! (a child of the application scope) seeded with the request, the response
//! writer, and the request id; the route and parsed arguments are added as
//! the chain progresses. Dropping the context releases the scope and
//! everything cached in it.

mod request_id;

pub use request_id::{RequestId, REQUEST_ID_HEADER};

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::error::DispatchError;
use crate::http::{HandlerResponse, HttpRequest, ResponseWriter};
use crate::keys;
use crate::operation::OperationArgs;
use crate::registry::{Binding, BindingKey, Scope, ScopeKind};
use crate::router::MatchedRoute;

/// Abort flag shared between the transport and the running chain
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the request as abandoned by the client
    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Per-request state threaded through the middleware chain
pub struct RequestContext {
    request_id: RequestId,
    scope: Arc<Scope>,
    request: Arc<HttpRequest>,
    response: ResponseWriter,
    abort: AbortHandle,
    matched: Option<MatchedRoute>,
    args: Option<OperationArgs>,
    started: Instant,
}

impl RequestContext {
    /// Create the context and its request scope under `parent`
    pub fn new(
        parent: &Arc<Scope>,
        request: HttpRequest,
        response: ResponseWriter,
        abort: AbortHandle,
    ) -> Self {
        let request_id = RequestId::from_header_or_new(request.get_header(REQUEST_ID_HEADER));
        let scope = parent.create_child(&format!("request-{request_id}"), ScopeKind::Request);
        let request = Arc::new(request);

        scope.add(Binding::new(keys::HTTP_REQUEST.as_str()).to_arc(Arc::clone(&request)));
        scope.add(Binding::constant(&keys::HTTP_RESPONSE, response.clone()));
        scope.add(Binding::constant(&keys::REQUEST_ID, request_id));

        debug!(
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
            "Request context created"
        );

        Self {
            request_id,
            scope,
            request,
            response,
            abort,
            matched: None,
            args: None,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// The request scope
    #[must_use]
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    #[must_use]
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    #[must_use]
    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }

    /// Write the response for this request; `false` if one was already written
    pub fn write(&self, response: HandlerResponse) -> bool {
        self.response.write(response)
    }

    #[must_use]
    pub fn abort_handle(&self) -> &AbortHandle {
        &self.abort
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    #[must_use]
    pub fn matched_route(&self) -> Option<&MatchedRoute> {
        self.matched.as_ref()
    }

    /// Record the matched route and publish it into the request scope
    pub fn set_matched_route(&mut self, matched: MatchedRoute) {
        matched.update_bindings(&self.scope);
        self.matched = Some(matched);
    }

    #[must_use]
    pub fn args(&self) -> Option<&OperationArgs> {
        self.args.as_ref()
    }

    pub fn set_args(&mut self, args: OperationArgs) {
        trace!(request_id = %self.request_id, count = args.len(), "Operation arguments set");
        self.args = Some(args);
    }

    /// Resolve a binding against the request scope
    pub fn get<T: Any + Send + Sync>(&self, key: &BindingKey<T>) -> Result<Arc<T>, DispatchError> {
        self.scope.get(key)
    }

    /// Resolve an optional binding against the request scope
    pub fn get_optional<T: Any + Send + Sync>(
        &self,
        key: &BindingKey<T>,
    ) -> Result<Option<Arc<T>>, DispatchError> {
        self.scope.get_optional(key)
    }

    /// Add a binding to the request scope only
    pub fn bind(&self, binding: Binding) -> Arc<Binding> {
        self.scope.add(binding)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        self.scope.clear_request_cache();
        debug!(
            request_id = %self.request_id,
            written = self.response.is_written(),
            duration_us = self.started.elapsed().as_micros(),
            "Request context released"
        );
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("matched", &self.matched.as_ref().map(|m| m.spec.operation_name()))
            .finish()
    }
}
