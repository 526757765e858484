use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::context::{AbortHandle, RequestContext, RequestId};
use crate::error::{DispatchError, ErrorKind};
use crate::http::{HandlerResponse, HttpRequest, ResponseWriter};
use crate::middleware::MiddlewareChain;
use crate::registry::Scope;
use crate::router::RouteTable;

/// What happened to one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub request_id: RequestId,
    /// Status of the response that was written; `None` if nothing was written
    pub status: Option<u16>,
    /// Kind of the error that reached the dispatcher, if any
    pub error: Option<ErrorKind>,
    /// The transport abandoned the request
    pub aborted: bool,
}

/// Runs the middleware chain for each request and guarantees a response.
///
/// Cheap to clone; clones share the root scope, the frozen route table and
/// the chain.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    scope: Arc<Scope>,
    routes: Arc<RouteTable>,
    chain: Arc<MiddlewareChain>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(scope: Arc<Scope>, routes: Arc<RouteTable>, chain: MiddlewareChain) -> Self {
        info!(
            routes = routes.len(),
            chain = %chain.name(),
            entries = ?chain.entry_names(),
            "Dispatcher ready"
        );
        Self {
            scope,
            routes,
            chain: Arc::new(chain),
        }
    }

    /// The application scope every request scope is created under
    #[must_use]
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    #[must_use]
    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    #[must_use]
    pub fn chain(&self) -> &MiddlewareChain {
        &self.chain
    }

    /// Handle one request, writing exactly one response into `writer`
    /// unless the request was aborted.
    ///
    /// Errors that unwind out of the chain are mapped to a structured error
    /// body; a chain that finishes without writing anything yields a 404.
    pub fn handle(
        &self,
        request: HttpRequest,
        writer: &ResponseWriter,
        abort: AbortHandle,
    ) -> DispatchReport {
        let mut ctx = RequestContext::new(&self.scope, request, writer.clone(), abort);
        let request_id = ctx.request_id();

        let result = match catch_unwind(AssertUnwindSafe(|| self.chain.run(&mut ctx))) {
            Ok(result) => result,
            Err(panic) => {
                let panic_message = panic_message(panic.as_ref());
                error!(
                    request_id = %request_id,
                    panic_message = %panic_message,
                    "Middleware chain panicked - CRITICAL"
                );
                Err(DispatchError::internal(format!("panic: {panic_message}")))
            }
        };

        let mut error_kind = None;
        match result {
            Ok(Some(response)) => {
                // chains without a send-response entry hand the response back
                if !ctx.is_aborted() {
                    ctx.write(response);
                }
            }
            Ok(None) => {}
            Err(err) => {
                error_kind = Some(err.kind());
                if err.kind() != ErrorKind::RequestAborted && !ctx.is_aborted() {
                    Self::write_error(&ctx, &err);
                }
            }
        }

        let aborted = ctx.is_aborted() || error_kind == Some(ErrorKind::RequestAborted);
        if aborted {
            debug!(request_id = %request_id, "Request aborted - no response written");
        } else if !writer.is_written() {
            let req = ctx.request();
            let err = DispatchError::not_found(format!(
                "Endpoint \"{} {}\" not found.",
                req.method, req.path
            ));
            debug!(request_id = %request_id, "Chain wrote no response - sending fallback 404");
            ctx.write(HandlerResponse::from_error(&err));
        }

        let report = DispatchReport {
            request_id,
            status: writer.status(),
            error: error_kind,
            aborted,
        };
        drop(ctx);
        report
    }

    /// Run a request against a fresh writer and return the response.
    ///
    /// `None` only when the request was aborted.
    pub fn dispatch(&self, request: HttpRequest) -> (Option<HandlerResponse>, DispatchReport) {
        let writer = ResponseWriter::new();
        let report = self.handle(request, &writer, AbortHandle::new());
        (writer.take(), report)
    }

    fn write_error(ctx: &RequestContext, err: &DispatchError) {
        match err.kind() {
            ErrorKind::Internal => error!(
                request_id = %ctx.request_id(),
                error = %err,
                source = ?std::error::Error::source(err).map(ToString::to_string),
                "Unhandled error - responding with 500"
            ),
            _ if err.is_masked() => warn!(
                request_id = %ctx.request_id(),
                code = %err.code(),
                status = err.status(),
                message = %err.message(),
                "Registry error - client message masked"
            ),
            ErrorKind::Unauthorized | ErrorKind::Forbidden => warn!(
                request_id = %ctx.request_id(),
                code = %err.code(),
                status = err.status(),
                "Request rejected"
            ),
            _ => debug!(
                request_id = %ctx.request_id(),
                code = %err.code(),
                status = err.status(),
                message = %err.message(),
                "Error mapped to response"
            ),
        }

        let mut response = HandlerResponse::from_error(err);
        if err.kind() == ErrorKind::MethodNotAllowed {
            if let Some(allowed) = err
                .details()
                .and_then(|d| d.get("allowed"))
                .and_then(|a| a.as_array())
            {
                let allow = allowed
                    .iter()
                    .filter_map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                response.set_header("allow", allow);
            }
        }
        if !ctx.write(response) {
            debug!(
                request_id = %ctx.request_id(),
                "Response already written - error response dropped"
            );
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        format!("{panic:?}")
    }
}
