use tracing::{info, info_span, warn, Span};

use super::core::{ChainResult, Middleware, Next};
use crate::context::RequestContext;

/// Wraps the inner chain in a `request` span and logs start and completion.
///
/// The span is not entered across `next`: a coroutine may resume on another
/// thread, so events name the span as their parent instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl TracingMiddleware {
    fn span(ctx: &RequestContext) -> Span {
        let request = ctx.request();
        info_span!(
            "request",
            request_id = %ctx.request_id(),
            method = %request.method,
            path = %request.path,
            operation = tracing::field::Empty,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}

impl Middleware for TracingMiddleware {
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult {
        let span = Self::span(ctx);
        info!(parent: &span, "Request started");

        let result = next.run(ctx);

        if let Some(matched) = ctx.matched_route() {
            span.record("operation", matched.spec.operation_name().as_str());
        }
        let latency_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX);
        span.record("latency_ms", latency_ms);
        match &result {
            Ok(response) => {
                let status = response.as_ref().map(|r| r.status).or_else(|| ctx.response().status());
                if let Some(status) = status {
                    span.record("status", status);
                }
                info!(parent: &span, status = ?status, latency_ms, "Request completed");
            }
            Err(err) => {
                span.record("status", err.status());
                warn!(parent: &span, code = %err.code(), latency_ms, "Request failed");
            }
        }
        result
    }
}
