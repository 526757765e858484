use std::sync::Arc;
use tracing::debug;

use super::core::{ChainResult, Middleware, Next};
use crate::context::RequestContext;
use crate::router::RouteTable;

/// Matches the request against the route table and records the result in
/// the request context. A miss unwinds the chain with `NotFound` or
/// `MethodNotAllowed`, so later groups never run.
#[derive(Debug, Clone)]
pub struct FindRouteMiddleware {
    routes: Arc<RouteTable>,
}

impl FindRouteMiddleware {
    #[must_use]
    pub fn new(routes: Arc<RouteTable>) -> Self {
        Self { routes }
    }
}

impl Middleware for FindRouteMiddleware {
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult {
        let matched = {
            let request = ctx.request();
            debug!(
                request_id = %ctx.request_id(),
                method = %request.method,
                path = %request.path,
                "Finding route"
            );
            self.routes.match_route(&request.method, &request.path)?
        };
        ctx.set_matched_route(matched);
        next.run(ctx)
    }
}
