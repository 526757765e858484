use std::sync::Arc;
use tracing::{debug, warn};

use super::core::{ChainResult, Middleware, Next};
use crate::context::RequestContext;
use crate::operation::SharedController;
use crate::router::OperationRef;

/// Invokes the matched operation.
///
/// Handler routes run their function; controller routes resolve a fresh
/// controller from the request scope (constructor dependencies included) and
/// call the named method. Mounted routes and requests without a match are
/// passed to `next`, where a protocol entry such as the GraphQL bridge may
/// serve them.
#[derive(Debug, Default, Clone, Copy)]
pub struct InvokeOperationMiddleware;

impl Middleware for InvokeOperationMiddleware {
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult {
        let Some(spec) = ctx.matched_route().map(|m| Arc::clone(&m.spec)) else {
            return next.run(ctx);
        };
        let args = ctx.args().cloned().unwrap_or_default();

        let result = match &spec.operation {
            OperationRef::Handler { operation, .. } => operation.invoke(ctx, &args),
            OperationRef::Controller { key, method } => {
                let controller = ctx.scope().get_named::<SharedController>(key)?;
                controller.invoke(method, ctx, &args)
            }
            OperationRef::Mounted { name } => {
                debug!(request_id = %ctx.request_id(), mount = %name, "Mounted route - passing on");
                return next.run(ctx);
            }
        };

        match result {
            Ok(value) => {
                debug!(
                    request_id = %ctx.request_id(),
                    operation = %spec.operation_name(),
                    "Operation completed"
                );
                Ok(Some(value.into_response()))
            }
            Err(err) => {
                warn!(
                    request_id = %ctx.request_id(),
                    operation = %spec.operation_name(),
                    code = %err.code(),
                    "Operation failed"
                );
                Err(err)
            }
        }
    }
}
