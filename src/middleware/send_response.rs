use tracing::debug;

use super::core::{ChainResult, Middleware, Next};
use crate::context::RequestContext;

/// Outermost entry: writes whatever response the rest of the chain produced.
///
/// Errors pass through untouched so the dispatcher can map them; nothing is
/// written for an aborted request.
#[derive(Debug, Default, Clone, Copy)]
pub struct SendResponseMiddleware;

impl Middleware for SendResponseMiddleware {
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult {
        let result = next.run(ctx)?;
        if let Some(response) = result {
            if ctx.is_aborted() {
                debug!(request_id = %ctx.request_id(), "Client gone - response dropped");
                return Ok(None);
            }
            if !ctx.write(response) {
                debug!(
                    request_id = %ctx.request_id(),
                    "Response already written by an inner entry"
                );
            }
        }
        Ok(None)
    }
}
