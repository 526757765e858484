use http::Method;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::container::ResolverContainer;
use super::document::{parse_document, select_operation, OperationType};
use super::executor::{
    AuthCheckerFn, ContextResolverFn, ExecutionEnv, GraphQlError, GraphQlExecutor,
    GraphQlFieldMiddleware, GraphQlRequest, GraphQlResponse, RootFieldExecutor,
    SharedFieldMiddleware,
};
use super::keys::{AUTH_CHECKER, CONTEXT_RESOLVER, MIDDLEWARE_TAG, RESOLVER_DATA};
use super::resolver::{register_resolver, ResolverClass, ResolverData};
use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::keys;
use crate::middleware::{groups, ChainResult, Middleware, MiddlewareEntry, Next};
use crate::registry::{filter_by_tag, Binding, BindingKey, Scope};
use crate::router::OperationRef;

/// Name of the mounted routes registered for a GraphQL endpoint at `path`
#[must_use]
pub fn mounted_route_name(path: &str) -> String {
    format!("graphql:{}", normalize(path))
}

/// GraphQL endpoint served from the REST middleware chain.
///
/// Resolver classes, field middleware, the auth checker and the context
/// resolver are bound into the application scope by [`GraphQlServer::register`];
/// at request time they are looked up again through the request scope, so
/// resolvers are built under the same scoping rules as REST operations.
///
/// ```rust
/// use brrtcore::graphql::GraphQlServer;
///
/// let server = GraphQlServer::new();
/// let entry = server.as_middleware("/graphql");
/// assert_eq!(entry.name(), "graphql");
/// assert_eq!(entry.group(), "invoke-operation");
/// ```
#[derive(Clone, Default)]
pub struct GraphQlServer {
    classes: Vec<ResolverClass>,
    unbound: HashSet<String>,
    middlewares: Vec<SharedFieldMiddleware>,
    auth_checker: Option<AuthCheckerFn>,
    context_resolver: Option<ContextResolverFn>,
    executor: Option<Arc<dyn GraphQlExecutor>>,
}

impl GraphQlServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resolver class to the schema and bind it on registration
    #[must_use]
    pub fn resolver(mut self, class: ResolverClass) -> Self {
        self.unbound.remove(class.name());
        self.classes.push(class);
        self
    }

    /// Add a resolver class to the schema without binding it; instances are
    /// built in a throw-away scope per request
    #[must_use]
    pub fn schema_resolver(mut self, class: ResolverClass) -> Self {
        self.unbound.insert(class.name().to_string());
        self.classes.push(class);
        self
    }

    /// Field middleware, applied in registration order
    #[must_use]
    pub fn middleware<M: GraphQlFieldMiddleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    #[must_use]
    pub fn auth_checker<F>(mut self, checker: F) -> Self
    where
        F: Fn(&super::FieldInfo<'_>, &[String]) -> bool + Send + Sync + 'static,
    {
        self.auth_checker = Some(Arc::new(checker));
        self
    }

    #[must_use]
    pub fn context_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<serde_json::Value, DispatchError> + Send + Sync + 'static,
    {
        self.context_resolver = Some(Arc::new(resolver));
        self
    }

    /// Replace the built-in [`RootFieldExecutor`]
    #[must_use]
    pub fn with_executor<E: GraphQlExecutor + 'static>(mut self, executor: E) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    #[must_use]
    pub fn classes(&self) -> &[ResolverClass] {
        &self.classes
    }

    /// Bind resolvers, field middleware, auth checker and context resolver
    /// into `scope`
    pub fn register(&self, scope: &Scope) {
        for class in self.classes.iter().filter(|c| !self.unbound.contains(c.name())) {
            register_resolver(scope, class);
        }
        for middleware in &self.middlewares {
            let key: BindingKey<SharedFieldMiddleware> = BindingKey::generate(MIDDLEWARE_TAG);
            scope.add(Binding::constant(&key, Arc::clone(middleware)).tag(MIDDLEWARE_TAG));
        }
        if let Some(checker) = &self.auth_checker {
            scope.add(Binding::constant(&AUTH_CHECKER, Arc::clone(checker)));
        }
        if let Some(resolver) = &self.context_resolver {
            scope.add(Binding::constant(&CONTEXT_RESOLVER, Arc::clone(resolver)));
        }
        info!(
            scope = %scope.name(),
            resolvers = self.classes.len(),
            middlewares = self.middlewares.len(),
            "GraphQL server registered"
        );
    }

    /// Chain entry in the `invoke-operation` group serving `path`
    #[must_use]
    pub fn as_middleware(&self, path: &str) -> MiddlewareEntry {
        let executor = self
            .executor
            .clone()
            .unwrap_or_else(|| Arc::new(RootFieldExecutor::new(self.classes.clone())));
        let path = normalize(path);
        MiddlewareEntry::new(
            "graphql",
            groups::INVOKE_OPERATION,
            GraphQlMiddleware {
                route_name: format!("graphql:{path}"),
                path,
                executor,
            },
        )
    }
}

impl std::fmt::Debug for GraphQlServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQlServer")
            .field("classes", &self.classes)
            .field("unbound", &self.unbound)
            .field("middlewares", &self.middlewares.len())
            .field("auth_checker", &self.auth_checker.is_some())
            .field("context_resolver", &self.context_resolver.is_some())
            .finish()
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

struct GraphQlMiddleware {
    path: String,
    route_name: String,
    executor: Arc<dyn GraphQlExecutor>,
}

impl GraphQlMiddleware {
    fn handles(&self, ctx: &RequestContext) -> bool {
        match ctx.matched_route() {
            Some(matched) => matches!(
                &matched.spec.operation,
                OperationRef::Mounted { name } if *name == self.route_name
            ),
            // chains without find-route
            None => {
                let req = ctx.request();
                (req.method == Method::POST || req.method == Method::GET)
                    && normalize(&req.path) == self.path
            }
        }
    }

    fn resolver_data(ctx: &RequestContext) -> Result<ResolverData, DispatchError> {
        let context = match ctx.get_optional(&CONTEXT_RESOLVER)? {
            Some(resolver) => resolver(ctx)?,
            None => json!({ "requestId": ctx.request_id().to_string() }),
        };
        Ok(ResolverData {
            request_id: ctx.request_id(),
            context,
            user: ctx.get_optional(&keys::CURRENT_USER)?,
        })
    }

    fn is_mutation(request: &GraphQlRequest) -> bool {
        parse_document(&request.query)
            .ok()
            .and_then(|ops| {
                select_operation(&ops, request.operation_name.as_deref())
                    .ok()
                    .map(|op| op.kind == OperationType::Mutation)
            })
            .unwrap_or(false)
    }
}

impl Middleware for GraphQlMiddleware {
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult {
        if !self.handles(ctx) {
            return next.run(ctx);
        }

        let request = match GraphQlRequest::from_http(ctx.request()) {
            Ok(request) => request,
            Err(err) => {
                debug!(request_id = %ctx.request_id(), error = %err, "Bad GraphQL request");
                let error = GraphQlError::new(err.message(), err.code());
                return Ok(Some(GraphQlResponse::request_error(error).into_http(400)));
            }
        };
        if ctx.request().method == Method::GET && Self::is_mutation(&request) {
            let error = GraphQlError::new(
                "Can only perform a mutation operation from a POST request.",
                "METHOD_NOT_ALLOWED",
            );
            let mut response = GraphQlResponse::request_error(error).into_http(405);
            response.set_header("allow", "POST".to_string());
            return Ok(Some(response));
        }

        let data = Arc::new(Self::resolver_data(ctx)?);
        ctx.bind(Binding::constant(&RESOLVER_DATA, Arc::clone(&data)));

        let middlewares: Vec<SharedFieldMiddleware> = ctx
            .scope()
            .create_view(filter_by_tag(MIDDLEWARE_TAG))
            .values::<SharedFieldMiddleware>()?
            .iter()
            .map(|m| Arc::clone(m.as_ref()))
            .collect();
        let auth_checker = ctx.get_optional(&AUTH_CHECKER)?;
        let container = ResolverContainer::new(Arc::clone(ctx.scope()));

        let env = ExecutionEnv {
            container: &container,
            data: &data,
            middlewares: &middlewares,
            auth_checker: auth_checker.as_deref(),
        };
        let response = self.executor.execute(&request, &env);
        debug!(
            request_id = %ctx.request_id(),
            operation = ?request.operation_name,
            errors = response.errors.len(),
            "GraphQL request executed"
        );
        let status = response.status();
        Ok(Some(response.into_http(status)))
    }
}
