//! # Application Assembly
//!
//! [`Application`] owns everything configured before the first request: the
//! root scope, the route table and the middleware entries. Registration is
//! single-threaded; [`Application::start`] freezes the route table, builds
//! the chain and returns a cloneable [`Dispatcher`].
//!
//! The default chain registered by [`Application::new`]:
//!
//! | Group | Entry |
//! |-------|-------|
//! | `send-response` | `send-response` |
//! | `cors` | `cors` (only when `cors.enabled`) |
//! | `middleware` | `tracing`, `metrics` |
//! | `find-route` | `find-route` (added at start) |
//! | `parse-params` | `parse-params` |
//! | `invoke-operation` | `invoke-operation` |
//!
//! The `authentication` group is empty until [`Application::authentication`]
//! is called.

use anyhow::{Context, Result};
use http::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::graphql::{mounted_route_name, GraphQlServer};
use crate::keys;
use crate::middleware::{
    groups, register_middleware, AuthMiddleware, ChainBuilder, CorsMiddlewareBuilder,
    FindRouteMiddleware, InvokeOperationMiddleware, Middleware, MiddlewareEntry,
    MetricsMiddleware, ParseParamsMiddleware, SendResponseMiddleware, TracingMiddleware,
};
use crate::operation::{controller_binding, Controller};
use crate::registry::{Binding, Dependency, Injected, Scope};
use crate::router::{RouteSpec, RouteTable};
use crate::server::{AppService, HttpServer, ServerHandle};

/// Paths the HTTP transport serves itself
const TRANSPORT_PATHS: [&str; 2] = ["/health", "/metrics"];

/// A reusable bundle of bindings, routes and middleware
pub trait Component {
    fn bindings(&self) -> Vec<Binding> {
        Vec::new()
    }

    fn routes(&self) -> Vec<RouteSpec> {
        Vec::new()
    }

    fn middleware(&self) -> Vec<MiddlewareEntry> {
        Vec::new()
    }
}

pub struct Application {
    config: AppConfig,
    scope: Arc<Scope>,
    routes: RouteTable,
    chain: ChainBuilder,
    metrics: Arc<MetricsMiddleware>,
}

impl Application {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let scope = Scope::new_root("application");
        let routes = match config.base_path.as_deref() {
            Some(base) => RouteTable::with_base_path(base),
            None => RouteTable::new(),
        };
        let chain = match &config.chain.groups {
            Some(order) => ChainBuilder::default().with_groups(order.iter().cloned()),
            None => ChainBuilder::default(),
        };
        let metrics = MetricsMiddleware::shared();

        register_middleware(
            &scope,
            MiddlewareEntry::new("send-response", groups::SEND_RESPONSE, SendResponseMiddleware),
        );
        register_middleware(
            &scope,
            MiddlewareEntry::new("tracing", groups::MIDDLEWARE, TracingMiddleware),
        );
        register_middleware(
            &scope,
            MiddlewareEntry::from_arc(
                "metrics",
                groups::MIDDLEWARE,
                Arc::clone(&metrics) as Arc<dyn Middleware>,
            ),
        );
        register_middleware(
            &scope,
            MiddlewareEntry::new("parse-params", groups::PARSE_PARAMS, ParseParamsMiddleware),
        );
        register_middleware(
            &scope,
            MiddlewareEntry::new(
                "invoke-operation",
                groups::INVOKE_OPERATION,
                InvokeOperationMiddleware,
            ),
        );

        debug!(groups = ?chain.groups(), "Application created");
        Self {
            config,
            scope,
            routes,
            chain,
            metrics,
        }
    }

    /// The root scope
    #[must_use]
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Counters collected by the `metrics` entry
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsMiddleware> {
        &self.metrics
    }

    /// Add a binding to the root scope
    pub fn bind(&mut self, binding: Binding) -> Arc<Binding> {
        self.scope.add(binding)
    }

    /// Register a route
    ///
    /// # Errors
    ///
    /// `Conflict` when the method and pattern are already taken.
    pub fn route(&mut self, spec: RouteSpec) -> Result<Arc<RouteSpec>, DispatchError> {
        self.routes.register(spec)
    }

    /// Bind a controller class at `key`; routes reach it through
    /// [`RouteSpec::controller`]
    pub fn controller<C, F>(
        &mut self,
        key: &str,
        class_name: &str,
        dependencies: Vec<Dependency>,
        construct: F,
    ) -> Arc<Binding>
    where
        C: Controller + 'static,
        F: Fn(&Injected) -> Result<C, DispatchError> + Send + Sync + 'static,
    {
        self.scope
            .add(controller_binding(key, class_name, dependencies, construct))
    }

    pub fn middleware(&mut self, entry: MiddlewareEntry) -> Arc<Binding> {
        register_middleware(&self.scope, entry)
    }

    /// Register `auth` as the `authentication` entry
    pub fn authentication(&mut self, auth: AuthMiddleware) -> Arc<Binding> {
        self.middleware(MiddlewareEntry::new(
            "authentication",
            groups::AUTHENTICATION,
            auth,
        ))
    }

    /// Add everything `component` contributes
    ///
    /// # Errors
    ///
    /// The first route conflict; bindings and middleware added before it stay.
    pub fn component<C: Component>(&mut self, component: &C) -> Result<(), DispatchError> {
        for binding in component.bindings() {
            self.scope.add(binding);
        }
        for entry in component.middleware() {
            register_middleware(&self.scope, entry);
        }
        for spec in component.routes() {
            self.routes.register(spec)?;
        }
        Ok(())
    }

    /// Serve `server` at `graphql.path`: its bindings go into the root scope,
    /// `POST` and `GET` routes are mounted and its entry joins the
    /// `invoke-operation` group. Does nothing when `graphql.enabled` is off.
    ///
    /// # Errors
    ///
    /// `Conflict` when a route already occupies the path for either method.
    /// Nothing is registered in that case.
    pub fn mount_graphql(&mut self, server: &GraphQlServer) -> Result<(), DispatchError> {
        if !self.config.graphql.enabled {
            info!("GraphQL disabled in configuration - endpoint not mounted");
            return Ok(());
        }
        let path = self.config.graphql.path.clone();
        let name = mounted_route_name(&path);
        for method in [Method::POST, Method::GET] {
            self.routes.check_available(&method, &path)?;
        }
        self.routes
            .register(RouteSpec::mounted(Method::POST, path.as_str(), &name))?;
        self.routes
            .register(RouteSpec::mounted(Method::GET, path.as_str(), &name))?;
        server.register(&self.scope);
        register_middleware(&self.scope, server.as_middleware(&path));
        info!(path = %path, "GraphQL endpoint mounted");
        Ok(())
    }

    /// Freeze the route table and build the chain
    ///
    /// # Errors
    ///
    /// Invalid CORS settings or a chain that cannot be ordered.
    pub fn start(self) -> Result<Dispatcher> {
        let routes = Arc::new(self.routes);
        self.scope
            .add(Binding::new(keys::ROUTES.as_str()).to_arc(Arc::clone(&routes)));

        if self.config.cors.enabled {
            let cors = CorsMiddlewareBuilder::from_config(&self.config.cors)
                .build()
                .context("Invalid CORS configuration")?;
            register_middleware(
                &self.scope,
                MiddlewareEntry::new("cors", groups::CORS, cors),
            );
        }
        register_middleware(
            &self.scope,
            MiddlewareEntry::new(
                "find-route",
                groups::FIND_ROUTE,
                FindRouteMiddleware::new(Arc::clone(&routes)),
            ),
        );
        routes.dump_routes();

        let chain = self
            .chain
            .build_from_scope(&self.scope)
            .context("Failed to build middleware chain")?;
        Ok(Dispatcher::new(self.scope, routes, chain))
    }

    /// Transport endpoints (`GET /health`, `GET /metrics`) that a registered
    /// route would also match; [`Application::serve`] answers them before the
    /// chain runs
    #[must_use]
    pub fn shadowed_paths(&self) -> Vec<&'static str> {
        TRANSPORT_PATHS
            .into_iter()
            .filter(|path| self.routes.matches(&Method::GET, path))
            .collect()
    }

    /// Start the HTTP server at `http.addr`
    ///
    /// # Errors
    ///
    /// See [`Application::start`]; also fails when the address cannot be bound.
    pub fn serve(self) -> Result<ServerHandle> {
        let addr = self.config.http.addr.clone();
        let max_body_bytes = self.config.http.max_body_bytes;
        may::config().set_stack_size(self.config.http.stack_size);
        let metrics = Arc::clone(&self.metrics);

        for path in self.shadowed_paths() {
            warn!(path, "Route is shadowed by the built-in transport endpoint");
        }

        let dispatcher = self.start()?;
        let service = AppService::new(dispatcher, max_body_bytes).with_metrics(metrics);
        let in_flight = service.in_flight().clone();
        let handle = HttpServer(service)
            .start(addr.as_str())
            .with_context(|| format!("Failed to bind {addr}"))?
            .with_in_flight(in_flight);
        info!(addr = %handle.addr(), "Server listening");
        Ok(handle)
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("scope", &self.scope.name())
            .field("routes", &self.routes.len())
            .field("groups", &self.chain.groups())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::error::ErrorKind;
    use crate::http::HttpRequest;
    use crate::operation::{OperationArgs, OperationResult};
    use crate::context::RequestContext;
    use serde_json::json;

    fn hello(_: &mut RequestContext, _: &OperationArgs) -> Result<OperationResult, DispatchError> {
        Ok(json!({"hello": "world"}).into())
    }

    #[test]
    fn test_default_chain_order() {
        let app = Application::new(AppConfig::default());
        let dispatcher = app.start().unwrap();
        assert_eq!(
            dispatcher.chain().entry_names(),
            vec![
                "send-response",
                "tracing",
                "metrics",
                "find-route",
                "parse-params",
                "invoke-operation"
            ]
        );
    }

    #[test]
    fn test_route_and_dispatch() {
        let mut app = Application::new(AppConfig::default());
        app.route(RouteSpec::handler(Method::GET, "/hello", "hello", hello))
            .unwrap();
        let metrics = Arc::clone(app.metrics());
        let dispatcher = app.start().unwrap();

        let (response, report) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/hello"));
        let response = response.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({"hello": "world"}));
        assert_eq!(report.status, Some(200));
        assert_eq!(metrics.request_count(), 1);
    }

    #[test]
    fn test_base_path_prefixes_routes() {
        let config = AppConfig {
            base_path: Some("/api".to_string()),
            ..AppConfig::default()
        };
        let mut app = Application::new(config);
        app.route(RouteSpec::handler(Method::GET, "/hello", "hello", hello))
            .unwrap();
        let dispatcher = app.start().unwrap();

        let (_, report) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/api/hello"));
        assert_eq!(report.status, Some(200));
        let (_, report) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/hello"));
        assert_eq!(report.error, Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_group_override_missing_group_fails_start() {
        let config = AppConfig {
            chain: ChainConfig {
                groups: Some(vec!["send-response".into(), "invoke-operation".into()]),
            },
            ..AppConfig::default()
        };
        let err = Application::new(config).start().unwrap_err();
        assert!(format!("{err:#}").contains("middleware chain"));
    }

    #[test]
    fn test_invalid_cors_config_fails_start() {
        let mut config = AppConfig::default();
        config.cors.enabled = true;
        config.cors.allowed_origins = vec!["*".into()];
        config.cors.allow_credentials = true;
        assert!(Application::new(config).start().is_err());
    }

    #[test]
    fn test_routes_bound_after_start() {
        let mut app = Application::new(AppConfig::default());
        app.route(RouteSpec::handler(Method::GET, "/hello", "hello", hello))
            .unwrap();
        let dispatcher = app.start().unwrap();
        let routes = dispatcher.scope().get(&keys::ROUTES).unwrap();
        assert_eq!(routes.len(), 1);
    }

    #[test]
    fn test_transport_endpoints_shadow_routes() {
        let mut app = Application::new(AppConfig::default());
        app.route(RouteSpec::handler(Method::GET, "/hello", "hello", hello))
            .unwrap();
        assert!(app.shadowed_paths().is_empty());

        app.route(RouteSpec::handler(Method::GET, "/health/", "health", hello))
            .unwrap();
        app.route(RouteSpec::handler(Method::POST, "/metrics", "push", hello))
            .unwrap();
        assert_eq!(app.shadowed_paths(), vec!["/health"]);

        app.route(RouteSpec::handler(Method::GET, "/{page}", "page", hello))
            .unwrap();
        assert_eq!(app.shadowed_paths(), vec!["/health", "/metrics"]);
    }

    struct Greeting;

    impl Component for Greeting {
        fn bindings(&self) -> Vec<Binding> {
            vec![Binding::new("greeting.text").to("hi".to_string())]
        }

        fn routes(&self) -> Vec<RouteSpec> {
            vec![RouteSpec::handler(
                Method::GET,
                "/greet",
                "greet",
                |ctx: &mut RequestContext,
                 _: &OperationArgs|
                 -> Result<OperationResult, DispatchError> {
                    let text = ctx.scope().get_named::<String>("greeting.text")?;
                    Ok(json!({ "text": text.as_str() }).into())
                },
            )]
        }
    }

    #[test]
    fn test_component_contributes_bindings_and_routes() {
        let mut app = Application::new(AppConfig::default());
        app.component(&Greeting).unwrap();
        let dispatcher = app.start().unwrap();
        let (response, _) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/greet"));
        assert_eq!(response.unwrap().body, json!({"text": "hi"}));
    }
}
