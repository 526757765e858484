//! Integration tests for the built-in chain entries
//!
//! # Test Coverage
//!
//! - CORS: preflight short-circuit, origin rejection, response decoration,
//!   policy validation
//! - Authentication: bearer tokens, roles, principal binding
//! - Parse-params: typed coercion and aggregated validation problems
//! - Metrics: request, status, operation and auth-failure counters

use brrtcore::application::Application;
use brrtcore::config::{AppConfig, CorsConfig};
use brrtcore::context::RequestContext;
use brrtcore::dispatcher::Dispatcher;
use brrtcore::error::DispatchError;
use brrtcore::http::{HandlerResponse, HttpRequest};
use brrtcore::keys;
use brrtcore::middleware::{
    AuthMiddleware, BearerTokenAuthenticator, CorsConfigError, CorsMiddlewareBuilder, Principal,
};
use brrtcore::operation::{OperationArgs, OperationResult};
use brrtcore::router::{ParamType, ParameterSpec, RouteSpec};
use http::Method;
use serde_json::{json, Value};

mod common;
use common::fixtures::{echo_args, ok_operation};

fn whoami(ctx: &mut RequestContext, _: &OperationArgs) -> Result<OperationResult, DispatchError> {
    let user = ctx.get(&keys::CURRENT_USER)?;
    Ok(json!({ "id": user.id, "roles": user.roles }).into())
}

fn run(dispatcher: &Dispatcher, request: HttpRequest) -> HandlerResponse {
    let (response, _) = dispatcher.dispatch(request);
    response.unwrap()
}

fn cors_app() -> Dispatcher {
    let config = AppConfig {
        cors: CorsConfig {
            enabled: true,
            allowed_origins: vec!["https://app.example.com".to_string()],
            allowed_headers: vec!["Content-Type".to_string(), "X-Api-Key".to_string()],
            allow_credentials: true,
            expose_headers: vec!["X-Request-Id".to_string()],
            max_age: Some(600),
            ..CorsConfig::default()
        },
        ..AppConfig::default()
    };
    let mut app = Application::new(config);
    app.route(RouteSpec::handler(Method::GET, "/items", "items", ok_operation))
        .unwrap();
    app.start().unwrap()
}

#[test]
fn test_cors_preflight_answered_before_routing() {
    let dispatcher = cors_app();
    // no OPTIONS route exists, the preflight never reaches find-route
    let request = HttpRequest::new(Method::OPTIONS, "/items")
        .with_header("Origin", "https://app.example.com")
        .with_header("Access-Control-Request-Method", "GET")
        .with_header("Access-Control-Request-Headers", "content-type, x-api-key");
    let response = run(&dispatcher, request);
    assert_eq!(response.status, 204);
    assert_eq!(
        response.get_header("access-control-allow-origin"),
        Some("https://app.example.com")
    );
    assert_eq!(response.get_header("access-control-allow-credentials"), Some("true"));
    assert_eq!(response.get_header("access-control-max-age"), Some("600"));
    assert!(response
        .get_header("access-control-allow-methods")
        .unwrap()
        .contains("GET"));
}

#[test]
fn test_cors_rejects_unknown_origin() {
    let dispatcher = cors_app();
    let request = HttpRequest::new(Method::GET, "/items").with_header("Origin", "https://evil.test");
    let response = run(&dispatcher, request);
    assert_eq!(response.status, 403);
    assert_eq!(response.body["error"]["code"], "CORS_REJECTED");
    assert!(response.get_header("access-control-allow-origin").is_none());
}

#[test]
fn test_cors_preflight_rejects_header() {
    let dispatcher = cors_app();
    let request = HttpRequest::new(Method::OPTIONS, "/items")
        .with_header("Origin", "https://app.example.com")
        .with_header("Access-Control-Request-Method", "GET")
        .with_header("Access-Control-Request-Headers", "x-secret");
    let response = run(&dispatcher, request);
    assert_eq!(response.status, 403);
}

#[test]
fn test_cors_decorates_actual_response() {
    let dispatcher = cors_app();
    let request =
        HttpRequest::new(Method::GET, "/items").with_header("Origin", "https://app.example.com");
    let response = run(&dispatcher, request);
    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({ "ok": true }));
    assert_eq!(
        response.get_header("access-control-allow-origin"),
        Some("https://app.example.com")
    );
    assert_eq!(response.get_header("access-control-expose-headers"), Some("X-Request-Id"));
    assert_eq!(response.get_header("vary"), Some("Origin"));
}

#[test]
fn test_cors_ignores_requests_without_origin() {
    let dispatcher = cors_app();
    let response = run(&dispatcher, HttpRequest::new(Method::GET, "/items"));
    assert_eq!(response.status, 200);
    assert!(response.get_header("access-control-allow-origin").is_none());
}

#[test]
fn test_cors_policy_is_validated_at_startup() {
    let bad = |cors: CorsConfig| {
        CorsMiddlewareBuilder::from_config(&CorsConfig { enabled: true, ..cors })
            .build()
            .unwrap_err()
    };
    assert_eq!(
        bad(CorsConfig {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
            ..CorsConfig::default()
        }),
        CorsConfigError::WildcardWithCredentials
    );
    assert!(matches!(
        bad(CorsConfig {
            allowed_origins: vec!["example.com".to_string()],
            ..CorsConfig::default()
        }),
        CorsConfigError::InvalidOriginFormat { .. }
    ));
    assert_eq!(
        bad(CorsConfig {
            allowed_methods: vec!["get".to_string(), "GE T".to_string()],
            ..CorsConfig::default()
        }),
        CorsConfigError::InvalidMethod {
            method: "GE T".to_string()
        }
    );

    // the application refuses to start with a rejected policy
    let mut app = Application::new(AppConfig {
        cors: CorsConfig {
            enabled: true,
            origin_patterns: vec!["(unclosed".to_string()],
            ..CorsConfig::default()
        },
        ..AppConfig::default()
    });
    app.route(RouteSpec::handler(Method::GET, "/items", "items", ok_operation))
        .unwrap();
    assert!(app.start().is_err());
}

fn auth_app() -> Application {
    let mut app = Application::new(AppConfig::default());
    app.route(RouteSpec::handler(Method::GET, "/me", "me", whoami))
        .unwrap();
    app.route(RouteSpec::handler(Method::DELETE, "/items/{id}", "delete_item", echo_args))
        .unwrap();
    app.route(RouteSpec::handler(Method::GET, "/items", "items", ok_operation))
        .unwrap();
    app.authentication(
        AuthMiddleware::new()
            .with_authenticator(
                BearerTokenAuthenticator::new()
                    .with_token("t-admin", Principal::new("ada", &["admin", "user"]))
                    .with_token("t-user", Principal::new("bob", &["user"])),
            )
            .protect("me", &[])
            .protect("delete_item", &["admin"]),
    );
    app
}

#[test]
fn test_authenticated_principal_is_bound_for_the_operation() {
    let dispatcher = auth_app().start().unwrap();
    let request = HttpRequest::new(Method::GET, "/me").with_header("Authorization", "Bearer t-user");
    let response = run(&dispatcher, request);
    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({ "id": "bob", "roles": ["user"] }));
    assert!(!dispatcher.scope().is_bound("security.user"));
}

#[test]
fn test_missing_or_unknown_credentials_are_unauthorized() {
    let dispatcher = auth_app().start().unwrap();
    let response = run(&dispatcher, HttpRequest::new(Method::GET, "/me"));
    assert_eq!(response.status, 401);
    assert_eq!(response.body["error"]["code"], "UNAUTHORIZED");

    let request =
        HttpRequest::new(Method::GET, "/me").with_header("Authorization", "Bearer not-a-token");
    let response = run(&dispatcher, request);
    assert_eq!(response.status, 401);
}

#[test]
fn test_missing_role_is_forbidden() {
    let dispatcher = auth_app().start().unwrap();
    let request = HttpRequest::new(Method::DELETE, "/items/9")
        .with_header("Authorization", "Bearer t-user");
    let response = run(&dispatcher, request);
    assert_eq!(response.status, 403);
    assert_eq!(response.body["error"]["code"], "FORBIDDEN");

    let request = HttpRequest::new(Method::DELETE, "/items/9")
        .with_header("Authorization", "Bearer t-admin");
    let response = run(&dispatcher, request);
    assert_eq!(response.status, 200);
}

#[test]
fn test_public_operations_skip_authentication() {
    let dispatcher = auth_app().start().unwrap();
    let response = run(&dispatcher, HttpRequest::new(Method::GET, "/items"));
    assert_eq!(response.status, 200);
}

fn search_app() -> Dispatcher {
    let mut app = Application::new(AppConfig::default());
    app.route(
        RouteSpec::handler(Method::POST, "/shops/{shop}/search", "search", echo_args)
            .with_parameter(ParameterSpec::path("shop").of_type(ParamType::Integer))
            .with_parameter(
                ParameterSpec::query("limit")
                    .of_type(ParamType::Integer)
                    .required(true),
            )
            .with_parameter(ParameterSpec::query("exact").of_type(ParamType::Boolean))
            .with_parameter(ParameterSpec::header("x-tenant").required(true))
            .with_parameter(ParameterSpec::body("filter").of_type(ParamType::Json)),
    )
    .unwrap();
    app.start().unwrap()
}

#[test]
fn test_parameters_are_coerced_in_declaration_order() {
    let dispatcher = search_app();
    let request = HttpRequest::new(Method::POST, "/shops/12/search?limit=5&exact=true")
        .with_header("X-Tenant", "acme")
        .with_json(&json!({ "name": "lamp" }));
    let response = run(&dispatcher, request);
    assert_eq!(response.status, 200);
    assert_eq!(
        response.body["args"],
        json!({
            "shop": 12,
            "limit": 5,
            "exact": true,
            "x-tenant": "acme",
            "filter": { "name": "lamp" }
        })
    );
}

#[test]
fn test_optional_parameter_defaults_to_null() {
    let dispatcher = search_app();
    let request = HttpRequest::new(Method::POST, "/shops/12/search?limit=5")
        .with_header("X-Tenant", "acme")
        .with_json(&json!({}));
    let response = run(&dispatcher, request);
    assert_eq!(response.body["args"]["exact"], Value::Null);
}

#[test]
fn test_every_invalid_parameter_is_reported() {
    let dispatcher = search_app();
    let request = HttpRequest::new(Method::POST, "/shops/main/search?limit=many")
        .with_json(&json!({}));
    let response = run(&dispatcher, request);
    assert_eq!(response.status, 422);
    assert_eq!(response.body["error"]["code"], "VALIDATION_ERROR");
    let details = response.body["error"]["details"].as_array().unwrap();
    let names: Vec<&str> = details
        .iter()
        .filter_map(|d| d["name"].as_str())
        .collect();
    assert_eq!(names, vec!["shop", "limit", "x-tenant"]);
}

#[test]
fn test_metrics_count_requests_statuses_and_failures() {
    let app = auth_app();
    let metrics = std::sync::Arc::clone(app.metrics());
    let dispatcher = app.start().unwrap();

    run(&dispatcher, HttpRequest::new(Method::GET, "/items"));
    run(&dispatcher, HttpRequest::new(Method::GET, "/items"));
    run(&dispatcher, HttpRequest::new(Method::GET, "/me"));
    run(&dispatcher, HttpRequest::new(Method::GET, "/missing"));

    assert_eq!(metrics.request_count(), 4);
    assert_eq!(metrics.status_count(200), 2);
    assert_eq!(metrics.status_count(401), 1);
    assert_eq!(metrics.status_count(404), 1);
    assert_eq!(metrics.error_count(), 2);
    assert_eq!(metrics.auth_failures(), 1);
    assert_eq!(metrics.operation_count("items"), 2);

    let text = metrics.render();
    assert!(text.contains("brrtcore_requests_total 4"));
    assert!(text.contains("brrtcore_responses_total{status=\"401\"} 1"));
}
