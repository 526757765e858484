//! Integration tests for the dispatch orchestrator
//!
//! # Test Coverage
//!
//! End-to-end through [`Application`] and [`Dispatcher`]:
//! - literal vs parameter routes (recipes scenario)
//! - exactly one response write per request
//! - find-route failures keep invoke-operation from running
//! - request scope isolation between concurrent requests
//! - error mapping: validation, internal masking, panics, 405 `allow`,
//!   binding keys kept out of 404 bodies
//! - abort handling and the fallback 404
//! - controllers constructed with injected dependencies

use brrtcore::application::Application;
use brrtcore::config::AppConfig;
use brrtcore::context::{AbortHandle, RequestContext};
use brrtcore::error::{DispatchError, ErrorKind};
use brrtcore::http::{HandlerResponse, HttpRequest, ResponseWriter};
use brrtcore::middleware::{
    groups, ApiKeyAuthenticator, AuthMiddleware, ChainResult, Middleware, MiddlewareEntry, Next,
    Principal,
};
use brrtcore::operation::{Controller, OperationArgs, OperationResult};
use brrtcore::registry::{Binding, Dependency};
use brrtcore::router::{ParamType, ParameterSpec, RouteSpec};
use http::Method;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

mod common;
use common::fixtures::{echo_args, ok_operation};

use tracing_util::TestTracing;

type OpResult = Result<OperationResult, DispatchError>;

fn list_recipes(_: &mut RequestContext, _: &OperationArgs) -> OpResult {
    Ok(json!({ "operation": "list" }).into())
}

fn get_recipe(_: &mut RequestContext, args: &OperationArgs) -> OpResult {
    Ok(json!({ "operation": "get", "id": args.get("id") }).into())
}

fn reject(_: &mut RequestContext, _: &OperationArgs) -> OpResult {
    Err(DispatchError::validation("title must not be empty")
        .with_details(json!([{ "path": "title", "message": "is empty" }])))
}

fn leak(_: &mut RequestContext, _: &OperationArgs) -> OpResult {
    let io = std::io::Error::new(std::io::ErrorKind::Other, "db password=hunter2 refused");
    Err(DispatchError::from_source(io))
}

fn boom(_: &mut RequestContext, _: &OperationArgs) -> OpResult {
    panic!("handler exploded");
}

fn abort_midway(ctx: &mut RequestContext, _: &OperationArgs) -> OpResult {
    ctx.abort_handle().abort();
    Ok(json!({ "never": "sent" }).into())
}

fn app() -> Application {
    let mut app = Application::new(AppConfig::default());
    app.route(RouteSpec::handler(Method::GET, "/recipes", "list", list_recipes))
        .unwrap();
    app.route(RouteSpec::handler(Method::GET, "/recipes/{id}", "get", get_recipe))
        .unwrap();
    app.route(RouteSpec::handler(Method::POST, "/recipes", "create", reject))
        .unwrap();
    app.route(RouteSpec::handler(Method::GET, "/leak", "leak", leak))
        .unwrap();
    app.route(RouteSpec::handler(Method::GET, "/boom", "boom", boom))
        .unwrap();
    app.route(RouteSpec::handler(Method::GET, "/abort", "abort", abort_midway))
        .unwrap();
    app.route(RouteSpec::mounted(Method::GET, "/unserved", "nobody"))
        .unwrap();
    app
}

#[test]
fn test_recipes_literal_and_parameter_routes() {
    let _tracing = TestTracing::init();
    let dispatcher = app().start().unwrap();

    let (response, report) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/recipes/42"));
    assert_eq!(report.status, Some(200));
    assert_eq!(response.unwrap().body, json!({ "operation": "get", "id": "42" }));

    let (response, _) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/recipes"));
    assert_eq!(response.unwrap().body, json!({ "operation": "list" }));
}

struct EagerWriter;

impl Middleware for EagerWriter {
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult {
        ctx.write(HandlerResponse::json(202, json!({ "early": true })));
        next.run(ctx)
    }
}

#[test]
fn test_exactly_one_response_is_written() {
    let mut app = app();
    app.middleware(MiddlewareEntry::new("eager", groups::MIDDLEWARE, EagerWriter));
    let dispatcher = app.start().unwrap();

    let writer = ResponseWriter::new();
    let report = dispatcher.handle(
        HttpRequest::new(Method::GET, "/recipes"),
        &writer,
        AbortHandle::new(),
    );
    assert_eq!(report.status, Some(202));
    assert_eq!(writer.rejected_writes(), 1);
    let response = writer.take().unwrap();
    assert_eq!(response.body, json!({ "early": true }));
}

struct Tripwire(Arc<AtomicBool>);

impl Middleware for Tripwire {
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult {
        self.0.store(true, Ordering::SeqCst);
        next.run(ctx)
    }
}

#[test]
fn test_route_not_found_prevents_invocation() {
    let invoked = Arc::new(AtomicBool::new(false));
    let mut app = app();
    app.middleware(MiddlewareEntry::new(
        "tripwire",
        groups::INVOKE_OPERATION,
        Tripwire(Arc::clone(&invoked)),
    ));
    let dispatcher = app.start().unwrap();

    let (response, report) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/nothing/here"));
    let response = response.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(report.error, Some(ErrorKind::NotFound));
    assert_eq!(response.body["error"]["code"], "NOT_FOUND");
    assert_eq!(
        response.body["error"]["message"],
        "Endpoint \"GET /nothing/here\" not found."
    );
    assert!(!invoked.load(Ordering::SeqCst));
}

#[test]
fn test_method_not_allowed_sets_allow_header() {
    let dispatcher = app().start().unwrap();
    let (response, _) = dispatcher.dispatch(HttpRequest::new(Method::DELETE, "/recipes"));
    let response = response.unwrap();
    assert_eq!(response.status, 405);
    assert_eq!(response.body["error"]["code"], "METHOD_NOT_ALLOWED");
    let allow = response.get_header("allow").unwrap();
    assert!(allow.contains("GET"));
    assert!(allow.contains("POST"));
}

#[test]
fn test_validation_error_body_has_code_and_no_internals() {
    let dispatcher = app().start().unwrap();
    let (response, report) = dispatcher.dispatch(
        HttpRequest::new(Method::POST, "/recipes").with_json(&json!({ "title": "" })),
    );
    let response = response.unwrap();
    assert_eq!(report.error, Some(ErrorKind::Validation));
    assert_eq!(response.status, 422);
    assert_eq!(
        response.body,
        json!({
            "error": {
                "statusCode": 422,
                "code": "VALIDATION_ERROR",
                "message": "title must not be empty",
                "details": [{ "path": "title", "message": "is empty" }]
            }
        })
    );
}

#[test]
fn test_internal_errors_are_masked() {
    let dispatcher = app().start().unwrap();
    let (response, report) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/leak"));
    let response = response.unwrap();
    assert_eq!(report.error, Some(ErrorKind::Internal));
    assert_eq!(response.status, 500);
    assert_eq!(
        response.body,
        json!({
            "error": {
                "statusCode": 500,
                "code": "INTERNAL_SERVER_ERROR",
                "message": "Internal Server Error"
            }
        })
    );
    assert!(!response.body.to_string().contains("hunter2"));
}

#[test]
fn test_panicking_operation_becomes_500() {
    let dispatcher = app().start().unwrap();
    let (response, report) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/boom"));
    let response = response.unwrap();
    assert_eq!(response.status, 500);
    assert_eq!(report.error, Some(ErrorKind::Internal));
    assert!(!response.body.to_string().contains("exploded"));

    // the dispatcher keeps serving after a panic
    let (_, report) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/recipes"));
    assert_eq!(report.status, Some(200));
}

#[test]
fn test_aborted_request_writes_nothing() {
    let dispatcher = app().start().unwrap();
    let (response, report) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/abort"));
    assert!(response.is_none());
    assert!(report.aborted);
    assert_eq!(report.status, None);
}

#[test]
fn test_abort_before_dispatch_skips_chain() {
    let dispatcher = app().start().unwrap();
    let writer = ResponseWriter::new();
    let abort = AbortHandle::new();
    abort.abort();
    let report = dispatcher.handle(HttpRequest::new(Method::GET, "/recipes"), &writer, abort);
    assert!(report.aborted);
    assert_eq!(report.error, Some(ErrorKind::RequestAborted));
    assert!(!writer.is_written());
}

#[test]
fn test_unserved_chain_falls_back_to_404() {
    let dispatcher = app().start().unwrap();
    let (response, report) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/unserved"));
    let response = response.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(report.error, None);
    assert_eq!(response.body["error"]["code"], "NOT_FOUND");
}

fn remember_tag(ctx: &mut RequestContext, _: &OperationArgs) -> OpResult {
    let tag = ctx.request().get_header("x-tag").unwrap_or_default().to_string();
    ctx.bind(Binding::new("request.tag").to(tag.clone()));
    thread::sleep(Duration::from_millis(5));
    let seen = ctx.scope().get_named::<String>("request.tag")?;
    Ok(json!({ "sent": tag, "seen": seen.as_str() }).into())
}

#[test]
fn test_concurrent_request_scopes_are_isolated() {
    let mut app = Application::new(AppConfig::default());
    app.route(RouteSpec::handler(Method::GET, "/tag", "tag", remember_tag))
        .unwrap();
    let dispatcher = app.start().unwrap();

    let workers: Vec<_> = (0..16)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                let tag = format!("request-{i}");
                let (response, _) = dispatcher
                    .dispatch(HttpRequest::new(Method::GET, "/tag").with_header("X-Tag", &tag));
                let body = response.unwrap().body;
                assert_eq!(body["sent"], Value::String(tag.clone()));
                assert_eq!(body["seen"], Value::String(tag));
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert!(!dispatcher.scope().is_bound("request.tag"));
}

struct RecipesController {
    store: Arc<Vec<String>>,
}

impl Controller for RecipesController {
    fn invoke(&self, method: &str, _: &mut RequestContext, args: &OperationArgs) -> OpResult {
        match method {
            "find" => {
                let index = args.parse::<usize>("index")?;
                let recipe = self.store.get(index).ok_or_else(|| {
                    DispatchError::not_found(format!("Recipe {index} does not exist"))
                        .with_code("RECIPE_NOT_FOUND")
                })?;
                Ok(json!({ "recipe": recipe }).into())
            }
            other => Err(DispatchError::not_found(format!("No method {other}"))),
        }
    }
}

#[test]
fn test_controller_resolved_with_injected_dependencies() {
    let mut app = Application::new(AppConfig::default());
    app.bind(Binding::new("stores.recipes").to(vec!["soup".to_string(), "bread".to_string()]));
    app.controller(
        "controllers.Recipes",
        "RecipesController",
        vec![Dependency::required("stores.recipes")],
        |injected| {
            Ok(RecipesController {
                store: injected.get::<Vec<String>>(0)?,
            })
        },
    );
    app.route(
        RouteSpec::controller(Method::GET, "/recipes/{index}", "controllers.Recipes", "find")
            .with_parameter(ParameterSpec::path("index").of_type(ParamType::Integer)),
    )
    .unwrap();
    let dispatcher = app.start().unwrap();

    let (response, _) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/recipes/1"));
    assert_eq!(response.unwrap().body, json!({ "recipe": "bread" }));

    let (response, _) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/recipes/9"));
    let response = response.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.body["error"]["code"], "RECIPE_NOT_FOUND");

    let (response, report) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/recipes/abc"));
    assert_eq!(report.error, Some(ErrorKind::Validation));
    assert_eq!(response.unwrap().status, 422);
}

fn read_vault(ctx: &mut RequestContext, _: &OperationArgs) -> OpResult {
    let secret = ctx.scope().get_named::<String>("secrets.vault")?;
    Ok(json!({ "secret": secret.as_str() }).into())
}

#[test]
fn test_missing_binding_hides_key_from_client() {
    let mut app = Application::new(AppConfig::default());
    app.route(RouteSpec::handler(Method::GET, "/vault", "vault", read_vault))
        .unwrap();
    app.route(RouteSpec::controller(
        Method::GET,
        "/ghost",
        "controllers.Ghost",
        "find",
    ))
    .unwrap();
    let dispatcher = app.start().unwrap();

    for (path, key) in [("/vault", "secrets.vault"), ("/ghost", "controllers.Ghost")] {
        let (response, report) = dispatcher.dispatch(HttpRequest::new(Method::GET, path));
        let response = response.unwrap();
        assert_eq!(response.status, 404, "{path}");
        assert_eq!(response.body["error"]["code"], "BINDING_NOT_FOUND");
        assert_eq!(response.body["error"]["message"], "Not Found");
        let body = response.body.to_string();
        assert!(!body.contains(key), "{body}");
        assert!(!body.contains("scope"), "{body}");
        assert_eq!(report.error, Some(ErrorKind::NotFound));
    }
}

#[test]
fn test_authentication_errors_map_to_401_and_403() {
    let mut app = Application::new(AppConfig::default());
    app.route(RouteSpec::handler(Method::GET, "/admin", "admin", ok_operation))
        .unwrap();
    app.route(RouteSpec::handler(Method::GET, "/public/{id}", "public", echo_args))
        .unwrap();
    app.authentication(
        AuthMiddleware::new()
            .with_authenticator(
                ApiKeyAuthenticator::new("x-api-key")
                    .with_key("admin-key", Principal::new("root", &["admin"]))
                    .with_key("user-key", Principal::new("jane", &["user"])),
            )
            .protect("admin", &["admin"]),
    );
    let dispatcher = app.start().unwrap();

    let (response, _) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/admin"));
    assert_eq!(response.unwrap().status, 401);

    let (response, _) = dispatcher
        .dispatch(HttpRequest::new(Method::GET, "/admin").with_header("x-api-key", "user-key"));
    let response = response.unwrap();
    assert_eq!(response.status, 403);
    assert_eq!(response.body["error"]["code"], "FORBIDDEN");

    let (response, _) = dispatcher
        .dispatch(HttpRequest::new(Method::GET, "/admin").with_header("x-api-key", "admin-key"));
    assert_eq!(response.unwrap().status, 200);

    let (response, _) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/public/7"));
    assert_eq!(response.unwrap().body, json!({ "args": { "id": "7" } }));
}

#[test]
fn test_request_id_header_is_reported() {
    let dispatcher = app().start().unwrap();
    let id = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    let (_, report) = dispatcher
        .dispatch(HttpRequest::new(Method::GET, "/recipes").with_header("X-Request-Id", id));
    assert_eq!(report.request_id.to_string(), id);
}
