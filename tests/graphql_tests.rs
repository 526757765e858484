//! Integration tests for the GraphQL bridge
//!
//! The endpoint is mounted on an [`Application`] and exercised through the
//! dispatcher, so every request passes the full REST chain.

use brrtcore::application::Application;
use brrtcore::config::AppConfig;
use brrtcore::context::RequestContext;
use brrtcore::dispatcher::Dispatcher;
use brrtcore::error::DispatchError;
use brrtcore::graphql::{
    FieldInfo, FieldNext, GraphQlFieldMiddleware, GraphQlServer, Resolver, ResolverClass,
    ResolverData,
};
use brrtcore::http::{HandlerResponse, HttpRequest};
use brrtcore::keys;
use brrtcore::middleware::{groups, ChainResult, Middleware, MiddlewareEntry, Next, Principal};
use brrtcore::registry::{Binding, Dependency};
use brrtcore::router::RouteSpec;
use http::Method;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

mod common;
use common::fixtures::ok_operation;

/// Store bound only in the application scope
struct RecipeStore {
    recipes: HashMap<String, Value>,
}

impl RecipeStore {
    fn seeded() -> Self {
        let mut recipes = HashMap::new();
        recipes.insert(
            "1".to_string(),
            json!({ "id": "1", "title": "Tomato soup", "ingredients": ["tomato", "salt"] }),
        );
        recipes.insert(
            "2".to_string(),
            json!({ "id": "2", "title": "Bread", "ingredients": ["flour", "water"] }),
        );
        Self { recipes }
    }
}

struct RecipeResolver {
    store: Arc<RecipeStore>,
}

impl Resolver for RecipeResolver {
    fn resolve(&self, field: &str, args: &Value, data: &ResolverData) -> Result<Value, DispatchError> {
        match field {
            "recipe" => {
                let id = args["id"].as_str().unwrap_or_default();
                Ok(self.store.recipes.get(id).cloned().unwrap_or(Value::Null))
            }
            "recipes" => {
                let mut all: Vec<Value> = self.store.recipes.values().cloned().collect();
                all.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));
                Ok(Value::Array(all))
            }
            "addRecipe" => Ok(json!({ "id": "3", "title": args["title"] })),
            "whoami" => Ok(json!(data.user.as_ref().map(|u| u.id.clone()))),
            "context" => Ok(data.context.clone()),
            "broken" => Err(DispatchError::internal("store connection string leaked")),
            other => Err(DispatchError::not_found(format!("No field {other}"))),
        }
    }
}

fn recipe_class() -> ResolverClass {
    ResolverClass::new("RecipeResolver", |inj| {
        Ok(RecipeResolver {
            store: inj.get::<RecipeStore>(0)?,
        })
    })
    .inject(Dependency::required("stores.recipes"))
    .query("recipe")
    .query("recipes")
    .query("whoami")
    .query("context")
    .query("broken")
    .mutation("addRecipe")
    .authorized("addRecipe", &["chef"])
}

/// Binds the caller named in `x-user` (roles from `x-roles`) without
/// rejecting anonymous requests
struct OptionalUser;

impl Middleware for OptionalUser {
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult {
        if let Some(id) = ctx.request().get_header("x-user").map(str::to_string) {
            let roles: Vec<String> = ctx
                .request()
                .get_header("x-roles")
                .unwrap_or_default()
                .split(',')
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
            let roles: Vec<&str> = roles.iter().map(String::as_str).collect();
            ctx.bind(Binding::constant(&keys::CURRENT_USER, Principal::new(&id, &roles)));
        }
        next.run(ctx)
    }
}

fn app_with(server: GraphQlServer) -> Dispatcher {
    let mut app = Application::new(AppConfig::default());
    app.bind(Binding::new("stores.recipes").to(RecipeStore::seeded()));
    app.route(RouteSpec::handler(Method::GET, "/health/live", "live", ok_operation))
        .unwrap();
    app.middleware(MiddlewareEntry::new("optional-user", groups::AUTHENTICATION, OptionalUser));
    app.mount_graphql(&server).unwrap();
    app.start().unwrap()
}

fn dispatcher() -> Dispatcher {
    app_with(
        GraphQlServer::new()
            .resolver(recipe_class())
            .auth_checker(|info, roles| {
                info.data
                    .user
                    .as_ref()
                    .is_some_and(|u| roles.iter().any(|r| u.has_role(r)))
            }),
    )
}

fn post(query: &str, variables: Value) -> HttpRequest {
    HttpRequest::new(Method::POST, "/graphql")
        .with_json(&json!({ "query": query, "variables": variables }))
}

fn run(dispatcher: &Dispatcher, request: HttpRequest) -> HandlerResponse {
    let (response, _) = dispatcher.dispatch(request);
    response.unwrap()
}

#[test]
fn test_resolver_dependency_from_application_scope() {
    let dispatcher = dispatcher();
    let response = run(&dispatcher, post(r#"{ recipe(id: "1") { title } }"#, Value::Null));
    assert_eq!(response.status, 200);
    assert_eq!(
        response.body,
        json!({ "data": { "recipe": { "title": "Tomato soup" } } })
    );
    // the class binding lives in the application scope only
    assert!(dispatcher.scope().is_bound("resolvers.RecipeResolver"));
}

#[test]
fn test_variables_aliases_and_nested_selection() {
    let dispatcher = dispatcher();
    let query = r#"
        query Two($first: ID!, $second: ID!) {
            soup: recipe(id: $first) { title }
            bread: recipe(id: $second) { id ingredients }
        }
    "#;
    let response = run(&dispatcher, post(query, json!({ "first": "1", "second": "2" })));
    assert_eq!(
        response.body["data"],
        json!({
            "soup": { "title": "Tomato soup" },
            "bread": { "id": "2", "ingredients": ["flour", "water"] }
        })
    );
}

#[test]
fn test_list_results_are_projected() {
    let dispatcher = dispatcher();
    let response = run(&dispatcher, post("{ recipes { title } }", Value::Null));
    assert_eq!(
        response.body["data"]["recipes"],
        json!([{ "title": "Tomato soup" }, { "title": "Bread" }])
    );
}

#[test]
fn test_unbound_schema_resolver_uses_throwaway_scope() {
    let dispatcher = app_with(GraphQlServer::new().schema_resolver(recipe_class()));
    assert!(!dispatcher.scope().is_bound("resolvers.RecipeResolver"));

    let response = run(&dispatcher, post(r#"{ recipe(id: "2") { title } }"#, Value::Null));
    assert_eq!(response.body["data"]["recipe"]["title"], "Bread");
    assert!(!dispatcher.scope().is_bound("resolvers.RecipeResolver"));
}

#[test]
fn test_principal_from_authentication_group_reaches_resolver() {
    let dispatcher = dispatcher();
    let anonymous = run(&dispatcher, post("{ whoami }", Value::Null));
    assert_eq!(anonymous.body["data"]["whoami"], Value::Null);

    let request = post("{ whoami }", Value::Null).with_header("x-user", "jane");
    let response = run(&dispatcher, request);
    assert_eq!(response.body["data"]["whoami"], "jane");
}

#[test]
fn test_auth_checker_denies_field() {
    let dispatcher = dispatcher();
    let mutation = r#"mutation { addRecipe(title: "Pie") { id title } }"#;

    let response = run(&dispatcher, post(mutation, Value::Null));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["data"]["addRecipe"], Value::Null);
    assert_eq!(response.body["errors"][0]["extensions"]["code"], "UNAUTHORIZED");
    assert_eq!(response.body["errors"][0]["path"], json!(["addRecipe"]));

    let request = post(mutation, Value::Null)
        .with_header("x-user", "jane")
        .with_header("x-roles", "waiter");
    let response = run(&dispatcher, request);
    assert_eq!(response.body["errors"][0]["extensions"]["code"], "FORBIDDEN");

    let request = post(mutation, Value::Null)
        .with_header("x-user", "gordon")
        .with_header("x-roles", "chef");
    let response = run(&dispatcher, request);
    assert!(response.body.get("errors").is_none());
    assert_eq!(
        response.body["data"]["addRecipe"],
        json!({ "id": "3", "title": "Pie" })
    );
}

/// Records each field and upper-cases string results
struct Shout {
    seen: Arc<Mutex<Vec<String>>>,
}

impl GraphQlFieldMiddleware for Shout {
    fn handle(&self, info: &FieldInfo<'_>, next: FieldNext<'_>) -> Result<Value, DispatchError> {
        self.seen
            .lock()
            .push(format!("{}.{}", info.class_name, info.field));
        let value = next.run(info)?;
        Ok(match value {
            Value::Object(mut map) => {
                if let Some(Value::String(title)) = map.get("title") {
                    let title = title.to_uppercase();
                    map.insert("title".to_string(), Value::String(title));
                }
                Value::Object(map)
            }
            other => other,
        })
    }
}

#[test]
fn test_field_middleware_wraps_resolution() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = app_with(GraphQlServer::new().resolver(recipe_class()).middleware(Shout {
        seen: Arc::clone(&seen),
    }));

    let response = run(&dispatcher, post(r#"{ recipe(id: "1") { title } }"#, Value::Null));
    assert_eq!(response.body["data"]["recipe"]["title"], "TOMATO SOUP");
    assert_eq!(*seen.lock(), vec!["RecipeResolver.recipe"]);
}

#[test]
fn test_context_resolver_value_is_shared_with_resolvers() {
    let dispatcher = app_with(
        GraphQlServer::new()
            .resolver(recipe_class())
            .context_resolver(|ctx| {
                Ok(json!({ "path": ctx.request().path, "tenant": "acme" }))
            }),
    );
    let response = run(&dispatcher, post("{ context }", Value::Null));
    assert_eq!(
        response.body["data"]["context"],
        json!({ "path": "/graphql", "tenant": "acme" })
    );
}

#[test]
fn test_get_query_is_served() {
    let dispatcher = dispatcher();
    let uri = format!(
        "/graphql?query={}",
        urlencoding::encode(r#"{ recipe(id: "2") { title } }"#)
    );
    let response = run(&dispatcher, HttpRequest::new(Method::GET, &uri));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["data"]["recipe"]["title"], "Bread");
}

#[test]
fn test_get_mutation_is_rejected_with_allow_header() {
    let dispatcher = dispatcher();
    let uri = format!(
        "/graphql?query={}",
        urlencoding::encode(r#"mutation { addRecipe(title: "Pie") { id } }"#)
    );
    let response = run(&dispatcher, HttpRequest::new(Method::GET, &uri));
    assert_eq!(response.status, 405);
    assert_eq!(response.get_header("allow"), Some("POST"));
    assert_eq!(response.body["errors"][0]["extensions"]["code"], "METHOD_NOT_ALLOWED");
}

#[test]
fn test_missing_query_is_bad_request() {
    let dispatcher = dispatcher();
    let request = HttpRequest::new(Method::POST, "/graphql").with_json(&json!({ "variables": {} }));
    let response = run(&dispatcher, request);
    assert_eq!(response.status, 400);
    assert_eq!(response.body["errors"][0]["message"], "Must provide query string.");
    assert_eq!(response.body["errors"][0]["extensions"]["code"], "GRAPHQL_BAD_REQUEST");
}

#[test]
fn test_unknown_field_fails_validation() {
    let dispatcher = dispatcher();
    let response = run(&dispatcher, post("{ chefs { name } }", Value::Null));
    assert_eq!(response.status, 400);
    assert!(response.body.get("data").is_none());
    assert_eq!(
        response.body["errors"][0]["extensions"]["code"],
        "GRAPHQL_VALIDATION_FAILED"
    );
}

#[test]
fn test_resolver_internal_error_is_masked() {
    let dispatcher = dispatcher();
    let response = run(&dispatcher, post(r#"{ broken recipe(id: "1") { id } }"#, Value::Null));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["data"]["broken"], Value::Null);
    assert_eq!(response.body["data"]["recipe"], json!({ "id": "1" }));
    assert_eq!(response.body["errors"][0]["message"], "Internal Server Error");
    assert!(!response.body.to_string().contains("connection string"));
}

#[test]
fn test_rest_routes_share_the_chain() {
    let dispatcher = dispatcher();
    let response = run(&dispatcher, HttpRequest::new(Method::GET, "/health/live"));
    assert_eq!(response.body, json!({ "ok": true }));

    let response = run(&dispatcher, HttpRequest::new(Method::PUT, "/graphql"));
    assert_eq!(response.status, 405);
}

#[test]
fn test_custom_path_and_disabled_endpoint() {
    let mut config = AppConfig::default();
    config.graphql.path = "/api/graph/".to_string();
    let mut app = Application::new(config);
    app.bind(Binding::new("stores.recipes").to(RecipeStore::seeded()));
    app.mount_graphql(&GraphQlServer::new().resolver(recipe_class()))
        .unwrap();
    let dispatcher = app.start().unwrap();
    let request = HttpRequest::new(Method::POST, "/api/graph")
        .with_json(&json!({ "query": "{ recipes { id } }" }));
    let response = run(&dispatcher, request);
    assert_eq!(response.body["data"]["recipes"], json!([{ "id": "1" }, { "id": "2" }]));

    let mut config = AppConfig::default();
    config.graphql.enabled = false;
    let mut app = Application::new(config);
    app.mount_graphql(&GraphQlServer::new().resolver(recipe_class()))
        .unwrap();
    let dispatcher = app.start().unwrap();
    assert!(!dispatcher.scope().is_bound("resolvers.RecipeResolver"));
    let response = run(&dispatcher, post("{ recipes { id } }", Value::Null));
    assert_eq!(response.status, 404);
}

#[test]
fn test_deeply_nested_query_is_rejected() {
    let dispatcher = dispatcher();
    let depth = 10_000;
    let query = format!("{}{}", "{a".repeat(depth), "}".repeat(depth));
    let response = run(&dispatcher, post(&query, Value::Null));
    assert_eq!(response.status, 400);
    assert!(response.body.get("data").is_none());
    assert_eq!(response.body["errors"][0]["extensions"]["code"], "GRAPHQL_PARSE_FAILED");

    // the endpoint keeps serving afterwards
    let response = run(&dispatcher, post("{ recipes { id } }", Value::Null));
    assert_eq!(response.status, 200);
}

#[test]
fn test_variable_default_applies_when_omitted() {
    let dispatcher = dispatcher();
    let query = r#"query One($id: ID = "2") { recipe(id: $id) { title } }"#;
    let response = run(&dispatcher, post(query, Value::Null));
    assert_eq!(response.body["data"]["recipe"]["title"], "Bread");

    let response = run(&dispatcher, post(query, json!({ "id": "1" })));
    assert_eq!(response.body["data"]["recipe"]["title"], "Tomato soup");
}

#[test]
fn test_conflicting_mount_leaves_application_untouched() {
    let mut app = Application::new(AppConfig::default());
    app.bind(Binding::new("stores.recipes").to(RecipeStore::seeded()));
    app.route(RouteSpec::handler(Method::GET, "/graphql", "playground", ok_operation))
        .unwrap();

    let err = app
        .mount_graphql(&GraphQlServer::new().resolver(recipe_class()))
        .unwrap_err();
    assert_eq!(err.code(), "ROUTE_CONFLICT");

    let dispatcher = app.start().unwrap();
    assert!(!dispatcher.scope().is_bound("resolvers.RecipeResolver"));
    assert!(!dispatcher.chain().entry_names().contains(&"graphql"));
    assert_eq!(dispatcher.routes().len(), 1);

    // the user route still answers and no POST route was added
    let response = run(&dispatcher, HttpRequest::new(Method::GET, "/graphql"));
    assert_eq!(response.body, json!({ "ok": true }));
    let response = run(&dispatcher, post("{ recipes { id } }", Value::Null));
    assert_eq!(response.status, 405);
}
