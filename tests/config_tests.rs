//! Configuration loading and its effect on the assembled application

use brrtcore::application::Application;
use brrtcore::config::AppConfig;
use brrtcore::http::HttpRequest;
use brrtcore::router::RouteSpec;
use http::Method;

mod common;
use common::fixtures::ok_operation;
use common::temp_files::config_file;

const FULL_CONFIG: &str = r#"
http:
  addr: 0.0.0.0:9090
  stack_size: "0x10000"
  max_body_bytes: 2048
base_path: /api/v1
cors:
  enabled: true
  allowed_origins: ["https://example.com"]
  allowed_methods: [GET, POST]
  max_age: 120
graphql:
  enabled: true
  path: /gql
chain:
  groups: [send-response, cors, middleware, find-route, authentication, parse-params, invoke-operation]
"#;

#[test]
fn test_load_full_config_from_file() {
    let file = config_file(FULL_CONFIG);
    let config = AppConfig::load(file.path()).unwrap();

    assert_eq!(config.http.stack_size, 0x10000);
    assert_eq!(config.http.max_body_bytes, 2048);
    assert_eq!(config.base_path.as_deref(), Some("/api/v1"));
    assert!(config.cors.enabled);
    assert_eq!(config.cors.allowed_methods, vec!["GET", "POST"]);
    assert_eq!(config.cors.max_age, Some(120));
    assert!(config.graphql.enabled);
    assert_eq!(config.graphql.path, "/gql");
    assert_eq!(config.chain.groups.as_ref().map(Vec::len), Some(7));
}

#[test]
fn test_missing_sections_take_defaults() {
    let file = config_file("base_path: /svc\n");
    let config = AppConfig::load(file.path()).unwrap();

    let defaults = AppConfig::default();
    assert_eq!(config.http.max_body_bytes, defaults.http.max_body_bytes);
    assert_eq!(config.cors, defaults.cors);
    assert_eq!(config.graphql, defaults.graphql);
    assert!(config.chain.groups.is_none());
}

#[test]
fn test_missing_file_is_an_error() {
    let err = AppConfig::load("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_malformed_yaml_is_an_error() {
    let file = config_file("http: [not, a, map\n");
    assert!(AppConfig::load(file.path()).is_err());
}

#[test]
fn test_loaded_config_drives_the_application() {
    let file = config_file(FULL_CONFIG);
    let config = AppConfig::load(file.path()).unwrap();

    let mut app = Application::new(config);
    app.route(RouteSpec::handler(Method::GET, "/status", "status", ok_operation))
        .unwrap();
    let dispatcher = app.start().unwrap();
    assert_eq!(
        dispatcher.chain().entry_names(),
        vec![
            "send-response",
            "cors",
            "tracing",
            "metrics",
            "find-route",
            "parse-params",
            "invoke-operation"
        ]
    );

    let (response, _) = dispatcher.dispatch(HttpRequest::new(Method::GET, "/api/v1/status"));
    assert_eq!(response.unwrap().status, 200);

    // PUT is outside the configured CORS methods
    let request = HttpRequest::new(Method::OPTIONS, "/api/v1/status")
        .with_header("Origin", "https://example.com")
        .with_header("Access-Control-Request-Method", "PUT");
    let (response, _) = dispatcher.dispatch(request);
    assert_eq!(response.unwrap().status, 403);
}

#[test]
fn test_chain_override_without_required_groups_fails() {
    let config = AppConfig::from_yaml_str("chain:\n  groups: [middleware]\n").unwrap();
    let mut app = Application::new(config);
    app.route(RouteSpec::handler(Method::GET, "/status", "status", ok_operation))
        .unwrap();
    let err = app.start().unwrap_err();
    assert!(format!("{err:#}").contains("Failed to build middleware chain"));
}
