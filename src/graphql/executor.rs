use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::container::ResolverContainer;
use super::document::{parse_document, project, select_operation, OperationType, Selection};
use super::resolver::{ResolverClass, ResolverData};
use crate::context::RequestContext;
use crate::error::{DispatchError, ErrorKind};
use crate::http::{HandlerResponse, HttpRequest};

/// Decides whether the current caller may resolve a field with the given
/// required roles
pub type AuthCheckerFn = Arc<dyn Fn(&FieldInfo<'_>, &[String]) -> bool + Send + Sync>;

/// Produces the `context` value of [`ResolverData`] for a request
pub type ContextResolverFn =
    Arc<dyn Fn(&RequestContext) -> Result<Value, DispatchError> + Send + Sync>;

/// GraphQL request as sent over HTTP
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQlRequest {
    pub query: String,
    pub operation_name: Option<String>,
    pub variables: Value,
}

impl GraphQlRequest {
    /// Read `query`, `operationName` and `variables` from a JSON POST body or
    /// from GET query parameters
    ///
    /// # Errors
    ///
    /// `Validation` (`GRAPHQL_BAD_REQUEST`) for a missing query or malformed
    /// variables.
    pub fn from_http(req: &HttpRequest) -> Result<Self, DispatchError> {
        let (query, operation_name, variables) = if req.method == http::Method::GET {
            let variables = match req.get_query_param("variables") {
                Some(raw) if !raw.is_empty() => serde_json::from_str(raw)
                    .map_err(|_| bad_request("Variables are invalid JSON."))?,
                _ => Value::Null,
            };
            (
                req.get_query_param("query").map(str::to_string),
                req.get_query_param("operationName").map(str::to_string),
                variables,
            )
        } else {
            let body = req
                .json_body()
                .map_err(|_| bad_request("POST body is not valid JSON."))?;
            let field = |name: &str| body.and_then(|b| b.get(name));
            (
                field("query").and_then(Value::as_str).map(str::to_string),
                field("operationName")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                field("variables").cloned().unwrap_or(Value::Null),
            )
        };

        let query = query
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| bad_request("Must provide query string."))?;
        if !(variables.is_null() || variables.is_object()) {
            return Err(bad_request("Variables must be an object."));
        }
        Ok(Self {
            query,
            operation_name,
            variables,
        })
    }
}

fn bad_request(message: &str) -> DispatchError {
    DispatchError::validation(message).with_code("GRAPHQL_BAD_REQUEST")
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GraphQlError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    pub extensions: Value,
}

impl GraphQlError {
    #[must_use]
    pub fn new(message: impl Into<String>, code: &str) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: json!({ "code": code }),
        }
    }

    /// Field error for `err`; internal errors are masked
    #[must_use]
    pub fn from_dispatch(err: &DispatchError, path: &str) -> Self {
        let payload = err.to_body().error;
        Self {
            message: payload.message,
            path: Some(vec![path.to_string()]),
            extensions: json!({ "code": payload.code }),
        }
    }
}

/// `{ "data": ..., "errors": [...] }`
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GraphQlResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQlError>,
}

impl GraphQlResponse {
    /// Request-level failure: no data, one error
    #[must_use]
    pub fn request_error(error: GraphQlError) -> Self {
        Self {
            data: None,
            errors: vec![error],
        }
    }

    /// 400 when the request failed before execution, 200 otherwise
    #[must_use]
    pub fn status(&self) -> u16 {
        if self.data.is_none() && !self.errors.is_empty() {
            400
        } else {
            200
        }
    }

    #[must_use]
    pub fn into_http(self, status: u16) -> HandlerResponse {
        let body = serde_json::to_value(&self).unwrap_or(Value::Null);
        HandlerResponse::json(status, body)
    }
}

/// Field being resolved, as seen by field middleware and the auth checker
#[derive(Debug, Clone, Copy)]
pub struct FieldInfo<'a> {
    pub class_name: &'a str,
    pub field: &'a str,
    pub operation: OperationType,
    pub args: &'a Value,
    pub data: &'a ResolverData,
}

/// Field-level middleware, run around every root field resolution
pub trait GraphQlFieldMiddleware: Send + Sync {
    fn handle(&self, info: &FieldInfo<'_>, next: FieldNext<'_>) -> Result<Value, DispatchError>;
}

impl<F> GraphQlFieldMiddleware for F
where
    F: Fn(&FieldInfo<'_>, FieldNext<'_>) -> Result<Value, DispatchError> + Send + Sync,
{
    fn handle(&self, info: &FieldInfo<'_>, next: FieldNext<'_>) -> Result<Value, DispatchError> {
        self(info, next)
    }
}

/// Type stored in field middleware bindings
pub type SharedFieldMiddleware = Arc<dyn GraphQlFieldMiddleware>;

/// Continuation of the field middleware stack; the resolver runs last
pub struct FieldNext<'a> {
    middlewares: &'a [SharedFieldMiddleware],
    resolve: &'a dyn Fn() -> Result<Value, DispatchError>,
}

impl FieldNext<'_> {
    pub fn run(self, info: &FieldInfo<'_>) -> Result<Value, DispatchError> {
        match self.middlewares.split_first() {
            Some((middleware, rest)) => middleware.handle(
                info,
                FieldNext {
                    middlewares: rest,
                    resolve: self.resolve,
                },
            ),
            None => (self.resolve)(),
        }
    }
}

/// Everything an executor needs for one request
pub struct ExecutionEnv<'a> {
    pub container: &'a ResolverContainer,
    pub data: &'a Arc<ResolverData>,
    pub middlewares: &'a [SharedFieldMiddleware],
    pub auth_checker: Option<&'a AuthCheckerFn>,
}

/// The schema-execution collaborator
pub trait GraphQlExecutor: Send + Sync {
    fn execute(&self, request: &GraphQlRequest, env: &ExecutionEnv<'_>) -> GraphQlResponse;
}

/// Built-in executor: every root field of the selected operation is
/// resolved by the resolver class that declares it, with its arguments
/// (variables substituted), then projected onto the requested sub-fields.
#[derive(Debug, Clone, Default)]
pub struct RootFieldExecutor {
    classes: Vec<ResolverClass>,
    fields: HashMap<(OperationType, String), usize>,
}

impl RootFieldExecutor {
    #[must_use]
    pub fn new(classes: Vec<ResolverClass>) -> Self {
        let mut fields = HashMap::new();
        for (index, class) in classes.iter().enumerate() {
            for field in class.queries() {
                fields.entry((OperationType::Query, field.clone())).or_insert(index);
            }
            for field in class.mutations() {
                fields.entry((OperationType::Mutation, field.clone())).or_insert(index);
            }
        }
        Self { classes, fields }
    }

    #[must_use]
    pub fn classes(&self) -> &[ResolverClass] {
        &self.classes
    }

    fn resolve_field(
        &self,
        kind: OperationType,
        selection: &Selection,
        variables: &Value,
        env: &ExecutionEnv<'_>,
    ) -> Result<Value, DispatchError> {
        if selection.name == "__typename" {
            return Ok(Value::String(kind.to_string()));
        }
        let class = self
            .fields
            .get(&(kind, selection.name.clone()))
            .and_then(|i| self.classes.get(*i))
            .ok_or_else(|| {
                DispatchError::validation(format!(
                    "Cannot query field \"{}\" on type \"{kind}\".",
                    selection.name
                ))
                .with_code("GRAPHQL_VALIDATION_FAILED")
            })?;

        let args = selection.arguments(variables);
        let info = FieldInfo {
            class_name: class.name(),
            field: &selection.name,
            operation: kind,
            args: &args,
            data: env.data,
        };

        if let Some(roles) = class.roles_for(&selection.name) {
            let allowed = env.auth_checker.map_or(true, |check| check(&info, roles));
            if !allowed {
                warn!(field = %selection.name, class = %class.name(), "GraphQL field access denied");
                return Err(if env.data.user.is_none() {
                    DispatchError::unauthorized(
                        "Access denied! You need to be authorized to perform this action!",
                    )
                } else {
                    DispatchError::forbidden(
                        "Access denied! You don't have permission for this action!",
                    )
                });
            }
        }

        let resolver = env.container.get(class, env.data)?;
        let resolve = || resolver.resolve(&selection.name, &args, env.data);
        let value = FieldNext {
            middlewares: env.middlewares,
            resolve: &resolve,
        }
        .run(&info)?;
        Ok(project(value, &selection.selections))
    }
}

impl GraphQlExecutor for RootFieldExecutor {
    fn execute(&self, request: &GraphQlRequest, env: &ExecutionEnv<'_>) -> GraphQlResponse {
        let operations = match parse_document(&request.query) {
            Ok(ops) => ops,
            Err(message) => {
                return GraphQlResponse::request_error(GraphQlError::new(
                    message,
                    "GRAPHQL_PARSE_FAILED",
                ))
            }
        };
        let operation = match select_operation(&operations, request.operation_name.as_deref()) {
            Ok(op) => op,
            Err(message) => {
                return GraphQlResponse::request_error(GraphQlError::new(
                    message,
                    "GRAPHQL_VALIDATION_FAILED",
                ))
            }
        };

        // unknown fields fail the whole request before anything runs
        for selection in &operation.selections {
            let known = selection.name == "__typename"
                || self
                    .fields
                    .contains_key(&(operation.kind, selection.name.clone()));
            if !known {
                return GraphQlResponse::request_error(GraphQlError::new(
                    format!(
                        "Cannot query field \"{}\" on type \"{}\".",
                        selection.name, operation.kind
                    ),
                    "GRAPHQL_VALIDATION_FAILED",
                ));
            }
        }

        let variables = operation.variables(&request.variables);
        let mut data = Map::new();
        let mut errors = Vec::new();
        for selection in &operation.selections {
            let key = selection.response_key().to_string();
            match self.resolve_field(operation.kind, selection, &variables, env) {
                Ok(value) => {
                    data.insert(key, value);
                }
                Err(err) => {
                    if err.kind() == ErrorKind::Internal {
                        warn!(field = %selection.name, error = %err, "GraphQL resolver failed");
                    } else {
                        debug!(field = %selection.name, code = %err.code(), "GraphQL field error");
                    }
                    errors.push(GraphQlError::from_dispatch(&err, &key));
                    data.insert(key, Value::Null);
                }
            }
        }
        GraphQlResponse {
            data: Some(Value::Object(data)),
            errors,
        }
    }
}
