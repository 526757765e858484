//! Invocable operations.
//!
//! A REST handler, a controller method, and a GraphQL root field are all
//! "operations": they take the request context plus the arguments parsed for
//! them and return a result or a [`DispatchError`]. The invoke-operation entry
//! does not care which kind it runs.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::http::HandlerResponse;
use crate::registry::{Binding, Dependency, Injected};

/// Value returned by an operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    /// Serialized as a 200 JSON body
    Value(Value),
    /// Sent as-is
    Response(HandlerResponse),
    /// 204 No Content
    Empty,
}

impl OperationResult {
    #[must_use]
    pub fn into_response(self) -> HandlerResponse {
        match self {
            OperationResult::Value(value) => HandlerResponse::ok(value),
            OperationResult::Response(response) => response,
            OperationResult::Empty => HandlerResponse::no_content(),
        }
    }
}

impl From<Value> for OperationResult {
    fn from(value: Value) -> Self {
        OperationResult::Value(value)
    }
}

impl From<HandlerResponse> for OperationResult {
    fn from(response: HandlerResponse) -> Self {
        OperationResult::Response(response)
    }
}

/// Arguments for one invocation, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationArgs {
    values: Vec<(String, Value)>,
}

impl OperationArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; non-objects produce no arguments
    #[must_use]
    pub fn from_object(value: &Value) -> Self {
        let values = value
            .as_object()
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Self { values }
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.values.push((name.into(), value));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Positional access
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.values.get(index).map(|(_, v)| v)
    }

    /// Deserialize argument `name` into `T`.
    ///
    /// # Errors
    ///
    /// A validation error if the argument is missing or has the wrong shape.
    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<T, DispatchError> {
        let value = self.get(name).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            DispatchError::validation(format!("Invalid argument '{name}'"))
                .with_details(Value::String(e.to_string()))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All arguments as a JSON object
    #[must_use]
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self.values.iter().cloned().collect();
        Value::Object(map)
    }
}

/// Something the invoke-operation entry can run
pub trait Operation: Send + Sync {
    fn invoke(
        &self,
        ctx: &mut RequestContext,
        args: &OperationArgs,
    ) -> Result<OperationResult, DispatchError>;
}

impl<F> Operation for F
where
    F: Fn(&mut RequestContext, &OperationArgs) -> Result<OperationResult, DispatchError>
        + Send
        + Sync,
{
    fn invoke(
        &self,
        ctx: &mut RequestContext,
        args: &OperationArgs,
    ) -> Result<OperationResult, DispatchError> {
        self(ctx, args)
    }
}

/// A controller exposes several operations by method name
pub trait Controller: Send + Sync {
    /// Run `method`; unknown methods should return a not-found error
    fn invoke(
        &self,
        method: &str,
        ctx: &mut RequestContext,
        args: &OperationArgs,
    ) -> Result<OperationResult, DispatchError>;
}

/// Type stored in controller bindings
pub type SharedController = Arc<dyn Controller>;

/// Binding for a controller class constructed with injected dependencies.
///
/// The binding is transient, so every request gets its own instance built
/// against the request scope.
pub fn controller_binding<C, F>(
    key: &str,
    class_name: &str,
    dependencies: Vec<Dependency>,
    construct: F,
) -> Binding
where
    C: Controller + 'static,
    F: Fn(&Injected) -> Result<C, DispatchError> + Send + Sync + 'static,
{
    Binding::new(key)
        .to_class(class_name, dependencies, move |injected| {
            construct(injected).map(|c| Arc::new(c) as SharedController)
        })
        .tag("controller")
}
