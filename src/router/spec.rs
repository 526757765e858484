use http::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::operation::Operation;

/// Where a declared parameter is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSource {
    Path,
    Query,
    Header,
    /// The JSON request body; the parameter name is only used for reporting
    Body,
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamSource::Path => "path",
            ParamSource::Query => "query",
            ParamSource::Header => "header",
            ParamSource::Body => "body",
        };
        f.write_str(s)
    }
}

/// Declared type of a parameter, used for coercion of raw string values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    /// Any JSON value; raw strings are parsed as JSON
    Json,
}

impl ParamType {
    /// Coerce a raw string value into JSON
    ///
    /// # Errors
    ///
    /// Returns a short description of the expected type when `raw` does not
    /// parse.
    pub fn coerce(self, raw: &str) -> Result<Value, String> {
        match self {
            ParamType::String => Ok(Value::String(raw.to_string())),
            ParamType::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| "expected integer".to_string()),
            ParamType::Number => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| "expected number".to_string()),
            ParamType::Boolean => match raw {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err("expected boolean".to_string()),
            },
            ParamType::Json => serde_json::from_str(raw).map_err(|e| e.to_string()),
        }
    }

    /// Check that an already-structured JSON value has this type
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Json => true,
        }
    }
}

/// Declared operation parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub source: ParamSource,
    pub param_type: ParamType,
    pub required: bool,
}

impl ParameterSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, source: ParamSource) -> Self {
        Self {
            name: name.into(),
            source,
            param_type: ParamType::String,
            // path parameters are always present once the route matched
            required: source == ParamSource::Path,
        }
    }

    #[must_use]
    pub fn path(name: impl Into<String>) -> Self {
        Self::new(name, ParamSource::Path)
    }

    #[must_use]
    pub fn query(name: impl Into<String>) -> Self {
        Self::new(name, ParamSource::Query)
    }

    #[must_use]
    pub fn header(name: impl Into<String>) -> Self {
        Self::new(name, ParamSource::Header)
    }

    #[must_use]
    pub fn body(name: impl Into<String>) -> Self {
        Self::new(name, ParamSource::Body).of_type(ParamType::Json)
    }

    #[must_use]
    pub fn of_type(mut self, param_type: ParamType) -> Self {
        self.param_type = param_type;
        self
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// What a matched route executes
#[derive(Clone)]
pub enum OperationRef {
    /// A plain handler function registered under a name
    Handler {
        name: String,
        operation: Arc<dyn Operation>,
    },
    /// A method on a controller resolved from the request scope
    Controller { key: String, method: String },
    /// Served by a middleware entry in the invoke-operation group that
    /// recognises `name`; the default invoker passes these through
    Mounted { name: String },
}

impl OperationRef {
    /// Display name, `handler` or `Controller.method`
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            OperationRef::Handler { name, .. } | OperationRef::Mounted { name } => name.clone(),
            OperationRef::Controller { key, method } => {
                let class = key.rsplit('.').next().unwrap_or(key);
                format!("{class}.{method}")
            }
        }
    }
}

impl fmt::Debug for OperationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationRef::Handler { name, .. } => f.debug_tuple("Handler").field(name).finish(),
            OperationRef::Controller { key, method } => f
                .debug_struct("Controller")
                .field("key", key)
                .field("method", method)
                .finish(),
            OperationRef::Mounted { name } => f.debug_tuple("Mounted").field(name).finish(),
        }
    }
}

/// A registered route: method, path pattern, operation, declared parameters
#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub method: Method,
    /// Pattern such as `/recipes/{id}`
    pub path_pattern: String,
    pub operation: OperationRef,
    pub parameters: Vec<ParameterSpec>,
}

impl RouteSpec {
    #[must_use]
    pub fn new(method: Method, path_pattern: impl Into<String>, operation: OperationRef) -> Self {
        Self {
            method,
            path_pattern: path_pattern.into(),
            operation,
            parameters: Vec::new(),
        }
    }

    /// Route backed by a handler function or closure
    #[must_use]
    pub fn handler<O>(method: Method, path_pattern: impl Into<String>, name: &str, op: O) -> Self
    where
        O: Operation + 'static,
    {
        Self::new(
            method,
            path_pattern,
            OperationRef::Handler {
                name: name.to_string(),
                operation: Arc::new(op),
            },
        )
    }

    /// Route backed by `method_name` on the controller bound at `controller_key`
    #[must_use]
    pub fn controller(
        method: Method,
        path_pattern: impl Into<String>,
        controller_key: &str,
        method_name: &str,
    ) -> Self {
        Self::new(
            method,
            path_pattern,
            OperationRef::Controller {
                key: controller_key.to_string(),
                method: method_name.to_string(),
            },
        )
    }

    /// Route served by the invoke-operation entry registered under `name`
    #[must_use]
    pub fn mounted(method: Method, path_pattern: impl Into<String>, name: &str) -> Self {
        Self::new(
            method,
            path_pattern,
            OperationRef::Mounted {
                name: name.to_string(),
            },
        )
    }

    #[must_use]
    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn operation_name(&self) -> String {
        self.operation.name()
    }
}
