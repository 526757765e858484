//! Echo operations for serving a route list without real handlers.
//!
//! A routes file is YAML:
//!
//! ```yaml
//! routes:
//!   - method: GET
//!     path: /pets/{id}
//!     name: get_pet
//!   - method: POST
//!     path: /pets
//! ```
//!
//! Every route answers with what it received.

use anyhow::{Context, Result};
use http::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;

use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::operation::{OperationArgs, OperationResult};
use crate::router::RouteSpec;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EchoRoute {
    pub method: String,
    pub path: String,
    /// Operation name; derived from method and path when absent
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EchoRoutes {
    #[serde(default)]
    pub routes: Vec<EchoRoute>,
}

impl EchoRoute {
    #[must_use]
    pub fn operation_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            let slug: String = self
                .path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_start_matches('{').trim_end_matches('}'))
                .collect::<Vec<_>>()
                .join("_");
            format!("{}_{}", self.method.to_ascii_lowercase(), slug)
        })
    }

    /// Route spec answering with [`echo_operation`]
    ///
    /// # Errors
    ///
    /// The method is not a valid HTTP method.
    pub fn to_spec(&self) -> Result<RouteSpec> {
        let method: Method = self
            .method
            .to_ascii_uppercase()
            .parse()
            .with_context(|| format!("Invalid method '{}' for {}", self.method, self.path))?;
        Ok(RouteSpec::handler(
            method,
            self.path.as_str(),
            &self.operation_name(),
            echo_operation,
        ))
    }
}

impl EchoRoutes {
    /// Parse YAML text
    ///
    /// # Errors
    ///
    /// Malformed YAML.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Failed to parse routes file")
    }

    /// # Errors
    ///
    /// The file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read routes file {}", path.display()))?;
        Self::from_yaml_str(&text)
    }
}

/// Answers with the operation name, method, path, parsed arguments, query
/// and JSON body of the request
pub fn echo_operation(
    ctx: &mut RequestContext,
    args: &OperationArgs,
) -> Result<OperationResult, DispatchError> {
    let operation = ctx
        .matched_route()
        .map(|m| m.spec.operation_name())
        .unwrap_or_default();
    let request = ctx.request();
    let query: Map<String, Value> = request
        .query_params
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
        .collect();
    let body = request.json_body()?.cloned().unwrap_or(Value::Null);

    Ok(json!({
        "operation": operation,
        "method": request.method.to_string(),
        "path": request.path,
        "params": args.to_value(),
        "query": query,
        "body": body,
    })
    .into())
}
