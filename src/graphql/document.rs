//! Executable GraphQL documents reduced to what the built-in executor
//! understands: named or anonymous `query`/`mutation` operations, variable
//! defaults, aliases, arguments and nested selection sets. Fragments,
//! directives and subscriptions are rejected.
//!
//! Parsing is done by `async-graphql-parser`; nesting depth is checked
//! first so a hostile document cannot exhaust a coroutine stack.

use async_graphql_parser::types::{
    DocumentOperations, Field, OperationDefinition, OperationType as GqlOperationType,
    Selection as GqlSelection, SelectionSet,
};
use async_graphql_parser::{parse_query, Positioned};
use async_graphql_value::Value as GqlValue;
use serde_json::{Map, Value};
use std::fmt;

/// Deepest bracket nesting (`{`, `[`, `(`) accepted in a document
pub const MAX_NESTING_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Query,
    Mutation,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Query => f.write_str("Query"),
            OperationType::Mutation => f.write_str("Mutation"),
        }
    }
}

/// Argument value as written in the document
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Variable(String),
    Literal(Value),
    List(Vec<ArgValue>),
    Object(Vec<(String, ArgValue)>),
}

impl ArgValue {
    /// Substitute variables; an undefined variable becomes `null`
    #[must_use]
    pub fn resolve(&self, variables: &Value) -> Value {
        match self {
            ArgValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
            ArgValue::Literal(value) => value.clone(),
            ArgValue::List(items) => Value::Array(items.iter().map(|v| v.resolve(variables)).collect()),
            ArgValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.resolve(variables)))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, ArgValue)>,
    pub selections: Vec<Selection>,
}

impl Selection {
    /// Key of this field in the response object
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Arguments as a JSON object with variables substituted
    #[must_use]
    pub fn arguments(&self, variables: &Value) -> Value {
        let map: Map<String, Value> = self
            .arguments
            .iter()
            .map(|(k, v)| (k.clone(), v.resolve(variables)))
            .collect();
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationType,
    pub name: Option<String>,
    /// Default values declared on variable definitions
    pub variable_defaults: Map<String, Value>,
    pub selections: Vec<Selection>,
}

impl Operation {
    /// Request variables with declared defaults filled in
    #[must_use]
    pub fn variables(&self, provided: &Value) -> Value {
        let mut merged = self.variable_defaults.clone();
        if let Value::Object(provided) = provided {
            for (name, value) in provided {
                merged.insert(name.clone(), value.clone());
            }
        }
        Value::Object(merged)
    }
}

/// Parse every operation in `source`
///
/// # Errors
///
/// A syntax error, nesting deeper than [`MAX_NESTING_DEPTH`] or an
/// unsupported construct.
pub fn parse_document(source: &str) -> Result<Vec<Operation>, String> {
    check_nesting(source)?;
    let document = parse_query(source).map_err(|err| format!("Syntax Error: {err}"))?;
    if let Some(fragment) = document.fragments.values().next() {
        return Err(unsupported("Fragments", fragment.pos));
    }
    match document.operations {
        DocumentOperations::Single(operation) => Ok(vec![convert_operation(None, operation)?]),
        DocumentOperations::Multiple(operations) => operations
            .into_iter()
            .map(|(name, operation)| convert_operation(Some(name.to_string()), operation))
            .collect(),
    }
}

fn unsupported(what: &str, pos: async_graphql_parser::Pos) -> String {
    format!("{what} are not supported (at {pos})")
}

/// Iterative scan of bracket depth, skipping strings and comments
fn check_nesting(source: &str) -> Result<(), String> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'"' if bytes[i..].starts_with(b"\"\"\"") => {
                i += 3;
                while i < bytes.len() && !bytes[i..].starts_with(b"\"\"\"") {
                    i += if bytes[i..].starts_with(b"\\\"\"\"") { 4 } else { 1 };
                }
                i += 2;
            }
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' && bytes[i] != b'\n' {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
            }
            b'{' | b'[' | b'(' => {
                depth += 1;
                if depth > MAX_NESTING_DEPTH {
                    return Err(format!(
                        "Query nesting exceeds the maximum depth of {MAX_NESTING_DEPTH}."
                    ));
                }
            }
            b'}' | b']' | b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

fn convert_operation(
    name: Option<String>,
    operation: Positioned<OperationDefinition>,
) -> Result<Operation, String> {
    let pos = operation.pos;
    let definition = operation.node;
    let kind = match definition.ty {
        GqlOperationType::Query => OperationType::Query,
        GqlOperationType::Mutation => OperationType::Mutation,
        GqlOperationType::Subscription => return Err(unsupported("Subscriptions", pos)),
    };
    if !definition.directives.is_empty() {
        return Err(unsupported("Directives", pos));
    }
    let mut variable_defaults = Map::new();
    for variable in definition.variable_definitions {
        let variable = variable.node;
        if let Some(default) = variable.default_value {
            let value = default
                .node
                .into_json()
                .map_err(|err| format!("Invalid default for ${}: {err}", variable.name.node))?;
            variable_defaults.insert(variable.name.node.to_string(), value);
        }
    }
    Ok(Operation {
        kind,
        name,
        variable_defaults,
        selections: convert_selection_set(definition.selection_set.node)?,
    })
}

fn convert_selection_set(set: SelectionSet) -> Result<Vec<Selection>, String> {
    set.items
        .into_iter()
        .map(|item| match item.node {
            GqlSelection::Field(field) => convert_field(field),
            GqlSelection::FragmentSpread(_) | GqlSelection::InlineFragment(_) => {
                Err(unsupported("Fragments", item.pos))
            }
        })
        .collect()
}

fn convert_field(field: Positioned<Field>) -> Result<Selection, String> {
    let pos = field.pos;
    let field = field.node;
    if !field.directives.is_empty() {
        return Err(unsupported("Directives", pos));
    }
    Ok(Selection {
        alias: field.alias.map(|alias| alias.node.to_string()),
        name: field.name.node.to_string(),
        arguments: field
            .arguments
            .into_iter()
            .map(|(name, value)| (name.node.to_string(), convert_value(value.node)))
            .collect(),
        selections: convert_selection_set(field.selection_set.node)?,
    })
}

fn convert_value(value: GqlValue) -> ArgValue {
    match value {
        GqlValue::Variable(name) => ArgValue::Variable(name.to_string()),
        GqlValue::Number(number) => ArgValue::Literal(Value::Number(number)),
        GqlValue::String(text) => ArgValue::Literal(Value::String(text)),
        GqlValue::Boolean(flag) => ArgValue::Literal(Value::Bool(flag)),
        // enum values travel as strings
        GqlValue::Enum(name) => ArgValue::Literal(Value::String(name.to_string())),
        GqlValue::List(items) => ArgValue::List(items.into_iter().map(convert_value).collect()),
        GqlValue::Object(fields) => ArgValue::Object(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), convert_value(value)))
                .collect(),
        ),
        _ => ArgValue::Literal(Value::Null),
    }
}

/// Pick the operation to run
///
/// # Errors
///
/// Several operations without a name to choose, or an unknown name.
pub fn select_operation<'a>(
    operations: &'a [Operation],
    name: Option<&str>,
) -> Result<&'a Operation, String> {
    match name {
        Some(name) => operations
            .iter()
            .find(|op| op.name.as_deref() == Some(name))
            .ok_or_else(|| format!("Unknown operation named \"{name}\".")),
        None if operations.len() == 1 => Ok(&operations[0]),
        None => Err("Must provide operation name if query contains multiple operations.".to_string()),
    }
}

/// Keep only the selected fields of `value`, recursively
#[must_use]
pub fn project(value: Value, selections: &[Selection]) -> Value {
    if selections.is_empty() {
        return value;
    }
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(|v| project(v, selections)).collect()),
        Value::Object(mut map) => {
            let mut out = Map::with_capacity(selections.len());
            for selection in selections {
                let field = map
                    .remove(&selection.name)
                    .map_or(Value::Null, |v| project(v, &selection.selections));
                out.insert(selection.response_key().to_string(), field);
            }
            Value::Object(out)
        }
        other => other,
    }
}
