use serde_json::{json, Value};
use tracing::debug;

use super::core::{ChainResult, Middleware, Next};
use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::http::HttpRequest;
use crate::operation::OperationArgs;
use crate::router::{MatchedRoute, ParamSource, ParameterSpec};

/// Builds [`OperationArgs`] for the matched route from its declared
/// parameters. Missing or mistyped parameters produce one `ValidationError`
/// listing every problem.
///
/// A route without declared parameters receives its path parameters as
/// strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseParamsMiddleware;

impl ParseParamsMiddleware {
    /// Parse the arguments for `matched` from `request`
    ///
    /// # Errors
    ///
    /// A `ValidationError` whose `details` lists each rejected parameter.
    pub fn parse(
        request: &HttpRequest,
        matched: &MatchedRoute,
    ) -> Result<OperationArgs, DispatchError> {
        let mut args = OperationArgs::new();
        if matched.spec.parameters.is_empty() {
            for (name, value) in &matched.path_params {
                args.push(name.as_ref(), Value::String(value.clone()));
            }
            return Ok(args);
        }

        let mut problems = Vec::new();
        for param in &matched.spec.parameters {
            let value = match param.source {
                ParamSource::Body => {
                    match request.json_body()? {
                        Some(v) if param.param_type.accepts(v) => Some(v.clone()),
                        Some(_) => {
                            problems.push(problem(param, "has the wrong type"));
                            continue;
                        }
                        None => None,
                    }
                }
                source => {
                    let raw = match source {
                        ParamSource::Path => matched.get_path_param(&param.name),
                        ParamSource::Query => request.get_query_param(&param.name),
                        _ => request.get_header(&param.name),
                    };
                    match raw.map(|r| param.param_type.coerce(r)) {
                        Some(Ok(v)) => Some(v),
                        Some(Err(reason)) => {
                            problems.push(problem(param, &reason));
                            continue;
                        }
                        None => None,
                    }
                }
            };

            match value {
                Some(v) => args.push(param.name.as_str(), v),
                None if param.required => problems.push(problem(param, "is required")),
                None => args.push(param.name.as_str(), Value::Null),
            }
        }

        if problems.is_empty() {
            Ok(args)
        } else {
            Err(
                DispatchError::validation("The request parameters are invalid")
                    .with_details(Value::Array(problems)),
            )
        }
    }
}

fn problem(param: &ParameterSpec, message: &str) -> Value {
    json!({
        "name": param.name,
        "in": param.source.to_string(),
        "message": message,
    })
}

impl Middleware for ParseParamsMiddleware {
    fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> ChainResult {
        if let Some(matched) = ctx.matched_route() {
            let args = Self::parse(ctx.request(), matched)?;
            debug!(
                request_id = %ctx.request_id(),
                operation = %matched.spec.operation_name(),
                count = args.len(),
                "Parameters parsed"
            );
            ctx.set_args(args);
        }
        next.run(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{ParamType, RouteSpec, RouteTable};
    use http::Method;

    fn matched(spec: RouteSpec, path: &str) -> MatchedRoute {
        let mut table = RouteTable::new();
        let method = spec.method.clone();
        table.register(spec).unwrap();
        table.match_route(&method, path).unwrap()
    }

    #[test]
    fn test_parses_declared_parameters_in_order() {
        let spec = RouteSpec::controller(Method::POST, "/recipes/{id}", "controllers.Recipes", "update")
            .with_parameter(ParameterSpec::path("id").of_type(ParamType::Integer))
            .with_parameter(ParameterSpec::query("dry_run").of_type(ParamType::Boolean))
            .with_parameter(ParameterSpec::body("recipe").required(true));
        let m = matched(spec, "/recipes/7");
        let req = HttpRequest::new(Method::POST, "/recipes/7?dry_run=true")
            .with_json(&json!({"title": "Soup"}));

        let args = ParseParamsMiddleware::parse(&req, &m).unwrap();
        assert_eq!(args.at(0), Some(&json!(7)));
        assert_eq!(args.get("dry_run"), Some(&json!(true)));
        assert_eq!(args.get("recipe"), Some(&json!({"title": "Soup"})));
    }

    #[test]
    fn test_collects_every_problem() {
        let spec = RouteSpec::controller(Method::GET, "/recipes/{id}", "controllers.Recipes", "find")
            .with_parameter(ParameterSpec::path("id").of_type(ParamType::Integer))
            .with_parameter(ParameterSpec::query("limit").required(true));
        let m = matched(spec, "/recipes/abc");
        let req = HttpRequest::new(Method::GET, "/recipes/abc");

        let err = ParseParamsMiddleware::parse(&req, &m).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        let details = err.details().unwrap().as_array().unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0]["name"], "id");
        assert_eq!(details[1]["in"], "query");
    }

    #[test]
    fn test_undeclared_route_gets_path_params() {
        let spec = RouteSpec::controller(Method::GET, "/recipes/{id}", "controllers.Recipes", "find");
        let m = matched(spec, "/recipes/42");
        let args = ParseParamsMiddleware::parse(&HttpRequest::new(Method::GET, "/recipes/42"), &m)
            .unwrap();
        assert_eq!(args.get("id"), Some(&json!("42")));
    }

    #[test]
    fn test_optional_missing_parameter_is_null() {
        let spec = RouteSpec::controller(Method::GET, "/recipes", "controllers.Recipes", "find")
            .with_parameter(ParameterSpec::header("x-tenant"));
        let m = matched(spec, "/recipes");
        let args =
            ParseParamsMiddleware::parse(&HttpRequest::new(Method::GET, "/recipes"), &m).unwrap();
        assert_eq!(args.get("x-tenant"), Some(&Value::Null));
    }
}
