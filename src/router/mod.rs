//! # Router Module
//!
//! Route table for the dispatch core: stores registered [`RouteSpec`]s and
//! matches an incoming method + path to exactly one of them.
//!
//! ## Overview
//!
//! - [`RouteTable::register`] normalizes the pattern (leading slash, no
//!   trailing slash) and rejects a second route with the same method and
//!   pattern as a `Conflict`.
//! - [`RouteTable::match_route`] walks a segment tree. Literal segments are
//!   preferred over parameters, failed branches backtrack, and parameter
//!   values are percent-decoded. A path that matches only under other methods
//!   yields `MethodNotAllowed`; anything else yields `NotFound`.
//! - [`MatchedRoute::update_bindings`] publishes the match into the request
//!   scope so operations and later middleware can inject it.
//!
//! ## Example
//!
//! ```rust
//! use brrtcore::context::RequestContext;
//! use brrtcore::operation::{OperationArgs, OperationResult};
//! use brrtcore::router::{RouteSpec, RouteTable};
//! use http::Method;
//!
//! let find_recipe = |_ctx: &mut RequestContext, _args: &OperationArgs| Ok(OperationResult::Empty);
//! let mut table = RouteTable::new();
//! table
//!     .register(RouteSpec::handler(Method::GET, "/recipes/{id}", "find_recipe", find_recipe))
//!     .unwrap();
//!
//! let matched = table.match_route(&Method::GET, "/recipes/42").unwrap();
//! assert_eq!(matched.get_path_param("id"), Some("42"));
//! ```

mod core;
mod radix;
mod spec;

pub use core::{normalize_pattern, MatchedRoute, ParamVec, RouteTable, MAX_INLINE_PARAMS};
pub use radix::RadixRouter;
pub use spec::{OperationRef, ParamSource, ParamType, ParameterSpec, RouteSpec};
