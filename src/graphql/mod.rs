//! # GraphQL Bridge
//!
//! Serves GraphQL from the same middleware chain as REST operations. The
//! whole protocol handling is one [`MiddlewareEntry`](crate::middleware::MiddlewareEntry)
//! in the `invoke-operation` group, so GraphQL requests share the request
//! context, binding resolution, authentication and error handling of the
//! REST path.
//!
//! - [`ResolverClass`] describes a resolver: constructor dependencies and
//!   the root fields it owns. [`register_resolver`] binds it under
//!   `resolvers.<Name>` with the `graphql.resolver` tag.
//! - [`ResolverContainer`] hands out resolver instances from the registry,
//!   falling back to a throw-away child scope for unbound classes.
//! - [`GraphQlExecutor`] is the schema-execution seam; [`RootFieldExecutor`]
//!   is the built-in implementation.
//! - [`GraphQlServer`] collects the pieces and produces the chain entry.

mod container;
mod document;
mod executor;
mod keys;
mod resolver;
mod server;

pub use container::ResolverContainer;
pub use document::{parse_document, project, select_operation, ArgValue, Operation, OperationType, Selection};
pub use executor::{
    AuthCheckerFn, ContextResolverFn, ExecutionEnv, FieldInfo, FieldNext, GraphQlError,
    GraphQlExecutor, GraphQlFieldMiddleware, GraphQlRequest, GraphQlResponse, RootFieldExecutor,
    SharedFieldMiddleware,
};
pub use keys::{
    AUTH_CHECKER, CONTEXT_RESOLVER, MIDDLEWARE_TAG, RESOLVERS_NAMESPACE, RESOLVER_DATA,
    RESOLVER_TAG,
};
pub use resolver::{register_resolver, Resolver, ResolverClass, ResolverData, SharedResolver};
pub use server::{mounted_route_name, GraphQlServer};
