//! Binding keys and tags of the GraphQL bridge

use once_cell::sync::Lazy;
use std::sync::Arc;

use super::executor::{AuthCheckerFn, ContextResolverFn};
use super::resolver::ResolverData;
use crate::registry::BindingKey;

/// Tag carried by every resolver class binding
pub const RESOLVER_TAG: &str = "graphql.resolver";

/// Tag carried by field middleware bindings
pub const MIDDLEWARE_TAG: &str = "graphql.middleware";

/// Key namespace of resolver bindings, `resolvers.<ClassName>`
pub const RESOLVERS_NAMESPACE: &str = "resolvers";

/// Optional auth checker consulted for fields with required roles
pub static AUTH_CHECKER: Lazy<BindingKey<AuthCheckerFn>> =
    Lazy::new(|| BindingKey::create("graphql.authChecker"));

/// Optional function producing the GraphQL context value for a request
pub static CONTEXT_RESOLVER: Lazy<BindingKey<ContextResolverFn>> =
    Lazy::new(|| BindingKey::create("graphql.contextResolver"));

/// Per-request resolver data, bound in the request scope while executing
pub static RESOLVER_DATA: Lazy<BindingKey<Arc<ResolverData>>> =
    Lazy::new(|| BindingKey::create("graphql.resolverData"));
