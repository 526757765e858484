use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::keys::{RESOLVERS_NAMESPACE, RESOLVER_TAG};
use crate::context::RequestId;
use crate::error::DispatchError;
use crate::middleware::Principal;
use crate::registry::{Binding, BindingScope, Dependency, Injected, Scope};

/// Data shared by every field resolved for one GraphQL request
#[derive(Debug, Clone)]
pub struct ResolverData {
    pub request_id: RequestId,
    /// Value produced by the context resolver
    pub context: Value,
    /// Principal established by the authentication group, if any
    pub user: Option<Arc<Principal>>,
}

/// A resolver instance: resolves the root fields its class declares
pub trait Resolver: Send + Sync {
    fn resolve(&self, field: &str, args: &Value, data: &ResolverData) -> Result<Value, DispatchError>;
}

/// Type stored in resolver bindings
pub type SharedResolver = Arc<dyn Resolver>;

type ConstructResolver = Arc<dyn Fn(&Injected) -> Result<SharedResolver, DispatchError> + Send + Sync>;

/// Describes a resolver class: its constructor dependencies and the root
/// fields it owns.
///
/// ```rust
/// use brrtcore::graphql::{ResolverClass, ResolverData};
/// use brrtcore::error::DispatchError;
/// use brrtcore::registry::Dependency;
/// use serde_json::{json, Value};
///
/// struct Greeter { greeting: String }
///
/// impl brrtcore::graphql::Resolver for Greeter {
///     fn resolve(&self, _field: &str, args: &Value, _data: &ResolverData) -> Result<Value, DispatchError> {
///         Ok(json!(format!("{} {}", self.greeting, args["name"].as_str().unwrap_or("world"))))
///     }
/// }
///
/// let class = ResolverClass::new("GreeterResolver", |inj| {
///         Ok(Greeter { greeting: inj.get::<String>(0)?.to_string() })
///     })
///     .inject(Dependency::required("config.greeting"))
///     .query("greet");
/// assert_eq!(class.key(), "resolvers.GreeterResolver");
/// ```
#[derive(Clone)]
pub struct ResolverClass {
    name: String,
    dependencies: Vec<Dependency>,
    construct: ConstructResolver,
    queries: Vec<String>,
    mutations: Vec<String>,
    authorized: HashMap<String, Vec<String>>,
    scope: BindingScope,
}

impl ResolverClass {
    pub fn new<R, F>(name: &str, construct: F) -> Self
    where
        R: Resolver + 'static,
        F: Fn(&Injected) -> Result<R, DispatchError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            dependencies: Vec::new(),
            construct: Arc::new(move |inj| construct(inj).map(|r| Arc::new(r) as SharedResolver)),
            queries: Vec::new(),
            mutations: Vec::new(),
            authorized: HashMap::new(),
            scope: BindingScope::Transient,
        }
    }

    /// Append a constructor dependency
    #[must_use]
    pub fn inject(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Declare a `Query` root field
    #[must_use]
    pub fn query(mut self, field: &str) -> Self {
        self.queries.push(field.to_string());
        self
    }

    /// Declare a `Mutation` root field
    #[must_use]
    pub fn mutation(mut self, field: &str) -> Self {
        self.mutations.push(field.to_string());
        self
    }

    /// Require the auth checker to accept `roles` before resolving `field`.
    /// An empty list still requires the checker's approval.
    #[must_use]
    pub fn authorized(mut self, field: &str, roles: &[&str]) -> Self {
        self.authorized.insert(
            field.to_string(),
            roles.iter().map(|r| (*r).to_string()).collect(),
        );
        self
    }

    #[must_use]
    pub fn in_scope(mut self, scope: BindingScope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    #[must_use]
    pub fn mutations(&self) -> &[String] {
        &self.mutations
    }

    /// Roles required for `field`, `None` when the field is public
    #[must_use]
    pub fn roles_for(&self, field: &str) -> Option<&[String]> {
        self.authorized.get(field).map(Vec::as_slice)
    }

    /// `resolvers.<Name>`
    #[must_use]
    pub fn key(&self) -> String {
        format!("{RESOLVERS_NAMESPACE}.{}", self.name)
    }

    /// Class binding producing a [`SharedResolver`], tagged `graphql.resolver`
    #[must_use]
    pub fn binding(&self) -> Binding {
        let construct = Arc::clone(&self.construct);
        Binding::new(self.key())
            .to_class(self.name.clone(), self.dependencies.clone(), move |inj| {
                construct(inj)
            })
            .in_scope(self.scope)
            .tag(RESOLVER_TAG)
    }
}

impl fmt::Debug for ResolverClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverClass")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("queries", &self.queries)
            .field("mutations", &self.mutations)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Bind `class` in `scope` under `resolvers.<Name>`
pub fn register_resolver(scope: &Scope, class: &ResolverClass) -> Arc<Binding> {
    debug!(scope = %scope.name(), class = %class.name(), "Resolver registered");
    scope.add(class.binding())
}
