use std::sync::Arc;
use tracing::debug;

use super::keys::{RESOLVER_DATA, RESOLVER_TAG};
use super::resolver::{ResolverClass, ResolverData, SharedResolver};
use crate::error::DispatchError;
use crate::registry::{filter_by_tag, Binding, Scope, ScopeKind};

/// Resolver instances come from the registry, never from direct
/// construction.
///
/// A class bound anywhere in the scope chain is resolved through its
/// binding. An unbound class is bound in a throw-away child scope (together
/// with the resolver data) and resolved there, leaving the parent untouched.
#[derive(Debug, Clone)]
pub struct ResolverContainer {
    scope: Arc<Scope>,
}

impl ResolverContainer {
    #[must_use]
    pub fn new(scope: Arc<Scope>) -> Self {
        Self { scope }
    }

    #[must_use]
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    /// Instance of `class` for the current request
    ///
    /// # Errors
    ///
    /// Construction failures and unresolvable dependencies.
    pub fn get(
        &self,
        class: &ResolverClass,
        data: &Arc<ResolverData>,
    ) -> Result<SharedResolver, DispatchError> {
        let bound = self
            .scope
            .find(&filter_by_tag(RESOLVER_TAG))
            .into_iter()
            .find(|b| b.class_name() == Some(class.name()));

        if let Some(binding) = bound {
            debug!(class = %class.name(), key = %binding.key(), "Resolver resolved from binding");
            let resolver = self.scope.get_named::<SharedResolver>(binding.key())?;
            return Ok(Arc::clone(&resolver));
        }

        let scope = self.scope.create_child(
            &format!("graphql-resolver-{}", class.name()),
            ScopeKind::Transient,
        );
        scope.add(Binding::constant(&RESOLVER_DATA, Arc::clone(data)));
        let binding = scope.add(class.binding());
        debug!(class = %class.name(), "Resolver bound in throw-away scope");
        let resolver = scope.get_named::<SharedResolver>(binding.key())?;
        Ok(Arc::clone(&resolver))
    }
}
