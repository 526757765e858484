use arc_swap::ArcSwapOption;
use std::any::Any;
use std::sync::Arc;
use tracing::trace;

use super::binding::{downcast, Binding, BoundValue};
use super::scope::Scope;
use crate::error::DispatchError;

/// Predicate over bindings
pub type BindingFilter = Arc<dyn Fn(&Binding) -> bool + Send + Sync>;

/// Match bindings carrying tag `name` (any value)
#[must_use]
pub fn filter_by_tag(name: &str) -> BindingFilter {
    let name = name.to_string();
    Arc::new(move |b: &Binding| b.has_tag(&name))
}

/// Match bindings whose tag `name` equals `value`
#[must_use]
pub fn filter_by_tag_value(name: &str, value: &str) -> BindingFilter {
    let name = name.to_string();
    let value = value.to_string();
    Arc::new(move |b: &Binding| b.tag_value_of(&name) == Some(value.as_str()))
}

/// Match bindings whose key starts with `prefix`
#[must_use]
pub fn filter_by_key_prefix(prefix: &str) -> BindingFilter {
    let prefix = prefix.to_string();
    Arc::new(move |b: &Binding| b.key().starts_with(&prefix))
}

struct Snapshot {
    fingerprint: Vec<u64>,
    bindings: Vec<Arc<Binding>>,
}

/// Live list of bindings matching a filter across a scope and its ancestors.
///
/// The list is recomputed lazily: a snapshot is kept together with the
/// generation counter of every scope in the chain and reused until one of
/// them changes.
pub struct BindingView {
    scope: Arc<Scope>,
    filter: BindingFilter,
    snapshot: ArcSwapOption<Snapshot>,
}

impl BindingView {
    pub(super) fn new(scope: Arc<Scope>, filter: BindingFilter) -> Self {
        Self {
            scope,
            filter,
            snapshot: ArcSwapOption::empty(),
        }
    }

    fn fingerprint(&self) -> Vec<u64> {
        self.scope.ancestry().map(Scope::generation).collect()
    }

    /// Current matching bindings, ordered by registration
    #[must_use]
    pub fn bindings(&self) -> Vec<Arc<Binding>> {
        let fingerprint = self.fingerprint();
        if let Some(snapshot) = self.snapshot.load_full() {
            if snapshot.fingerprint == fingerprint {
                return snapshot.bindings.clone();
            }
        }
        let bindings = self.scope.find(&self.filter);
        trace!(
            scope = %self.scope.name(),
            matched = bindings.len(),
            "Binding view refreshed"
        );
        self.snapshot.store(Some(Arc::new(Snapshot {
            fingerprint,
            bindings: bindings.clone(),
        })));
        bindings
    }

    /// Resolve every matching binding against the view's scope
    pub fn resolve_values(&self) -> Result<Vec<BoundValue>, DispatchError> {
        self.bindings()
            .iter()
            .map(|b| self.scope.get_value(b.key()))
            .collect()
    }

    /// Resolve every matching binding as `T`
    pub fn values<T: Any + Send + Sync>(&self) -> Result<Vec<Arc<T>>, DispatchError> {
        self.bindings()
            .iter()
            .map(|b| {
                let value = self.scope.get_value(b.key())?;
                downcast::<T>(b.key(), value)
            })
            .collect()
    }

    #[must_use]
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }
}
