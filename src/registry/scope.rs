use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace};

use super::binding::{downcast, unset, Binding, BindingScope, BoundValue, Injected, Provider};
use super::view::{BindingFilter, BindingView};
use super::BindingKey;
use crate::error::DispatchError;

/// Global registration counter shared by every scope, so that bindings added
/// to different scopes still have a total order.
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Role of a scope in the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Process-wide root
    Application,
    /// Long-lived intermediate scope (e.g. a GraphQL server)
    Server,
    /// Created per request, discarded with the response
    Request,
    /// Short-lived helper scope (resolver construction and the like)
    Transient,
}

/// A node in the registry tree.
///
/// Each scope owns its own bindings and holds a read-only reference to its
/// parent. Parents never reference children, so dropping a request scope
/// releases everything bound in it.
pub struct Scope {
    name: String,
    kind: ScopeKind,
    parent: Option<Arc<Scope>>,
    bindings: RwLock<HashMap<String, Arc<Binding>>>,
    request_cache: RwLock<HashMap<String, BoundValue>>,
    generation: AtomicU64,
}

impl Scope {
    /// Create a root scope
    #[must_use]
    pub fn new_root(name: &str) -> Arc<Self> {
        Arc::new(Self::with_parent(name, ScopeKind::Application, None))
    }

    fn with_parent(name: &str, kind: ScopeKind, parent: Option<Arc<Scope>>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            parent,
            bindings: RwLock::new(HashMap::new()),
            request_cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Create a child scope whose lookups fall back to `self`
    #[must_use]
    pub fn create_child(self: &Arc<Self>, name: &str, kind: ScopeKind) -> Arc<Scope> {
        trace!(parent = %self.name, child = %name, kind = ?kind, "Child scope created");
        Arc::new(Self::with_parent(name, kind, Some(Arc::clone(self))))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Arc<Scope>> {
        self.parent.as_ref()
    }

    /// Generation counter; bumped on every local add/unbind
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Iterate over `self` and its ancestors, nearest first
    pub fn ancestry(&self) -> impl Iterator<Item = &Scope> {
        std::iter::successors(Some(self), |s| s.parent.as_deref())
    }

    /// Register a binding in this scope, replacing any local binding with the
    /// same key. Parent scopes are never touched.
    pub fn add(&self, mut binding: Binding) -> Arc<Binding> {
        binding.seq = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let binding = Arc::new(binding);
        let replaced = self
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(binding.key().to_string(), Arc::clone(&binding));
        self.generation.fetch_add(1, Ordering::AcqRel);
        debug!(
            scope = %self.name,
            key = %binding.key(),
            binding_scope = ?binding.scope(),
            replaced = replaced.is_some(),
            "Binding added"
        );
        binding
    }

    /// Configure and register a binding for `key` in one step
    ///
    /// ```rust
    /// # use brrtcore::registry::{BindingScope, Scope};
    /// let root = Scope::new_root("app");
    /// root.bind("config.port", |b| b.to(8080u16).in_scope(BindingScope::Singleton));
    /// assert_eq!(*root.get_named::<u16>("config.port").unwrap(), 8080);
    /// ```
    pub fn bind<F>(&self, key: impl AsRef<str>, configure: F) -> Arc<Binding>
    where
        F: FnOnce(Binding) -> Binding,
    {
        self.add(configure(Binding::new(key)))
    }

    /// Remove a local binding; returns whether one existed
    pub fn unbind(&self, key: &str) -> bool {
        let removed = self
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();
        if removed {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        removed
    }

    /// Whether `key` is bound in this scope only
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Whether `key` is bound here or in any ancestor
    #[must_use]
    pub fn is_bound(&self, key: &str) -> bool {
        self.ancestry().any(|s| s.contains(key))
    }

    /// Local binding lookup
    #[must_use]
    pub fn get_binding(&self, key: &str) -> Option<Arc<Binding>> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Find the binding for `key` and the scope that owns it
    fn lookup(&self, key: &str) -> Option<(&Scope, Arc<Binding>)> {
        self.ancestry()
            .find_map(|s| s.get_binding(key).map(|b| (s, b)))
    }

    /// All bindings visible from this scope matching `filter`.
    ///
    /// A binding in a nearer scope shadows an ancestor binding with the same
    /// key. The result is ordered by registration sequence.
    #[must_use]
    pub fn find(&self, filter: &BindingFilter) -> Vec<Arc<Binding>> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for scope in self.ancestry() {
            let local = scope.bindings.read().unwrap_or_else(PoisonError::into_inner);
            for (key, binding) in local.iter() {
                if seen.insert(key.clone()) && filter(binding) {
                    found.push(Arc::clone(binding));
                }
            }
        }
        found.sort_by_key(|b| b.sequence());
        found
    }

    #[must_use]
    pub fn find_by_tag(&self, tag: &str) -> Vec<Arc<Binding>> {
        self.find(&super::view::filter_by_tag(tag))
    }

    /// A live, lazily refreshed view over bindings matching `filter`
    #[must_use]
    pub fn create_view(self: &Arc<Self>, filter: BindingFilter) -> BindingView {
        BindingView::new(Arc::clone(self), filter)
    }

    /// Resolve a typed key; fails with `NotFound` when unbound
    pub fn get<T: Any + Send + Sync>(&self, key: &BindingKey<T>) -> Result<Arc<T>, DispatchError> {
        self.get_named(key.as_str())
    }

    /// Resolve a typed key; `Ok(None)` when unbound
    pub fn get_optional<T: Any + Send + Sync>(
        &self,
        key: &BindingKey<T>,
    ) -> Result<Option<Arc<T>>, DispatchError> {
        let session = ResolutionSession::default();
        match self.resolve(key.as_str(), true, &session)? {
            Some(value) => downcast::<T>(key.as_str(), value).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve a string key to a concrete type
    pub fn get_named<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, DispatchError> {
        let value = self.get_value(key)?;
        downcast::<T>(key, value)
    }

    /// Resolve a string key to a type-erased value
    pub fn get_value(&self, key: &str) -> Result<BoundValue, DispatchError> {
        let session = ResolutionSession::default();
        self.resolve(key, false, &session)?
            .ok_or_else(|| self.not_found(key))
    }

    fn not_found(&self, key: &str) -> DispatchError {
        DispatchError::not_found(format!(
            "The key '{key}' is not bound to any value in scope '{}'",
            self.name
        ))
        .with_code("BINDING_NOT_FOUND")
    }

    /// Core resolution: walk the chain, honour the binding's scope, detect cycles
    pub(super) fn resolve(
        &self,
        key: &str,
        optional: bool,
        session: &ResolutionSession,
    ) -> Result<Option<BoundValue>, DispatchError> {
        let Some((owner, binding)) = self.lookup(key) else {
            if optional {
                return Ok(None);
            }
            return Err(self.not_found(key));
        };

        session.enter(key)?;
        let result = self.resolve_binding(owner, &binding, session);
        session.leave();
        result.map(Some)
    }

    fn resolve_binding(
        &self,
        owner: &Scope,
        binding: &Binding,
        session: &ResolutionSession,
    ) -> Result<BoundValue, DispatchError> {
        match binding.provider() {
            Provider::Constant(value) => return Ok(Arc::clone(value)),
            Provider::Alias(target) => {
                return self
                    .resolve(target, false, session)?
                    .ok_or_else(|| self.not_found(target));
            }
            Provider::Unset => return Err(unset(binding)),
            Provider::Factory(_) | Provider::Class { .. } => {}
        }

        match binding.scope() {
            BindingScope::Singleton => binding
                .singleton
                .get_or_try_init(|| {
                    debug!(key = %binding.key(), owner = %owner.name, "Resolving singleton");
                    owner.produce(binding, session)
                })
                .map(Arc::clone),
            BindingScope::Request => {
                let cache_scope = self
                    .ancestry()
                    .find(|s| s.kind == ScopeKind::Request)
                    .unwrap_or(owner);
                if let Some(hit) = cache_scope
                    .request_cache
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(binding.key())
                {
                    return Ok(Arc::clone(hit));
                }
                let value = self.produce(binding, session)?;
                cache_scope
                    .request_cache
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(binding.key().to_string(), Arc::clone(&value));
                Ok(value)
            }
            BindingScope::Transient => self.produce(binding, session),
        }
    }

    /// Invoke the binding's factory/constructor with `self` as the resolving scope
    fn produce(&self, binding: &Binding, session: &ResolutionSession) -> Result<BoundValue, DispatchError> {
        match binding.provider() {
            Provider::Factory(factory) => {
                let ctx = ResolutionContext {
                    scope: self,
                    session,
                    binding_key: binding.key(),
                };
                factory(&ctx)
            }
            Provider::Class {
                dependencies,
                construct,
                ..
            } => {
                let mut keys = Vec::with_capacity(dependencies.len());
                let mut values = Vec::with_capacity(dependencies.len());
                for dep in dependencies {
                    values.push(self.resolve(&dep.key, dep.optional, session)?);
                    keys.push(dep.key.clone());
                }
                construct(&Injected::new(binding.key(), keys, values))
            }
            Provider::Constant(value) => Ok(Arc::clone(value)),
            Provider::Alias(target) => self
                .resolve(target, false, session)?
                .ok_or_else(|| self.not_found(target)),
            Provider::Unset => Err(unset(binding)),
        }
    }

    /// Drop every request-cached value (used when a request scope is closed)
    pub fn clear_request_cache(&self) {
        self.request_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of local bindings
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("bindings", &self.len())
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .finish()
    }
}

/// Keys currently being resolved, used to detect dependency cycles
#[derive(Default)]
pub struct ResolutionSession {
    stack: RefCell<Vec<String>>,
}

impl ResolutionSession {
    fn enter(&self, key: &str) -> Result<(), DispatchError> {
        let mut stack = self.stack.borrow_mut();
        if stack.iter().any(|k| k == key) {
            let mut path = stack.join(" --> ");
            path.push_str(" --> ");
            path.push_str(key);
            return Err(DispatchError::internal(format!(
                "Circular dependency detected: {path}"
            ))
            .with_code("CIRCULAR_DEPENDENCY"));
        }
        stack.push(key.to_string());
        Ok(())
    }

    fn leave(&self) {
        self.stack.borrow_mut().pop();
    }

    /// Keys on the resolution path, outermost first
    #[must_use]
    pub fn path(&self) -> Vec<String> {
        self.stack.borrow().clone()
    }
}

/// What a factory sees while it runs
pub struct ResolutionContext<'a> {
    scope: &'a Scope,
    session: &'a ResolutionSession,
    binding_key: &'a str,
}

impl ResolutionContext<'_> {
    /// Scope the resolution started from (a request scope for per-request lookups)
    #[must_use]
    pub fn scope(&self) -> &Scope {
        self.scope
    }

    #[must_use]
    pub fn binding_key(&self) -> &str {
        self.binding_key
    }

    /// Resolve another binding as part of this resolution
    pub fn get<T: Any + Send + Sync>(&self, key: &BindingKey<T>) -> Result<Arc<T>, DispatchError> {
        self.get_named(key.as_str())
    }

    pub fn get_named<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, DispatchError> {
        let value = self
            .scope
            .resolve(key, false, self.session)?
            .ok_or_else(|| self.scope.not_found(key))?;
        downcast::<T>(key, value)
    }

    pub fn get_optional<T: Any + Send + Sync>(
        &self,
        key: &BindingKey<T>,
    ) -> Result<Option<Arc<T>>, DispatchError> {
        match self.scope.resolve(key.as_str(), true, self.session)? {
            Some(value) => downcast::<T>(key.as_str(), value).map(Some),
            None => Ok(None),
        }
    }
}
