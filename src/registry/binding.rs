use once_cell::sync::OnceCell;
use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::scope::ResolutionContext;
use super::BindingKey;
use crate::error::DispatchError;

/// Type-erased value held by (or produced from) a binding
pub type BoundValue = Arc<dyn Any + Send + Sync>;

/// Factory closure producing a value against the resolving scope
pub type FactoryFn =
    Arc<dyn Fn(&ResolutionContext<'_>) -> Result<BoundValue, DispatchError> + Send + Sync>;

/// Constructor closure receiving the resolved declared dependencies
pub type ConstructFn = Arc<dyn Fn(&Injected) -> Result<BoundValue, DispatchError> + Send + Sync>;

/// Lifetime of values produced by a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingScope {
    /// Resolved once against the scope that owns the binding, then cached
    Singleton,
    /// Re-created on every resolution
    #[default]
    Transient,
    /// Cached for the lifetime of the nearest request scope
    Request,
}

/// A dependency declared by a class binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub key: String,
    pub optional: bool,
}

impl Dependency {
    pub fn required(key: impl AsRef<str>) -> Self {
        Self {
            key: key.as_ref().to_string(),
            optional: false,
        }
    }

    pub fn optional(key: impl AsRef<str>) -> Self {
        Self {
            key: key.as_ref().to_string(),
            optional: true,
        }
    }
}

/// Resolution strategy of a binding
#[derive(Clone)]
pub enum Provider {
    Constant(BoundValue),
    Factory(FactoryFn),
    Class {
        class_name: String,
        dependencies: Vec<Dependency>,
        construct: ConstructFn,
    },
    /// Resolve another key in the resolving scope
    Alias(String),
    /// No `to*` call yet; resolving fails
    Unset,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Constant(_) => f.write_str("Constant"),
            Provider::Factory(_) => f.write_str("Factory"),
            Provider::Class {
                class_name,
                dependencies,
                ..
            } => f
                .debug_struct("Class")
                .field("class_name", class_name)
                .field("dependencies", dependencies)
                .finish(),
            Provider::Alias(target) => f.debug_tuple("Alias").field(target).finish(),
            Provider::Unset => f.write_str("Unset"),
        }
    }
}

/// A named registration of a resolvable value.
///
/// Bindings are configured with the builder-style methods below and become
/// immutable once added to a [`Scope`](super::Scope).
///
/// ```rust,ignore
/// scope.add(
///     Binding::new("services.RecipeService")
///         .to_class("RecipeService", vec![Dependency::required("repositories.Recipe")], |inj| {
///             Ok(RecipeService::new(inj.get::<RecipeRepo>(0)?))
///         })
///         .in_scope(BindingScope::Singleton)
///         .tag("service"),
/// )?;
/// ```
pub struct Binding {
    key: String,
    scope: BindingScope,
    tags: BTreeMap<String, String>,
    provider: Provider,
    pub(super) seq: u64,
    pub(super) singleton: OnceCell<BoundValue>,
}

impl Binding {
    /// A binding with no provider yet (resolving it fails until `to*` is called)
    pub fn new(key: impl AsRef<str>) -> Self {
        let key = key.as_ref().to_string();
        Self {
            provider: Provider::Unset,
            key,
            scope: BindingScope::default(),
            tags: BTreeMap::new(),
            seq: 0,
            singleton: OnceCell::new(),
        }
    }

    /// Shorthand for a constant binding under a typed key
    pub fn constant<T: Any + Send + Sync>(key: &BindingKey<T>, value: T) -> Self {
        Self::new(key).to(value)
    }

    #[must_use]
    pub fn to<T: Any + Send + Sync>(self, value: T) -> Self {
        self.to_arc(Arc::new(value))
    }

    #[must_use]
    pub fn to_arc<T: Any + Send + Sync>(mut self, value: Arc<T>) -> Self {
        self.provider = Provider::Constant(value);
        self
    }

    #[must_use]
    pub fn to_factory<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&ResolutionContext<'_>) -> Result<T, DispatchError> + Send + Sync + 'static,
    {
        self.provider = Provider::Factory(Arc::new(move |ctx| {
            factory(ctx).map(|v| Arc::new(v) as BoundValue)
        }));
        self
    }

    #[must_use]
    pub fn to_class<T, F>(
        mut self,
        class_name: impl Into<String>,
        dependencies: Vec<Dependency>,
        construct: F,
    ) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Injected) -> Result<T, DispatchError> + Send + Sync + 'static,
    {
        self.provider = Provider::Class {
            class_name: class_name.into(),
            dependencies,
            construct: Arc::new(move |inj| construct(inj).map(|v| Arc::new(v) as BoundValue)),
        };
        self
    }

    #[must_use]
    pub fn to_alias(mut self, target: impl AsRef<str>) -> Self {
        self.provider = Provider::Alias(target.as_ref().to_string());
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    #[must_use]
    pub fn in_scope(mut self, scope: BindingScope) -> Self {
        self.scope = scope;
        self
    }

    /// Add a plain tag (`name` → `name`)
    #[must_use]
    pub fn tag(mut self, name: impl AsRef<str>) -> Self {
        let name = name.as_ref().to_string();
        self.tags.insert(name.clone(), name);
        self
    }

    #[must_use]
    pub fn tag_value(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.tags
            .insert(name.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn scope(&self) -> BindingScope {
        self.scope
    }

    #[must_use]
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    #[must_use]
    pub fn tag_value_of(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// Class name for class bindings, `None` otherwise
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        match &self.provider {
            Provider::Class { class_name, .. } => Some(class_name),
            _ => None,
        }
    }

    /// Registration sequence; later additions have larger values
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.seq
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("tags", &self.tags)
            .field("provider", &self.provider)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Declared dependencies of a class binding, resolved in declaration order
pub struct Injected {
    binding_key: String,
    keys: Vec<String>,
    values: Vec<Option<BoundValue>>,
}

impl Injected {
    pub(super) fn new(binding_key: &str, keys: Vec<String>, values: Vec<Option<BoundValue>>) -> Self {
        Self {
            binding_key: binding_key.to_string(),
            keys,
            values,
        }
    }

    /// Key of the binding being constructed
    #[must_use]
    pub fn binding_key(&self) -> &str {
        &self.binding_key
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Required dependency at `index`
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, DispatchError> {
        self.optional(index)?.ok_or_else(|| {
            DispatchError::internal(format!(
                "dependency #{index} of '{}' is not available",
                self.binding_key
            ))
        })
    }

    /// Optional dependency at `index`; `None` when the key was unbound
    pub fn optional<T: Any + Send + Sync>(
        &self,
        index: usize,
    ) -> Result<Option<Arc<T>>, DispatchError> {
        match self.values.get(index) {
            Some(Some(value)) => {
                let key = self.keys.get(index).map(String::as_str).unwrap_or("");
                downcast::<T>(key, Arc::clone(value)).map(Some)
            }
            Some(None) => Ok(None),
            None => Err(DispatchError::internal(format!(
                "'{}' declares {} dependencies, index {index} requested",
                self.binding_key,
                self.values.len()
            ))),
        }
    }

    /// Dependency looked up by its key instead of position
    pub fn by_key<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, DispatchError> {
        let index = self.keys.iter().position(|k| k == key).ok_or_else(|| {
            DispatchError::internal(format!(
                "'{}' does not declare a dependency on '{key}'",
                self.binding_key
            ))
        })?;
        self.get(index)
    }
}

pub(crate) fn downcast<T: Any + Send + Sync>(
    key: &str,
    value: BoundValue,
) -> Result<Arc<T>, DispatchError> {
    value.downcast::<T>().map_err(|_| {
        DispatchError::internal(format!(
            "binding '{key}' does not hold a value of type {}",
            type_name::<T>()
        ))
    })
}

pub(crate) fn unset(binding: &Binding) -> DispatchError {
    DispatchError::internal(format!(
        "binding '{}' has no value provider",
        binding.key()
    ))
    .with_code("BINDING_UNSET")
}
