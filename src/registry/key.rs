use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed binding key.
///
/// The type parameter only guides `Scope::get`; the registry itself stores
/// keys as plain strings, so two `BindingKey`s with the same text address the
/// same binding regardless of `T`.
pub struct BindingKey<T> {
    key: Arc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> BindingKey<T> {
    /// Create a key from its string form
    #[must_use]
    pub fn create(key: &str) -> Self {
        Self {
            key: Arc::from(key),
            _marker: PhantomData,
        }
    }

    /// Generate a unique key under `namespace` (e.g. `graphql.middleware.01J...`)
    #[must_use]
    pub fn generate(namespace: &str) -> Self {
        Self::create(&format!("{namespace}.{}", ulid::Ulid::new()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl<T> Clone for BindingKey<T> {
    fn clone(&self) -> Self {
        Self {
            key: Arc::clone(&self.key),
            _marker: PhantomData,
        }
    }
}

impl<T> AsRef<str> for BindingKey<T> {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

impl<T> fmt::Display for BindingKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl<T> fmt::Debug for BindingKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindingKey({})", self.key)
    }
}

impl<T> PartialEq for BindingKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for BindingKey<T> {}
