//! # Registry Module
//!
//! Hierarchical dependency-injection container used by the dispatch core.
//!
//! ## Overview
//!
//! A [`Scope`] owns a map of [`Binding`]s and an optional read-only reference to
//! its parent. Lookups search the current scope first and then walk up the
//! parent chain. The application holds one root scope; the dispatcher creates a
//! fresh child scope for every request and drops it once the response is
//! written.
//!
//! Bindings resolve through a [`Provider`]: a constant, a factory, a class
//! constructor with declared [`Dependency`]s, or an alias. Their
//! [`BindingScope`] controls caching:
//!
//! | Scope       | Behaviour                                                   |
//! |-------------|-------------------------------------------------------------|
//! | `Singleton` | resolved once against the owning scope and cached           |
//! | `Request`   | cached in the nearest request scope                         |
//! | `Transient` | factory/constructor re-invoked on every resolution          |
//!
//! Tagged bindings can be discovered across the chain with [`Scope::find`] or a
//! live [`BindingView`]; this is how middleware entries and GraphQL resolvers
//! are collected.
//!
//! ## Example
//!
//! ```rust
//! use brrtcore::registry::{Binding, BindingKey, Scope, ScopeKind};
//!
//! let root = Scope::new_root("application");
//! let greeting: BindingKey<String> = BindingKey::create("greeting");
//! root.add(Binding::constant(&greeting, "hello".to_string()));
//!
//! let request = root.create_child("request", ScopeKind::Request);
//! assert_eq!(request.get(&greeting).unwrap().as_str(), "hello");
//! ```

mod binding;
mod key;
mod scope;
mod view;

pub use binding::{
    Binding, BindingScope, BoundValue, ConstructFn, Dependency, FactoryFn, Injected, Provider,
};
pub(crate) use binding::downcast;
pub use key::BindingKey;
pub use scope::{ResolutionContext, ResolutionSession, Scope, ScopeKind};
pub use view::{
    filter_by_key_prefix, filter_by_tag, filter_by_tag_value, BindingFilter, BindingView,
};
