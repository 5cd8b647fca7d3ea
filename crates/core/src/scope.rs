//! Nested attribute scopes.
//!
//! Attributes (authentication level, caching hints, anything an app wants to
//! attach to routes) are looked up from the innermost scope outwards:
//! endpoint, then enclosing regions, then the app.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// A key/value scope that falls back to a parent scope on lookup misses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeScope {
    data: HashMap<String, Value>,
    parent: Option<Arc<AttributeScope>>,
}

impl AttributeScope {
    /// Create an empty scope with no parent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope from existing attributes.
    #[must_use]
    pub fn from_map(data: HashMap<String, Value>) -> Self {
        Self { data, parent: None }
    }

    /// Set the parent scope.
    #[must_use]
    pub fn with_parent(mut self, parent: Arc<Self>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Parent scope, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    /// Look up `key` here, then in each ancestor.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(value) = current.data.get(key) {
                return Some(value);
            }
            scope = current.parent.as_deref();
        }
        None
    }

    /// Whether `key` resolves anywhere in the chain.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set `key` in this scope only.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Remove `key` from this scope only, returning the old value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Attributes defined directly in this scope.
    #[must_use]
    pub const fn local(&self) -> &HashMap<String, Value> {
        &self.data
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for AttributeScope {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
