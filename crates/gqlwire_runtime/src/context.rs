//! Type-keyed, request-scoped context.
//!
//! Handlers and batch loaders receive the request context through their
//! environment and extract values by type instead of by string key.

use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Storage for request-scoped data, keyed by type.
///
/// ```
/// use gqlwire_runtime::context::RequestContext;
///
/// #[derive(Clone)]
/// struct TenantId(String);
///
/// let mut ctx = RequestContext::new();
/// ctx.insert(TenantId("acme".into()));
///
/// assert_eq!(ctx.get::<TenantId>().map(|t| t.0.as_str()), Some("acme"));
/// assert!(ctx.get::<u64>().is_none());
/// ```
#[derive(Default)]
pub struct RequestContext {
    data: FxHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl RequestContext {
    /// Creates a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.data
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|boxed| boxed.downcast().ok().map(|b| *b))
    }

    /// Gets a reference to a value by type.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.data
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    /// Removes a value by type.
    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.data
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast().ok().map(|b| *b))
    }

    /// Returns true if the context holds a value of the given type.
    pub fn contains<T: 'static>(&self) -> bool {
        self.data.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Adds a value and returns self.
    #[must_use]
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("data_count", &self.data.len())
            .finish()
    }
}

/// A shareable request context.
pub type SharedContext = Arc<RequestContext>;

/// Produces the context handed to batch loaders of one request.
pub type ContextSupplier = Arc<dyn Fn() -> SharedContext + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct UserId(String);

    #[test]
    fn test_insert_replaces_same_type() {
        let mut ctx = RequestContext::new();
        assert!(ctx.insert(UserId("1".into())).is_none());
        assert_eq!(ctx.insert(UserId("2".into())), Some(UserId("1".into())));
        assert_eq!(ctx.get::<UserId>(), Some(&UserId("2".into())));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_remove_and_contains() {
        let mut ctx = RequestContext::new().with(42u32);
        assert!(ctx.contains::<u32>());
        assert_eq!(ctx.remove::<u32>(), Some(42));
        assert!(ctx.is_empty());
    }
}
