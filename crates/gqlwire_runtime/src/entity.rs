//! Typename-keyed entity fetchers.

use crate::environment::DataFetchingEnvironment;
use crate::handler::{HandlerError, HandlerResult};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type RepresentationFn =
    Arc<dyn Fn(Map<String, Value>) -> Result<HandlerResult, HandlerError> + Send + Sync>;
type EnvironmentFn = Arc<
    dyn Fn(Map<String, Value>, DataFetchingEnvironment) -> Result<HandlerResult, HandlerError>
        + Send
        + Sync,
>;

/// Resolves one federated representation into an entity.
///
/// Whether the handler wants the environment is fixed when it is created.
#[derive(Clone)]
pub enum EntityHandler {
    Representation(RepresentationFn),
    WithEnvironment(EnvironmentFn),
}

impl EntityHandler {
    /// Creates a handler that receives only the representation.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Result<HandlerResult, HandlerError> + Send + Sync + 'static,
    {
        Self::Representation(Arc::new(f))
    }

    /// Creates a handler that also receives the environment.
    pub fn with_environment<F>(f: F) -> Self
    where
        F: Fn(Map<String, Value>, DataFetchingEnvironment) -> Result<HandlerResult, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        Self::WithEnvironment(Arc::new(f))
    }

    /// Creates a handler from an async closure.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Self::new(move |representation| Ok(HandlerResult::deferred(f(representation))))
    }

    /// Returns true if the handler takes the environment.
    pub fn accepts_environment(&self) -> bool {
        matches!(self, Self::WithEnvironment(_))
    }

    /// Invokes the handler.
    pub fn invoke(
        &self,
        representation: Map<String, Value>,
        environment: &DataFetchingEnvironment,
    ) -> Result<HandlerResult, HandlerError> {
        match self {
            Self::Representation(f) => f(representation),
            Self::WithEnvironment(f) => f(representation, environment.clone()),
        }
    }
}

impl fmt::Debug for EntityHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Representation(_) => f.write_str("EntityHandler::Representation"),
            Self::WithEnvironment(_) => f.write_str("EntityHandler::WithEnvironment"),
        }
    }
}

/// A registered entity fetcher.
#[derive(Debug, Clone)]
pub struct EntityFetcherEntry {
    pub typename: String,
    pub owner: String,
    pub handler: EntityHandler,
}

/// Entity fetchers keyed by typename.
#[derive(Debug, Clone, Default)]
pub struct EntityFetcherRegistry {
    entries: IndexMap<String, EntityFetcherEntry>,
}

impl EntityFetcherRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fetcher; a later registration for the same typename
    /// replaces the earlier one.
    pub fn put(&mut self, typename: impl Into<String>, owner: impl Into<String>, handler: EntityHandler) {
        let typename = typename.into();
        self.entries.insert(
            typename.clone(),
            EntityFetcherEntry {
                typename,
                owner: owner.into(),
                handler,
            },
        );
    }

    /// Gets the fetcher for a typename.
    pub fn get(&self, typename: &str) -> Option<&EntityFetcherEntry> {
        self.entries.get(typename)
    }

    /// Returns the registered typenames.
    pub fn typenames(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlwire_core::FieldCoordinates;
    use serde_json::json;

    #[tokio::test]
    async fn test_last_put_wins() {
        let mut registry = EntityFetcherRegistry::new();
        registry.put("Show", "First", EntityHandler::new(|_| Ok(json!(1).into())));
        registry.put("Show", "Second", EntityHandler::new(|_| Ok(json!(2).into())));
        assert_eq!(registry.len(), 1);

        let entry = registry.get("Show").unwrap();
        assert_eq!(entry.owner, "Second");
        let env = DataFetchingEnvironment::new(FieldCoordinates::new("Query", "_entities"));
        let value = entry
            .handler
            .invoke(Map::new(), &env)
            .unwrap()
            .into_future()
            .await
            .unwrap();
        assert_eq!(value, json!(2));
    }

    #[test]
    fn test_environment_capability() {
        let plain = EntityHandler::future(|rep| async move { Ok(Value::Object(rep)) });
        let with_env = EntityHandler::with_environment(|_, env| {
            Ok(json!(env.coordinates().to_string()).into())
        });
        assert!(!plain.accepts_environment());
        assert!(with_env.accepts_environment());
    }
}
