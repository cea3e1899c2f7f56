//! Data loader definitions and the per-request dispatch registry.
//!
//! [`DataLoaderProvider`] is the definition table built once per schema
//! assembly. Every request asks it for a fresh [`DispatchRegistry`], which
//! owns one [`DataLoader`] per definition and decides when their queued keys
//! are dispatched.

use crate::context::ContextSupplier;
use crate::dataloader::{
    BatchLoader, DataLoader, LoaderEnvironment, LoaderOptions, Statistics,
};
use crate::handler::HandlerError;
use async_trait::async_trait;
use futures_util::future::join_all;
use gqlwire_core::ConfigurationError;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Decides whether a loader's queued keys should be dispatched now.
pub trait DispatchPredicate: Send + Sync {
    /// Returns true if the loader should be dispatched.
    fn should_dispatch(&self, name: &str, loader: &DataLoader) -> bool;
}

impl<F> DispatchPredicate for F
where
    F: Fn(&str, &DataLoader) -> bool + Send + Sync,
{
    fn should_dispatch(&self, name: &str, loader: &DataLoader) -> bool {
        self(name, loader)
    }
}

/// Dispatches once at least `n` keys are queued.
#[derive(Debug, Clone, Copy)]
pub struct DepthPredicate(pub usize);

impl DispatchPredicate for DepthPredicate {
    fn should_dispatch(&self, _name: &str, loader: &DataLoader) -> bool {
        loader.dispatch_depth() >= self.0
    }
}

/// Dispatches once the given time has passed since the last dispatch.
#[derive(Debug, Clone, Copy)]
pub struct ElapsedPredicate(pub Duration);

impl DispatchPredicate for ElapsedPredicate {
    fn should_dispatch(&self, _name: &str, loader: &DataLoader) -> bool {
        loader.since_last_dispatch() >= self.0
    }
}

/// Decorates batch loaders as they are built.
pub trait DataLoaderInstrumentation: Send + Sync {
    /// Returns the loader to use in place of `loader`.
    fn provide(&self, loader: Arc<dyn BatchLoader>, name: &str) -> Arc<dyn BatchLoader>;
}

/// Logs every batch call with its size and duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInstrumentation;

impl DataLoaderInstrumentation for LoggingInstrumentation {
    fn provide(&self, loader: Arc<dyn BatchLoader>, name: &str) -> Arc<dyn BatchLoader> {
        Arc::new(LoggingBatchLoader {
            name: name.to_string(),
            inner: loader,
        })
    }
}

struct LoggingBatchLoader {
    name: String,
    inner: Arc<dyn BatchLoader>,
}

#[async_trait]
impl BatchLoader for LoggingBatchLoader {
    async fn load(
        &self,
        keys: Vec<Value>,
        environment: &LoaderEnvironment,
    ) -> Result<Vec<Value>, HandlerError> {
        let start = Instant::now();
        let count = keys.len();
        let result = self.inner.load(keys, environment).await;
        debug!(
            loader = %self.name,
            keys = count,
            ok = result.is_ok(),
            "Batch load took {}ms",
            start.elapsed().as_millis()
        );
        result
    }

    fn consumes_registry(&self) -> bool {
        self.inner.consumes_registry()
    }
}

/// One named batch loader and how to run it.
#[derive(Clone)]
pub struct BatchLoaderDefinition {
    name: String,
    loader: Arc<dyn BatchLoader>,
    consumes_registry: bool,
    caching: bool,
    batching: bool,
    max_batch_size: usize,
    predicate: Option<Arc<dyn DispatchPredicate>>,
}

impl BatchLoaderDefinition {
    /// Creates a new definition with caching and batching enabled.
    pub fn new(name: impl Into<String>, loader: Arc<dyn BatchLoader>) -> Self {
        let consumes_registry = loader.consumes_registry();
        Self {
            name: name.into(),
            loader,
            consumes_registry,
            caching: true,
            batching: true,
            max_batch_size: 0,
            predicate: None,
        }
    }

    #[must_use]
    pub fn caching(mut self, enabled: bool) -> Self {
        self.caching = enabled;
        self
    }

    #[must_use]
    pub fn batching(mut self, enabled: bool) -> Self {
        self.batching = enabled;
        self
    }

    /// Sets the maximum batch size; only values above zero apply.
    #[must_use]
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Puts the loader in its own dispatch group.
    #[must_use]
    pub fn dispatch_predicate(mut self, predicate: Arc<dyn DispatchPredicate>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub(crate) fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the loader name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the loader receives a handle to its registry.
    pub fn consumes_registry(&self) -> bool {
        self.consumes_registry
    }

    /// Returns true if a dispatch predicate is attached.
    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    /// Builds the loader options.
    pub fn options(&self) -> LoaderOptions {
        let options = LoaderOptions::new()
            .caching(self.caching)
            .batching(self.batching);
        if self.max_batch_size > 0 {
            options.max_batch_size(self.max_batch_size)
        } else {
            options
        }
    }
}

impl fmt::Debug for BatchLoaderDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchLoaderDefinition")
            .field("name", &self.name)
            .field("options", &self.options())
            .field("has_predicate", &self.predicate.is_some())
            .field("consumes_registry", &self.consumes_registry)
            .finish()
    }
}

/// Where a loader was declared on its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderScope {
    /// Declared by the component itself; defaults to the component name.
    Component,
    /// Declared on a field of the component; must be named.
    Field,
}

/// The definition table of data loaders.
#[derive(Default)]
pub struct DataLoaderProvider {
    definitions: IndexMap<String, BatchLoaderDefinition>,
    instrumentation: Vec<Arc<dyn DataLoaderInstrumentation>>,
}

impl DataLoaderProvider {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instrumentation provider, applied in insertion order.
    #[must_use]
    pub fn with_instrumentation(mut self, provider: Arc<dyn DataLoaderInstrumentation>) -> Self {
        self.instrumentation.push(provider);
        self
    }

    pub(crate) fn set_instrumentation(&mut self, providers: Vec<Arc<dyn DataLoaderInstrumentation>>) {
        self.instrumentation = providers;
    }

    /// Registers a definition.
    pub fn register(&mut self, definition: BatchLoaderDefinition) -> Result<(), ConfigurationError> {
        if self.definitions.contains_key(definition.name()) {
            return Err(ConfigurationError::DuplicateDataLoader {
                name: definition.name().to_string(),
            });
        }
        debug!(loader = definition.name(), "Registered data loader");
        self.definitions
            .insert(definition.name().to_string(), definition);
        Ok(())
    }

    /// Registers a loader declared on a component, applying the naming rules.
    pub fn register_declared(
        &mut self,
        component: &str,
        decorated: bool,
        scope: LoaderScope,
        definition: BatchLoaderDefinition,
    ) -> Result<(), ConfigurationError> {
        let definition = match scope {
            LoaderScope::Component if definition.name().trim().is_empty() => {
                let simple = component.rsplit("::").next().unwrap_or(component);
                definition.rename(simple)
            }
            LoaderScope::Component => definition,
            LoaderScope::Field if definition.name().trim().is_empty() => {
                return Err(ConfigurationError::UnnamedDataLoaderOnField {
                    component: component.to_string(),
                });
            }
            LoaderScope::Field if decorated => {
                return Err(ConfigurationError::DecoratedDataLoader {
                    component: component.to_string(),
                    name: definition.name().to_string(),
                });
            }
            LoaderScope::Field => definition,
        };
        self.register(definition)
    }

    /// Returns a definition by name.
    pub fn get(&self, name: &str) -> Option<&BatchLoaderDefinition> {
        self.definitions.get(name)
    }

    /// Returns the registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Returns the number of definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Builds a fresh dispatch registry for one request.
    pub fn build_dispatch_registry(&self) -> DispatchRegistry {
        self.build(None)
    }

    /// Builds a fresh dispatch registry whose loaders see the given context.
    pub fn build_dispatch_registry_with_context(&self, supplier: ContextSupplier) -> DispatchRegistry {
        self.build(Some(supplier))
    }

    fn build(&self, supplier: Option<ContextSupplier>) -> DispatchRegistry {
        let inner = Arc::new_cyclic(|weak: &Weak<RegistryInner>| {
            let mut loaders = IndexMap::with_capacity(self.definitions.len());
            let mut groups = Vec::new();
            let mut default_group = Vec::new();

            for (name, definition) in &self.definitions {
                let mut environment = LoaderEnvironment::new(name.clone());
                if let Some(supplier) = &supplier {
                    environment = environment.with_context(Arc::clone(supplier));
                }
                if definition.consumes_registry {
                    environment = environment.with_registry(RegistryHandle(weak.clone()));
                }

                let batch_loader = self
                    .instrumentation
                    .iter()
                    .fold(Arc::clone(&definition.loader), |loader, provider| {
                        provider.provide(loader, name)
                    });

                let loader = DataLoader::new(
                    name.clone(),
                    batch_loader,
                    definition.options(),
                    environment,
                );
                match &definition.predicate {
                    Some(predicate) => groups.push(DispatchGroup {
                        name: name.clone(),
                        predicate: Arc::clone(predicate),
                    }),
                    None => default_group.push(name.clone()),
                }
                loaders.insert(name.clone(), loader);
            }

            RegistryInner {
                loaders,
                groups,
                default_group,
            }
        });
        DispatchRegistry { inner }
    }
}

impl fmt::Debug for DataLoaderProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoaderProvider")
            .field("definitions", &self.definitions.len())
            .field("instrumentation", &self.instrumentation.len())
            .finish()
    }
}

/// Returned by [`DispatchRegistry::combine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Dispatch registries cannot be combined; build one per request")]
pub struct Unsupported;

struct DispatchGroup {
    name: String,
    predicate: Arc<dyn DispatchPredicate>,
}

struct RegistryInner {
    loaders: IndexMap<String, DataLoader>,
    groups: Vec<DispatchGroup>,
    default_group: Vec<String>,
}

/// A weak handle handed to registry-consuming batch loaders.
#[derive(Clone)]
pub struct RegistryHandle(Weak<RegistryInner>);

impl RegistryHandle {
    /// Returns the registry if the request is still alive.
    pub fn upgrade(&self) -> Option<DispatchRegistry> {
        self.0.upgrade().map(|inner| DispatchRegistry { inner })
    }
}

/// The data loaders of one request.
#[derive(Clone)]
pub struct DispatchRegistry {
    inner: Arc<RegistryInner>,
}

impl DispatchRegistry {
    /// Gets a loader by name.
    pub fn get(&self, name: &str) -> Option<DataLoader> {
        self.inner.loaders.get(name).cloned()
    }

    /// Returns the loader names in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.loaders.keys().map(String::as_str)
    }

    /// Dispatches every loader and waits for all batches.
    pub async fn dispatch_all(&self) {
        self.dispatch_all_with_count().await;
    }

    /// Dispatches every loader, predicate groups first, and returns the
    /// number of keys dispatched.
    pub async fn dispatch_all_with_count(&self) -> usize {
        let mut count = 0;
        for group in &self.inner.groups {
            count += self.dispatch_names([group.name.as_str()]).await;
        }
        count + self
            .dispatch_names(self.inner.default_group.iter().map(String::as_str))
            .await
    }

    /// Dispatches the default group and every predicate group whose
    /// predicate currently holds.
    pub async fn dispatch_ready(&self) -> usize {
        let mut count = 0;
        for group in &self.inner.groups {
            let ready = self
                .inner
                .loaders
                .get(&group.name)
                .is_some_and(|loader| group.predicate.should_dispatch(&group.name, loader));
            if ready {
                count += self.dispatch_names([group.name.as_str()]).await;
            }
        }
        count + self
            .dispatch_names(self.inner.default_group.iter().map(String::as_str))
            .await
    }

    async fn dispatch_names<'a>(&'a self, names: impl IntoIterator<Item = &'a str>) -> usize {
        let dispatches = names
            .into_iter()
            .filter_map(|name| self.inner.loaders.get(name))
            .map(|loader| loader.dispatch());
        join_all(dispatches).await.into_iter().sum()
    }

    /// Returns the number of queued keys across all loaders.
    pub fn dispatch_depth(&self) -> usize {
        self.inner.loaders.values().map(DataLoader::dispatch_depth).sum()
    }

    /// Returns the combined counters of all loaders.
    pub fn statistics(&self) -> Statistics {
        self.inner
            .loaders
            .values()
            .map(DataLoader::statistics)
            .fold(Statistics::default(), Statistics::combine)
    }

    /// Always fails: registries hold per-request state.
    pub fn combine(&self, _other: &DispatchRegistry) -> Result<DispatchRegistry, Unsupported> {
        Err(Unsupported)
    }

    /// Returns the number of loaders.
    pub fn len(&self) -> usize {
        self.inner.loaders.len()
    }

    /// Returns true if the registry has no loaders.
    pub fn is_empty(&self) -> bool {
        self.inner.loaders.is_empty()
    }
}

impl fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRegistry")
            .field("loaders", &self.inner.loaders.len())
            .field("groups", &self.inner.groups.len())
            .field("dispatch_depth", &self.dispatch_depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataloader::FnBatchLoader;
    use serde_json::json;

    fn identity() -> Arc<dyn BatchLoader> {
        Arc::new(FnBatchLoader::new(|keys: Vec<Value>, _env| async move {
            Ok::<_, HandlerError>(keys)
        }))
    }

    fn provider() -> DataLoaderProvider {
        let mut provider = DataLoaderProvider::new();
        provider
            .register(BatchLoaderDefinition::new("shows", identity()))
            .unwrap();
        provider
            .register(
                BatchLoaderDefinition::new("reviews", identity())
                    .dispatch_predicate(Arc::new(DepthPredicate(2))),
            )
            .unwrap();
        provider
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut provider = provider();
        let err = provider
            .register(BatchLoaderDefinition::new("shows", identity()))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::DuplicateDataLoader {
                name: "shows".into()
            }
        );
    }

    #[test]
    fn test_declared_naming_rules() {
        let mut provider = DataLoaderProvider::new();
        provider
            .register_declared(
                "app::ShowsDataLoader",
                false,
                LoaderScope::Component,
                BatchLoaderDefinition::new("", identity()),
            )
            .unwrap();
        assert!(provider.get("ShowsDataLoader").is_some());

        let err = provider
            .register_declared(
                "ShowsFetcher",
                false,
                LoaderScope::Field,
                BatchLoaderDefinition::new(" ", identity()),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnnamedDataLoaderOnField { .. }));

        let err = provider
            .register_declared(
                "ShowsFetcher",
                true,
                LoaderScope::Field,
                BatchLoaderDefinition::new("ratings", identity()),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DecoratedDataLoader { .. }));
        assert_eq!(provider.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_depth_and_dispatch_all() {
        let registry = provider().build_dispatch_registry();
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["shows", "reviews"]);

        let shows = registry.get("shows").unwrap();
        let pending = shows.load_many(vec![json!("a"), json!("b"), json!("c")]);
        assert_eq!(registry.dispatch_depth(), 3);

        assert_eq!(registry.dispatch_all_with_count().await, 3);
        assert_eq!(registry.dispatch_depth(), 0);
        assert_eq!(pending.await.len(), 3);
        assert_eq!(registry.statistics().batch_invoke_count, 1);
    }

    #[tokio::test]
    async fn test_dispatch_ready_honors_predicates() {
        let registry = provider().build_dispatch_registry();
        let reviews = registry.get("reviews").unwrap();

        let _first = reviews.load(json!(1));
        assert_eq!(registry.dispatch_ready().await, 0);
        assert_eq!(registry.dispatch_depth(), 1);

        let _second = reviews.load(json!(2));
        assert_eq!(registry.dispatch_ready().await, 2);
        assert_eq!(registry.dispatch_depth(), 0);
    }

    #[tokio::test]
    async fn test_registries_do_not_share_state() {
        let provider = provider();
        let first = provider.build_dispatch_registry();
        let second = provider.build_dispatch_registry();

        let _pending = first.get("shows").unwrap().load(json!("x"));
        assert_eq!(first.dispatch_depth(), 1);
        assert_eq!(second.dispatch_depth(), 0);
        assert!(first.combine(&second).is_err());
    }

    #[tokio::test]
    async fn test_registry_consumer_receives_handle() {
        let consumer = FnBatchLoader::new(|keys: Vec<Value>, env: LoaderEnvironment| async move {
            let registry = env.registry().ok_or_else(|| HandlerError::msg("no registry"))?;
            Ok::<_, HandlerError>(keys.iter().map(|_| json!(registry.len())).collect())
        })
        .consuming_registry();

        let mut provider = DataLoaderProvider::new().with_instrumentation(Arc::new(LoggingInstrumentation));
        provider
            .register(BatchLoaderDefinition::new("counts", Arc::new(consumer)))
            .unwrap();
        assert!(provider.get("counts").unwrap().consumes_registry());

        let registry = provider.build_dispatch_registry();
        let pending = registry.get("counts").unwrap().load(json!(1));
        registry.dispatch_all().await;
        assert_eq!(pending.await.unwrap(), json!(1));
    }

    struct Tagging;

    impl DataLoaderInstrumentation for Tagging {
        fn provide(&self, loader: Arc<dyn BatchLoader>, name: &str) -> Arc<dyn BatchLoader> {
            let name = name.to_string();
            Arc::new(FnBatchLoader::new(move |keys: Vec<Value>, env: LoaderEnvironment| {
                let loader = Arc::clone(&loader);
                let name = name.clone();
                async move {
                    let values = loader.load(keys, &env).await?;
                    Ok::<_, HandlerError>(
                        values
                            .into_iter()
                            .map(|v| json!(format!("{}:{}", name, v)))
                            .collect(),
                    )
                }
            }))
        }
    }

    #[tokio::test]
    async fn test_instrumentation_wraps_in_order() {
        let mut provider = DataLoaderProvider::new()
            .with_instrumentation(Arc::new(Tagging))
            .with_instrumentation(Arc::new(LoggingInstrumentation));
        provider
            .register(BatchLoaderDefinition::new("shows", identity()).max_batch_size(0))
            .unwrap();
        assert_eq!(provider.get("shows").unwrap().options().max_batch_size, None);

        let registry = provider.build_dispatch_registry();
        let pending = registry.get("shows").unwrap().load(json!(7));
        registry.dispatch_all().await;
        assert_eq!(pending.await.unwrap(), json!("shows:7"));
    }

    #[tokio::test]
    async fn test_context_supplier_reaches_loader() {
        use crate::context::RequestContext;

        #[derive(Debug)]
        struct Tenant(&'static str);

        let tenant_loader = FnBatchLoader::new(|keys: Vec<Value>, env: LoaderEnvironment| async move {
            let context = env.context();
            let tenant = context.get::<Tenant>().map(|t| t.0).unwrap_or("none");
            Ok::<_, HandlerError>(keys.iter().map(|_| json!(tenant)).collect())
        });
        let mut provider = DataLoaderProvider::new();
        provider
            .register(BatchLoaderDefinition::new("tenant", Arc::new(tenant_loader)))
            .unwrap();

        let registry = provider.build_dispatch_registry_with_context(Arc::new(|| {
            Arc::new(RequestContext::new().with(Tenant("acme")))
        }));
        let pending = registry.get("tenant").unwrap().load(json!(1));
        registry.dispatch_all().await;
        assert_eq!(pending.await.unwrap(), json!("acme"));
    }
}
