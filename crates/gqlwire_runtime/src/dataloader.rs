//! Batch loaders and the per-request [`DataLoader`].
//!
//! A [`BatchLoader`] is the long-lived, shared handler that resolves many
//! keys at once. A [`DataLoader`] wraps one batch loader for the duration of
//! a single request: `load` queues keys, `dispatch` hands the queued keys to
//! the batch loader and settles every waiting future.

use crate::context::{ContextSupplier, RequestContext, SharedContext};
use crate::handler::HandlerError;
use crate::loader_registry::{DispatchRegistry, RegistryHandle};
use async_trait::async_trait;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::ops::Add;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;

/// Resolves a batch of keys.
///
/// Implementations return exactly one value per key, in key order.
#[async_trait]
pub trait BatchLoader: Send + Sync {
    /// Loads the values for a batch of keys.
    async fn load(
        &self,
        keys: Vec<Value>,
        environment: &LoaderEnvironment,
    ) -> Result<Vec<Value>, HandlerError>;

    /// Returns true if the loader wants a handle to its dispatch registry.
    fn consumes_registry(&self) -> bool {
        false
    }
}

/// What a batch loader sees about the request it runs in.
#[derive(Clone, Default)]
pub struct LoaderEnvironment {
    name: String,
    context: Option<ContextSupplier>,
    registry: Option<RegistryHandle>,
}

impl LoaderEnvironment {
    /// Creates a new environment for the named loader.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: None,
            registry: None,
        }
    }

    /// Sets the context supplier.
    #[must_use]
    pub fn with_context(mut self, supplier: ContextSupplier) -> Self {
        self.context = Some(supplier);
        self
    }

    pub(crate) fn with_registry(mut self, registry: RegistryHandle) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Returns the loader name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the request context.
    pub fn context(&self) -> SharedContext {
        match &self.context {
            Some(supplier) => supplier(),
            None => Arc::new(RequestContext::new()),
        }
    }

    /// Returns the dispatch registry of the request, for registry consumers.
    pub fn registry(&self) -> Option<DispatchRegistry> {
        self.registry.as_ref()?.upgrade()
    }
}

impl fmt::Debug for LoaderEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderEnvironment")
            .field("name", &self.name)
            .field("has_context", &self.context.is_some())
            .field("has_registry", &self.registry.is_some())
            .finish()
    }
}

type BatchFn = Arc<
    dyn Fn(Vec<Value>, LoaderEnvironment) -> BoxFuture<'static, Result<Vec<Value>, HandlerError>>
        + Send
        + Sync,
>;

/// A batch loader backed by a closure.
pub struct FnBatchLoader {
    func: BatchFn,
    consumes_registry: bool,
}

impl FnBatchLoader {
    /// Creates a loader from a closure returning one value per key.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>, LoaderEnvironment) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Value>, HandlerError>> + Send + 'static,
    {
        Self {
            func: Arc::new(move |keys, env| f(keys, env).boxed()),
            consumes_registry: false,
        }
    }

    /// Creates a loader from a closure returning a map of results.
    ///
    /// Values are looked up by the [`cache_key`] of each key; a key without
    /// a value resolves to null.
    pub fn mapped<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>, LoaderEnvironment) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<FxHashMap<String, Value>, HandlerError>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self {
            func: Arc::new(move |keys, env| {
                let f = Arc::clone(&f);
                async move {
                    let mut found = f(keys.clone(), env).await?;
                    Ok::<_, HandlerError>(keys
                        .iter()
                        .map(|k| found.remove(&cache_key(k)).unwrap_or(Value::Null))
                        .collect())
                }
                .boxed()
            }),
            consumes_registry: false,
        }
    }

    /// Asks for a handle to the dispatch registry.
    #[must_use]
    pub fn consuming_registry(mut self) -> Self {
        self.consumes_registry = true;
        self
    }
}

impl fmt::Debug for FnBatchLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBatchLoader")
            .field("consumes_registry", &self.consumes_registry)
            .finish()
    }
}

#[async_trait]
impl BatchLoader for FnBatchLoader {
    async fn load(
        &self,
        keys: Vec<Value>,
        environment: &LoaderEnvironment,
    ) -> Result<Vec<Value>, HandlerError> {
        (self.func)(keys, environment.clone()).await
    }

    fn consumes_registry(&self) -> bool {
        self.consumes_registry
    }
}

/// Builds the cache key of a loader key.
///
/// The key is the JSON text of the value, so `1` and `"1"` stay distinct.
pub fn cache_key(key: &Value) -> String {
    key.to_string()
}

/// Per-loader behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    pub caching: bool,
    pub batching: bool,
    pub max_batch_size: Option<usize>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            caching: true,
            batching: true,
            max_batch_size: None,
        }
    }
}

impl LoaderOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables caching.
    #[must_use]
    pub fn caching(mut self, enabled: bool) -> Self {
        self.caching = enabled;
        self
    }

    /// Enables or disables batching.
    #[must_use]
    pub fn batching(mut self, enabled: bool) -> Self {
        self.batching = enabled;
        self
    }

    /// Sets the maximum batch size; zero means unbounded.
    #[must_use]
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = (size > 0).then_some(size);
        self
    }
}

/// A batch failure, delivered to every waiter of the batch.
#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    #[error("Batch loader `{loader}` failed: {error}")]
    Handler { loader: String, error: HandlerError },

    #[error("Batch loader `{loader}` returned {actual} values for {expected} keys")]
    LengthMismatch {
        loader: String,
        expected: usize,
        actual: usize,
    },

    #[error("Key was dropped from batch loader `{loader}` before dispatch")]
    Cancelled { loader: String },
}

impl LoaderError {
    /// Converts into a handler error, unwrapping handler failures.
    pub fn into_handler_error(self) -> HandlerError {
        match self {
            Self::Handler { error, .. } => error,
            other => HandlerError::new(other),
        }
    }
}

/// Counters of one loader or a whole registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub load_count: usize,
    pub batch_invoke_count: usize,
    pub batch_load_count: usize,
    pub cache_hit_count: usize,
    pub error_count: usize,
}

impl Statistics {
    /// Adds two sets of counters.
    pub fn combine(self, other: Statistics) -> Statistics {
        Statistics {
            load_count: self.load_count + other.load_count,
            batch_invoke_count: self.batch_invoke_count + other.batch_invoke_count,
            batch_load_count: self.batch_load_count + other.batch_load_count,
            cache_hit_count: self.cache_hit_count + other.cache_hit_count,
            error_count: self.error_count + other.error_count,
        }
    }
}

impl Add for Statistics {
    type Output = Statistics;

    fn add(self, other: Statistics) -> Statistics {
        self.combine(other)
    }
}

#[derive(Debug, Default)]
struct Counters {
    loads: AtomicUsize,
    batch_invokes: AtomicUsize,
    batch_loads: AtomicUsize,
    cache_hits: AtomicUsize,
    errors: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> Statistics {
        Statistics {
            load_count: self.loads.load(Ordering::Relaxed),
            batch_invoke_count: self.batch_invokes.load(Ordering::Relaxed),
            batch_load_count: self.batch_loads.load(Ordering::Relaxed),
            cache_hit_count: self.cache_hits.load(Ordering::Relaxed),
            error_count: self.errors.load(Ordering::Relaxed),
        }
    }
}

type Waiter = oneshot::Sender<Result<Value, LoaderError>>;

struct PendingKey {
    key: Value,
    waiters: Vec<Waiter>,
}

struct LoaderState {
    pending: Vec<PendingKey>,
    slots: FxHashMap<String, usize>,
    cache: FxHashMap<String, Value>,
    last_dispatch: Instant,
}

struct LoaderInner {
    name: String,
    batch_loader: Arc<dyn BatchLoader>,
    options: LoaderOptions,
    environment: LoaderEnvironment,
    state: Mutex<LoaderState>,
    counters: Counters,
}

impl LoaderInner {
    fn state(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn call(&self, keys: Vec<Value>) -> Result<Vec<Value>, LoaderError> {
        let expected = keys.len();
        self.counters.batch_invokes.fetch_add(1, Ordering::Relaxed);
        self.counters.batch_loads.fetch_add(expected, Ordering::Relaxed);

        let result = match self.batch_loader.load(keys, &self.environment).await {
            Ok(values) if values.len() == expected => Ok(values),
            Ok(values) => Err(LoaderError::LengthMismatch {
                loader: self.name.clone(),
                expected,
                actual: values.len(),
            }),
            Err(error) => Err(LoaderError::Handler {
                loader: self.name.clone(),
                error,
            }),
        };
        if result.is_err() {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn remember(&self, key: &Value, value: &Value) {
        if self.options.caching {
            self.state().cache.insert(cache_key(key), value.clone());
        }
    }

    async fn run_batch(&self, batch: Vec<PendingKey>) {
        let keys = batch.iter().map(|p| p.key.clone()).collect();
        match self.call(keys).await {
            Ok(values) => {
                for (pending, value) in batch.into_iter().zip(values) {
                    self.remember(&pending.key, &value);
                    for waiter in pending.waiters {
                        let _ = waiter.send(Ok(value.clone()));
                    }
                }
            }
            Err(error) => {
                for pending in batch {
                    for waiter in pending.waiters {
                        let _ = waiter.send(Err(error.clone()));
                    }
                }
            }
        }
    }
}

/// A request-scoped batching and caching loader.
///
/// Cloning yields another handle to the same queue and cache.
#[derive(Clone)]
pub struct DataLoader {
    inner: Arc<LoaderInner>,
}

impl DataLoader {
    /// Creates a new loader.
    pub fn new(
        name: impl Into<String>,
        batch_loader: Arc<dyn BatchLoader>,
        options: LoaderOptions,
        environment: LoaderEnvironment,
    ) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                name: name.into(),
                batch_loader,
                options,
                environment,
                state: Mutex::new(LoaderState {
                    pending: Vec::new(),
                    slots: FxHashMap::default(),
                    cache: FxHashMap::default(),
                    last_dispatch: Instant::now(),
                }),
                counters: Counters::default(),
            }),
        }
    }

    /// Returns the loader name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the options.
    pub fn options(&self) -> LoaderOptions {
        self.inner.options
    }

    /// Queues a key and returns a future settled by the next dispatch.
    ///
    /// The key is queued before this returns, so the future may be awaited
    /// after calling [`DataLoader::dispatch`].
    pub fn load(&self, key: Value) -> BoxFuture<'static, Result<Value, LoaderError>> {
        let inner = Arc::clone(&self.inner);
        inner.counters.loads.fetch_add(1, Ordering::Relaxed);

        let slot_key = cache_key(&key);
        if inner.options.caching {
            if let Some(hit) = inner.state().cache.get(&slot_key).cloned() {
                inner.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                return futures_util::future::ready(Ok::<_, LoaderError>(hit)).boxed();
            }
        }

        if !inner.options.batching {
            return async move {
                let value = inner
                    .call(vec![key.clone()])
                    .await?
                    .into_iter()
                    .next()
                    .unwrap_or(Value::Null);
                inner.remember(&key, &value);
                Ok::<_, LoaderError>(value)
            }
            .boxed();
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut state = inner.state();
            let shared = if inner.options.caching {
                state.slots.get(&slot_key).copied()
            } else {
                None
            };
            match shared {
                Some(index) => state.pending[index].waiters.push(tx),
                None => {
                    let index = state.pending.len();
                    state.pending.push(PendingKey {
                        key,
                        waiters: vec![tx],
                    });
                    if inner.options.caching {
                        state.slots.insert(slot_key, index);
                    }
                }
            }
        }

        let loader = inner.name.clone();
        async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(LoaderError::Cancelled { loader }),
            }
        }
        .boxed()
    }

    /// Queues several keys.
    pub fn load_many(
        &self,
        keys: impl IntoIterator<Item = Value>,
    ) -> BoxFuture<'static, Vec<Result<Value, LoaderError>>> {
        let futures: Vec<_> = keys.into_iter().map(|k| self.load(k)).collect();
        join_all(futures).boxed()
    }

    /// Dispatches every queued key and waits for the batches to settle.
    ///
    /// Returns the number of keys dispatched.
    pub async fn dispatch(&self) -> usize {
        let pending = {
            let mut state = self.inner.state();
            state.slots.clear();
            state.last_dispatch = Instant::now();
            std::mem::take(&mut state.pending)
        };
        let count = pending.len();
        if count == 0 {
            return 0;
        }

        let size = self.inner.options.max_batch_size.unwrap_or(count);
        let mut batches = Vec::new();
        let mut rest = pending;
        while rest.len() > size {
            let tail = rest.split_off(size);
            batches.push(rest);
            rest = tail;
        }
        batches.push(rest);

        join_all(batches.into_iter().map(|batch| self.inner.run_batch(batch))).await;
        count
    }

    /// Returns the number of queued keys.
    pub fn dispatch_depth(&self) -> usize {
        self.inner.state().pending.len()
    }

    /// Returns the time since the last dispatch.
    pub fn since_last_dispatch(&self) -> Duration {
        self.inner.state().last_dispatch.elapsed()
    }

    /// Caches a value unless the key is already cached.
    pub fn prime(&self, key: Value, value: Value) -> &Self {
        if self.inner.options.caching {
            self.inner
                .state()
                .cache
                .entry(cache_key(&key))
                .or_insert(value);
        }
        self
    }

    /// Removes a key from the cache.
    pub fn clear_key(&self, key: &Value) -> &Self {
        self.inner.state().cache.remove(&cache_key(key));
        self
    }

    /// Empties the cache.
    pub fn clear(&self) -> &Self {
        self.inner.state().cache.clear();
        self
    }

    /// Returns the counters.
    pub fn statistics(&self) -> Statistics {
        self.inner.counters.snapshot()
    }
}

impl fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoader")
            .field("name", &self.inner.name)
            .field("options", &self.inner.options)
            .field("dispatch_depth", &self.dispatch_depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn doubling(calls: Arc<StdMutex<Vec<Vec<Value>>>>) -> Arc<dyn BatchLoader> {
        Arc::new(FnBatchLoader::new(move |keys: Vec<Value>, _env| {
            calls.lock().unwrap().push(keys.clone());
            async move {
                Ok::<_, HandlerError>(
                    keys.iter()
                        .map(|k| json!(k.as_i64().unwrap_or_default() * 2))
                        .collect(),
                )
            }
        }))
    }

    fn loader(options: LoaderOptions) -> (DataLoader, Arc<StdMutex<Vec<Vec<Value>>>>) {
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let loader = DataLoader::new(
            "numbers",
            doubling(calls.clone()),
            options,
            LoaderEnvironment::new("numbers"),
        );
        (loader, calls)
    }

    #[tokio::test]
    async fn test_batches_and_deduplicates() {
        let (loader, calls) = loader(LoaderOptions::new());
        let a = loader.load(json!(1));
        let b = loader.load(json!(2));
        let c = loader.load(json!(1));
        assert_eq!(loader.dispatch_depth(), 2);

        assert_eq!(loader.dispatch().await, 2);
        assert_eq!(a.await.unwrap(), json!(2));
        assert_eq!(b.await.unwrap(), json!(4));
        assert_eq!(c.await.unwrap(), json!(2));
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(loader.dispatch_depth(), 0);

        assert_eq!(loader.load(json!(2)).await.unwrap(), json!(4));
        let stats = loader.statistics();
        assert_eq!(stats.load_count, 4);
        assert_eq!(stats.cache_hit_count, 1);
        assert_eq!(stats.batch_invoke_count, 1);
        assert_eq!(stats.batch_load_count, 2);
    }

    #[tokio::test]
    async fn test_load_waits_for_dispatch() {
        let (loader, _) = loader(LoaderOptions::new());
        let mut pending = tokio_test::task::spawn(loader.load(json!(3)));
        tokio_test::assert_pending!(pending.poll());
        tokio_test::assert_pending!(pending.poll());

        loader.dispatch().await;
        assert!(pending.is_woken());
        let value = tokio_test::assert_ready!(pending.poll());
        assert_eq!(value.unwrap(), json!(6));
    }

    #[tokio::test]
    async fn test_without_caching_keys_repeat() {
        let (loader, calls) = loader(LoaderOptions::new().caching(false));
        let futures = loader.load_many(vec![json!(1), json!(1)]);
        assert_eq!(loader.dispatch_depth(), 2);
        loader.dispatch().await;
        let values: Vec<_> = futures.await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![json!(2), json!(2)]);
        assert_eq!(calls.lock().unwrap()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_without_batching_calls_immediately() {
        let (loader, calls) = loader(LoaderOptions::new().batching(false));
        assert_eq!(loader.load(json!(5)).await.unwrap(), json!(10));
        assert_eq!(loader.dispatch_depth(), 0);
        assert_eq!(calls.lock().unwrap().as_slice(), &[vec![json!(5)]]);
    }

    #[tokio::test]
    async fn test_max_batch_size_splits() {
        let (loader, calls) = loader(LoaderOptions::new().max_batch_size(2));
        let futures = loader.load_many((1..=5).map(|i| json!(i)));
        assert_eq!(loader.dispatch().await, 5);
        assert_eq!(futures.await.len(), 5);

        let mut sizes: Vec<_> = calls.lock().unwrap().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn test_length_mismatch_fails_every_waiter() {
        let short: Arc<dyn BatchLoader> =
            Arc::new(FnBatchLoader::new(|_keys, _env| async { Ok::<_, HandlerError>(vec![json!(1)]) }));
        let loader = DataLoader::new("short", short, LoaderOptions::new(), LoaderEnvironment::new("short"));
        let a = loader.load(json!("a"));
        let b = loader.load(json!("b"));
        loader.dispatch().await;

        for result in [a.await, b.await] {
            assert!(matches!(
                result,
                Err(LoaderError::LengthMismatch { expected: 2, actual: 1, .. })
            ));
        }
        assert_eq!(loader.statistics().error_count, 1);
    }

    #[tokio::test]
    async fn test_handler_error_is_not_cached() {
        let failing: Arc<dyn BatchLoader> = Arc::new(FnBatchLoader::new(|_keys, _env| async {
            Err::<Vec<Value>, _>(HandlerError::msg("database down"))
        }));
        let loader = DataLoader::new("failing", failing, LoaderOptions::new(), LoaderEnvironment::new("failing"));
        let pending = loader.load(json!(1));
        loader.dispatch().await;

        let err = pending.await.unwrap_err();
        assert_eq!(err.clone().into_handler_error().message(), "database down");
        assert!(err.to_string().contains("`failing`"));

        let _again = loader.load(json!(1));
        assert_eq!(loader.dispatch_depth(), 1);
    }

    #[tokio::test]
    async fn test_prime_and_clear() {
        let (loader, calls) = loader(LoaderOptions::new());
        loader.prime(json!(3), json!("primed")).prime(json!(3), json!("ignored"));
        assert_eq!(loader.load(json!(3)).await.unwrap(), json!("primed"));

        loader.clear_key(&json!(3));
        let reloaded = loader.load(json!(3));
        loader.dispatch().await;
        assert_eq!(reloaded.await.unwrap(), json!(6));

        loader.clear();
        let _pending = loader.load(json!(3));
        assert_eq!(loader.dispatch_depth(), 1);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_keys_of_different_types_stay_apart() {
        let typed: Arc<dyn BatchLoader> = Arc::new(FnBatchLoader::new(|keys: Vec<Value>, _env| async move {
            Ok::<_, HandlerError>(
                keys.iter()
                    .map(|k| json!(if k.is_string() { "string" } else { "number" }))
                    .collect(),
            )
        }));
        let loader = DataLoader::new("typed", typed, LoaderOptions::new(), LoaderEnvironment::new("typed"));
        let number = loader.load(json!(1));
        let string = loader.load(json!("1"));
        assert_eq!(loader.dispatch_depth(), 2);

        loader.dispatch().await;
        assert_eq!(number.await.unwrap(), json!("number"));
        assert_eq!(string.await.unwrap(), json!("string"));
        assert_eq!(cache_key(&json!("1")), "\"1\"");
    }

    #[tokio::test]
    async fn test_mapped_loader() {
        let mapped: Arc<dyn BatchLoader> = Arc::new(FnBatchLoader::mapped(|keys: Vec<Value>, _env| async move {
            Ok::<_, HandlerError>(
                keys.into_iter()
                    .filter(|k| k != "missing")
                    .map(|k| (cache_key(&k), json!({ "id": k })))
                    .collect::<FxHashMap<_, _>>(),
            )
        }));
        let loader = DataLoader::new("shows", mapped, LoaderOptions::new(), LoaderEnvironment::new("shows"));
        let found = loader.load(json!("s1"));
        let missing = loader.load(json!("missing"));
        let number = loader.load(json!(1));
        loader.dispatch().await;

        assert_eq!(found.await.unwrap(), json!({ "id": "s1" }));
        assert_eq!(missing.await.unwrap(), Value::Null);
        assert_eq!(number.await.unwrap(), json!({ "id": 1 }));
    }

    #[tokio::test]
    async fn test_dropped_loader_cancels() {
        let (loader, _calls) = loader(LoaderOptions::new());
        let pending = loader.load(json!(1));
        drop(loader);
        assert!(matches!(pending.await, Err(LoaderError::Cancelled { .. })));
    }
}
