//! Data fetchers: the unit the execution engine calls for one field.

use crate::argument::{to_snake_case, ArgumentResolver, ArgumentResolverComposite};
use crate::environment::DataFetchingEnvironment;
use crate::handler::{
    HandlerError, HandlerFuture, HandlerResult, HandlerShape, HandlerStream, MethodHandler,
    ResolvedArguments,
};
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use gqlwire_core::{GraphQLError, ResolutionError};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Future returned by [`DataFetcher::fetch`].
pub type FetchFuture = BoxFuture<'static, Result<DataFetcherResult, HandlerError>>;

/// A value plus the errors collected while producing it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFetcherResult {
    pub data: Value,
    pub errors: Vec<GraphQLError>,
}

impl DataFetcherResult {
    /// Creates a result without errors.
    pub fn new(data: Value) -> Self {
        Self {
            data,
            errors: Vec::new(),
        }
    }

    /// Attaches errors.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<GraphQLError>) -> Self {
        self.errors = errors;
        self
    }

    /// Returns the value.
    pub fn value(&self) -> &Value {
        &self.data
    }

    /// Returns true if any error was collected.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Produces the value of one field.
pub trait DataFetcher: Send + Sync {
    /// Fetches the field value.
    fn fetch(&self, environment: DataFetchingEnvironment) -> FetchFuture;

    /// Opens a subscription stream, for fetchers backed by streaming handlers.
    fn subscribe(&self, _environment: DataFetchingEnvironment) -> Option<Result<HandlerStream, HandlerError>> {
        None
    }
}

/// A shared data fetcher.
pub type SharedDataFetcher = Arc<dyn DataFetcher>;

/// Wraps a handler future into a fetch future.
fn into_fetch(future: HandlerFuture) -> FetchFuture {
    future.map(|r| r.map(DataFetcherResult::new)).boxed()
}

fn failed(error: HandlerError) -> FetchFuture {
    futures_util::future::ready(Err::<DataFetcherResult, _>(error)).boxed()
}

/// Invokes a [`MethodHandler`] after resolving its parameters.
pub struct MethodDataFetcher {
    handler: Arc<MethodHandler>,
    resolvers: Arc<ArgumentResolverComposite>,
}

impl MethodDataFetcher {
    /// Creates a new method data fetcher.
    pub fn new(handler: Arc<MethodHandler>, resolvers: Arc<ArgumentResolverComposite>) -> Self {
        Self { handler, resolvers }
    }

    /// Returns the handler.
    pub fn handler(&self) -> &MethodHandler {
        &self.handler
    }

    /// Resolves every parameter of the handler.
    pub fn resolve_arguments(
        &self,
        environment: &DataFetchingEnvironment,
    ) -> Result<ResolvedArguments, ResolutionError> {
        let parameters = self.handler.parameters();
        let mut names = Vec::with_capacity(parameters.len());
        let mut values = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            let resolver = self.resolvers.resolver_for(parameter).ok_or_else(|| {
                ResolutionError::NoArgumentResolver {
                    index: parameter.index(),
                    handler: self.handler.qualified_name(),
                }
            })?;
            values.push(resolver.resolve(parameter, environment)?);
            names.push(parameter.name().to_string());
        }
        Ok(ResolvedArguments::new(names, values, environment.clone()))
    }

    fn invoke(&self, environment: DataFetchingEnvironment) -> Result<HandlerResult, HandlerError> {
        let arguments = self
            .resolve_arguments(&environment)
            .map_err(HandlerError::resolution)?;
        self.handler.invoke(arguments)
    }
}

impl fmt::Debug for MethodDataFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDataFetcher")
            .field("handler", &self.handler.qualified_name())
            .finish()
    }
}

impl DataFetcher for MethodDataFetcher {
    fn fetch(&self, environment: DataFetchingEnvironment) -> FetchFuture {
        match self.invoke(environment) {
            Ok(result) => into_fetch(result.into_future()),
            Err(error) => failed(error),
        }
    }

    fn subscribe(&self, environment: DataFetchingEnvironment) -> Option<Result<HandlerStream, HandlerError>> {
        if self.handler.shape() != HandlerShape::Stream {
            return None;
        }
        Some(self.invoke(environment).map(|result| match result {
            HandlerResult::Stream(stream) => stream,
            HandlerResult::Value(value) => {
                futures_util::stream::once(async move { Ok::<_, HandlerError>(value) }).boxed()
            }
            HandlerResult::Deferred(future) => futures_util::stream::once(future).boxed(),
        }))
    }
}

/// A data fetcher backed by a closure.
pub struct FnDataFetcher {
    func: Arc<dyn Fn(DataFetchingEnvironment) -> FetchFuture + Send + Sync>,
}

impl FnDataFetcher {
    /// Creates a fetcher from a synchronous closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&DataFetchingEnvironment) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(move |env| {
                let result = f(&env).map(DataFetcherResult::new);
                futures_util::future::ready(result).boxed()
            }),
        }
    }

    /// Creates a fetcher from an asynchronous closure.
    pub fn new_async<F, Fut>(f: F) -> Self
    where
        F: Fn(DataFetchingEnvironment) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Self {
            func: Arc::new(move |env| into_fetch(f(env).boxed())),
        }
    }

    /// Creates a fetcher returning partial results.
    pub fn with_result<F, Fut>(f: F) -> Self
    where
        F: Fn(DataFetchingEnvironment) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DataFetcherResult, HandlerError>> + Send + 'static,
    {
        Self {
            func: Arc::new(move |env| f(env).boxed()),
        }
    }
}

impl fmt::Debug for FnDataFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnDataFetcher")
    }
}

impl DataFetcher for FnDataFetcher {
    fn fetch(&self, environment: DataFetchingEnvironment) -> FetchFuture {
        (self.func)(environment)
    }
}

/// Default fetcher that reads the field from the parent value.
///
/// Falls back to the snake_case spelling of the field name.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyDataFetcher;

impl PropertyDataFetcher {
    /// Reads a property synchronously.
    pub fn read(source: &Value, field: &str) -> Result<Value, HandlerError> {
        match source {
            Value::Object(map) => Ok(map
                .get(field)
                .or_else(|| map.get(&to_snake_case(field)))
                .cloned()
                .unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            _ => Err(HandlerError::msg(format!(
                "Cannot read field `{}` from a non-object value",
                field
            ))),
        }
    }
}

impl DataFetcher for PropertyDataFetcher {
    fn fetch(&self, environment: DataFetchingEnvironment) -> FetchFuture {
        let result = Self::read(environment.source(), &environment.coordinates().field)
            .map(DataFetcherResult::new);
        futures_util::future::ready(result).boxed()
    }
}
