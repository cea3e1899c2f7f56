//! Handler descriptors, handler results and handler errors.
//!
//! A [`MethodHandler`] is the explicit replacement for an annotated method:
//! a name, an ordered list of parameter descriptors and a function receiving
//! the resolved arguments. What the function returns is a [`HandlerResult`],
//! which is either ready, deferred or a stream, and is normalized by
//! [`HandlerResult::into_future`].

use crate::context::SharedContext;
use crate::environment::DataFetchingEnvironment;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, Stream, StreamExt, TryStreamExt};
use gqlwire_core::{BadRequestError, ErrorType, ResolutionError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Future produced by asynchronous handlers.
pub type HandlerFuture = BoxFuture<'static, Result<Value, HandlerError>>;

/// Stream produced by streaming handlers.
pub type HandlerStream = BoxStream<'static, Result<Value, HandlerError>>;

/// The shapes a handler may return.
pub enum HandlerResult {
    /// An immediate value.
    Value(Value),
    /// A value that settles later.
    Deferred(HandlerFuture),
    /// A sequence of values, collected into a list when normalized.
    Stream(HandlerStream),
}

impl HandlerResult {
    /// Wraps a future.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Self::Deferred(future.boxed())
    }

    /// Wraps a stream.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Value, HandlerError>> + Send + 'static,
    {
        Self::Stream(stream.boxed())
    }

    /// Serializes a value into an immediate result.
    pub fn serialize<T: serde::Serialize>(value: &T) -> Result<Self, HandlerError> {
        Ok(Self::Value(serde_json::to_value(value)?))
    }

    /// Returns true if no waiting is needed.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Normalizes every shape into one future.
    ///
    /// A stream settles to a list of its items; the first failing item fails
    /// the whole result.
    pub fn into_future(self) -> HandlerFuture {
        match self {
            Self::Value(value) => futures_util::future::ready(Ok::<_, HandlerError>(value)).boxed(),
            Self::Deferred(future) => future,
            Self::Stream(stream) => stream.try_collect::<Vec<_>>().map(|r| r.map(Value::Array)).boxed(),
        }
    }
}

impl From<Value> for HandlerResult {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for HandlerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// An error raised by user handler code.
///
/// Any `std::error::Error` converts into a `HandlerError` with `?`, recording
/// the type name of the original error for diagnostics.
#[derive(Clone)]
pub struct HandlerError {
    type_name: Cow<'static, str>,
    message: String,
    error_type: Option<ErrorType>,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    /// Wraps an error value.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            type_name: Cow::Borrowed(std::any::type_name::<E>()),
            message: error.to_string(),
            error_type: None,
            source: Some(Arc::new(error)),
        }
    }

    /// Creates an untyped error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            type_name: Cow::Borrowed(std::any::type_name::<Self>()),
            message: message.into(),
            error_type: None,
            source: None,
        }
    }

    /// Creates an error with an explicit classification.
    pub fn typed(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self::msg(message).with_error_type(error_type)
    }

    /// Wraps a resolution failure, keeping its classification.
    pub fn resolution(error: ResolutionError) -> Self {
        let error_type = error.error_type();
        let mut wrapped = Self::new(error);
        wrapped.error_type = error_type;
        wrapped
    }

    /// Wraps a malformed request.
    pub fn bad_request(error: BadRequestError) -> Self {
        let error_type = error.error_type();
        Self::new(error).with_error_type(error_type)
    }

    /// Sets the classification.
    #[must_use]
    pub fn with_error_type(mut self, error_type: ErrorType) -> Self {
        self.error_type = Some(error_type);
        self
    }

    /// Returns the fully qualified type name of the original error.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the type name without its module path.
    pub fn short_type_name(&self) -> &str {
        let base = self.type_name.split('<').next().unwrap_or(&self.type_name);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the classification, if the error carries one.
    pub fn error_type(&self) -> Option<ErrorType> {
        self.error_type
    }

    /// Returns the original error.
    pub fn source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Downcasts the original error.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.as_deref()?.downcast_ref::<E>()
    }
}

impl<E> From<E> for HandlerError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("type_name", &self.type_name)
            .field("message", &self.message)
            .field("error_type", &self.error_type)
            .finish()
    }
}

/// Identity of a handler, unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a parameter asks to receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    /// A field argument named explicitly.
    InputArgument { name: String },
    /// A field argument named after the parameter itself.
    Argument,
    /// The data-fetching environment.
    Environment,
    /// The request context.
    Context,
    /// A value produced by a custom argument resolver recognizing the tag.
    Custom(String),
}

/// One parameter of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    handler: HandlerId,
    index: usize,
    name: String,
    kind: ParameterKind,
}

impl ParameterDescriptor {
    /// Returns the identity used for memoizing resolver lookups.
    pub fn key(&self) -> (HandlerId, usize) {
        (self.handler, self.index)
    }

    /// Returns the position of the parameter.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the declared parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns what the parameter asks for.
    pub fn kind(&self) -> &ParameterKind {
        &self.kind
    }
}

/// Whether a handler answers synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerShape {
    Sync,
    Async,
    Stream,
}

/// A value resolved for one handler parameter.
#[derive(Clone)]
pub enum ArgumentValue {
    Value(Value),
    Environment(DataFetchingEnvironment),
    Context(SharedContext),
    Custom(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Environment(env) => f.debug_tuple("Environment").field(env).finish(),
            Self::Context(ctx) => f.debug_tuple("Context").field(ctx).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// The resolved arguments handed to a handler function.
#[derive(Debug, Clone)]
pub struct ResolvedArguments {
    names: Vec<String>,
    values: Vec<ArgumentValue>,
    environment: DataFetchingEnvironment,
}

impl ResolvedArguments {
    pub(crate) fn new(
        names: Vec<String>,
        values: Vec<ArgumentValue>,
        environment: DataFetchingEnvironment,
    ) -> Self {
        Self {
            names,
            values,
            environment,
        }
    }

    /// Converts an argument value to a concrete type.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, HandlerError> {
        let value = self.value(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            HandlerError::resolution(ResolutionError::InvalidInputArgument {
                argument: self.names.get(index).cloned().unwrap_or_default(),
                message: e.to_string(),
            })
        })
    }

    /// Returns the raw value of an argument parameter.
    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.values.get(index)? {
            ArgumentValue::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Returns a custom resolved value.
    pub fn custom<T: Send + Sync + 'static>(&self, index: usize) -> Option<&T> {
        match self.values.get(index)? {
            ArgumentValue::Custom(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Returns the environment of the invocation.
    pub fn environment(&self) -> &DataFetchingEnvironment {
        &self.environment
    }

    /// Returns the request context.
    pub fn context(&self) -> &SharedContext {
        self.environment.context()
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the handler takes no parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The function behind a handler.
pub type HandlerFn =
    Arc<dyn Fn(ResolvedArguments) -> Result<HandlerResult, HandlerError> + Send + Sync>;

/// A named handler with declared parameters.
#[derive(Clone)]
pub struct MethodHandler {
    id: HandlerId,
    owner: String,
    name: String,
    parameters: Vec<ParameterDescriptor>,
    shape: HandlerShape,
    function: HandlerFn,
}

impl MethodHandler {
    /// Starts describing a handler with the given method name.
    pub fn builder(name: impl Into<String>) -> MethodHandlerBuilder {
        MethodHandlerBuilder {
            id: HandlerId::next(),
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    /// Returns the handler identity.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Returns the name of the owning component.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: &str) {
        self.owner = owner.to_string();
    }

    /// Returns the method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `owner.name` for messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }

    /// Returns the declared parameters.
    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    /// Returns how the handler answers.
    pub fn shape(&self) -> HandlerShape {
        self.shape
    }

    /// Invokes the handler function.
    pub fn invoke(&self, arguments: ResolvedArguments) -> Result<HandlerResult, HandlerError> {
        (self.function)(arguments)
    }
}

impl fmt::Debug for MethodHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodHandler")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("parameters", &self.parameters.len())
            .field("shape", &self.shape)
            .finish()
    }
}

/// Builder for [`MethodHandler`].
#[derive(Debug)]
pub struct MethodHandlerBuilder {
    id: HandlerId,
    name: String,
    parameters: Vec<ParameterDescriptor>,
}

impl MethodHandlerBuilder {
    fn push(mut self, name: impl Into<String>, kind: ParameterKind) -> Self {
        let index = self.parameters.len();
        self.parameters.push(ParameterDescriptor {
            handler: self.id,
            index,
            name: name.into(),
            kind,
        });
        self
    }

    /// Adds a parameter bound to an explicitly named field argument.
    pub fn input_argument(self, parameter: impl Into<String>, argument: impl Into<String>) -> Self {
        self.push(
            parameter,
            ParameterKind::InputArgument {
                name: argument.into(),
            },
        )
    }

    /// Adds a parameter bound to the field argument of the same name.
    pub fn argument(self, parameter: impl Into<String>) -> Self {
        self.push(parameter, ParameterKind::Argument)
    }

    /// Adds a parameter receiving the data-fetching environment.
    pub fn environment(self) -> Self {
        self.push("environment", ParameterKind::Environment)
    }

    /// Adds a parameter receiving the request context.
    pub fn context(self) -> Self {
        self.push("context", ParameterKind::Context)
    }

    /// Adds a parameter resolved by a custom resolver recognizing `tag`.
    pub fn custom(self, parameter: impl Into<String>, tag: impl Into<String>) -> Self {
        self.push(parameter, ParameterKind::Custom(tag.into()))
    }

    fn finish(self, shape: HandlerShape, function: HandlerFn) -> MethodHandler {
        MethodHandler {
            id: self.id,
            owner: String::new(),
            name: self.name,
            parameters: self.parameters,
            shape,
            function,
        }
    }

    /// Finishes with a synchronous function.
    pub fn sync<F>(self, function: F) -> MethodHandler
    where
        F: Fn(ResolvedArguments) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.finish(
            HandlerShape::Sync,
            Arc::new(move |args| function(args).map(HandlerResult::Value)),
        )
    }

    /// Finishes with an asynchronous function.
    pub fn future<F, Fut>(self, function: F) -> MethodHandler
    where
        F: Fn(ResolvedArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.finish(
            HandlerShape::Async,
            Arc::new(move |args| Ok(HandlerResult::deferred(function(args)))),
        )
    }

    /// Finishes with a function returning a stream of values.
    pub fn stream<F, S>(self, function: F) -> MethodHandler
    where
        F: Fn(ResolvedArguments) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Value, HandlerError>> + Send + 'static,
    {
        self.finish(
            HandlerShape::Stream,
            Arc::new(move |args| Ok(HandlerResult::stream(function(args)))),
        )
    }

    /// Finishes with a function choosing its result shape per call.
    pub fn dynamic<F>(self, shape: HandlerShape, function: F) -> MethodHandler
    where
        F: Fn(ResolvedArguments) -> Result<HandlerResult, HandlerError> + Send + Sync + 'static,
    {
        self.finish(shape, Arc::new(function))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlwire_core::FieldCoordinates;
    use serde_json::json;

    #[derive(Debug, thiserror::Error)]
    #[error("show {0} is gone")]
    struct ShowGone(u32);

    #[tokio::test]
    async fn test_normalize_value() {
        let value = HandlerResult::from(json!(1)).into_future().await.unwrap();
        assert_eq!(value, json!(1));
    }

    #[tokio::test]
    async fn test_normalize_deferred() {
        let result = HandlerResult::deferred(async { Ok(json!("later")) });
        assert!(!result.is_ready());
        assert_eq!(result.into_future().await.unwrap(), json!("later"));
    }

    #[tokio::test]
    async fn test_normalize_stream_collects() {
        let items = futures_util::stream::iter(vec![Ok(json!(1)), Ok(json!(2))]);
        let value = HandlerResult::stream(items).into_future().await.unwrap();
        assert_eq!(value, json!([1, 2]));
    }

    #[tokio::test]
    async fn test_normalize_stream_error() {
        let items = futures_util::stream::iter(vec![
            Ok(json!(1)),
            Err(HandlerError::msg("broken")),
        ]);
        let err = HandlerResult::stream(items).into_future().await.unwrap_err();
        assert_eq!(err.message(), "broken");
    }

    #[test]
    fn test_handler_error_records_type() {
        let err: HandlerError = ShowGone(7).into();
        assert_eq!(err.short_type_name(), "ShowGone");
        assert!(err.type_name().ends_with("ShowGone"));
        assert_eq!(err.message(), "show 7 is gone");
        assert!(err.downcast_ref::<ShowGone>().is_some());
        assert_eq!(err.error_type(), None);
    }

    #[test]
    fn test_typed_errors() {
        let err = HandlerError::bad_request(BadRequestError::MissingTypename);
        assert_eq!(err.error_type(), Some(ErrorType::BadRequest));
        assert_eq!(err.short_type_name(), "BadRequestError");

        let err = HandlerError::resolution(ResolutionError::MissingEntityFetcher("Show".into()));
        assert_eq!(err.error_type(), None);
    }

    #[test]
    fn test_builder_assigns_indices() {
        let handler = MethodHandler::builder("shows")
            .input_argument("filter", "titleFilter")
            .environment()
            .argument("first")
            .sync(|_| Ok(Value::Null));

        let params = handler.parameters();
        assert_eq!(params.len(), 3);
        assert_eq!(params[2].index(), 2);
        assert_eq!(params[2].name(), "first");
        assert_eq!(params[0].key().0, handler.id());
        assert_eq!(handler.shape(), HandlerShape::Sync);
    }

    #[test]
    fn test_resolved_argument_conversion() {
        let env = DataFetchingEnvironment::new(FieldCoordinates::new("Query", "shows"));
        let args = ResolvedArguments::new(
            vec!["first".into(), "title".into()],
            vec![
                ArgumentValue::Value(json!("not a number")),
                ArgumentValue::Value(json!("Ozark")),
            ],
            env,
        );

        assert_eq!(args.get::<String>(1).unwrap(), "Ozark");
        let err = args.get::<u32>(0).unwrap_err();
        assert_eq!(err.error_type(), Some(ErrorType::BadRequest));
        assert!(err.message().contains("`first`"));
        assert_eq!(args.get::<Option<u32>>(5).unwrap(), None);
    }
}
