//! Conversion of handler failures into GraphQL errors.

use crate::handler::HandlerError;
use async_trait::async_trait;
use gqlwire_core::error::EXTENSION_CLASS;
use gqlwire_core::{ErrorType, FieldCoordinates, GraphQLError, PathSegment};
use tracing::error;

/// Everything known about a failed field or entity.
#[derive(Debug, Clone)]
pub struct ExceptionParameters {
    pub error: HandlerError,
    pub path: Vec<PathSegment>,
    pub coordinates: Option<FieldCoordinates>,
}

impl ExceptionParameters {
    /// Creates new parameters for an error at a path.
    pub fn new(error: HandlerError, path: Vec<PathSegment>) -> Self {
        Self {
            error,
            path,
            coordinates: None,
        }
    }

    /// Sets the field the error was raised for.
    #[must_use]
    pub fn with_coordinates(mut self, coordinates: FieldCoordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }
}

/// Turns a handler failure into response errors.
#[async_trait]
pub trait DataFetcherExceptionHandler: Send + Sync {
    /// Handles one failure.
    async fn handle(&self, parameters: ExceptionParameters) -> Vec<GraphQLError>;
}

/// Logs the failure and classifies it.
///
/// Errors carrying their own [`ErrorType`] keep it and their message;
/// everything else becomes `INTERNAL` with a `"<type>: <message>"` message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDataFetcherExceptionHandler;

impl DefaultDataFetcherExceptionHandler {
    /// Builds the error without going through the async interface.
    pub fn to_graphql_error(&self, parameters: &ExceptionParameters) -> GraphQLError {
        let cause = &parameters.error;
        let graphql_error = match cause.error_type() {
            Some(error_type) => GraphQLError::new(error_type, cause.message()),
            None => GraphQLError::new(
                ErrorType::Internal,
                format!("{}: {}", cause.type_name(), cause.message()),
            ),
        };
        graphql_error
            .with_path(parameters.path.iter().cloned())
            .with_extension(EXTENSION_CLASS, cause.short_type_name())
    }
}

#[async_trait]
impl DataFetcherExceptionHandler for DefaultDataFetcherExceptionHandler {
    async fn handle(&self, parameters: ExceptionParameters) -> Vec<GraphQLError> {
        match &parameters.coordinates {
            Some(coordinates) => error!(
                field = %coordinates,
                error = %parameters.error,
                "Exception while executing data fetcher"
            ),
            None => error!(error = %parameters.error, "Exception while executing data fetcher"),
        }
        vec![self.to_graphql_error(&parameters)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlwire_core::BadRequestError;
    use serde_json::json;

    #[derive(Debug, thiserror::Error)]
    #[error("reviews unavailable")]
    struct ReviewsDown;

    #[tokio::test]
    async fn test_untyped_error_is_internal() {
        let params = ExceptionParameters::new(
            ReviewsDown.into(),
            vec![PathSegment::from("_entities"), PathSegment::from(1usize)],
        );
        let errors = DefaultDataFetcherExceptionHandler.handle(params).await;

        assert_eq!(errors.len(), 1);
        let error = &errors[0];
        assert_eq!(error.error_type(), Some(ErrorType::Internal));
        assert!(error.message.ends_with("ReviewsDown: reviews unavailable"));
        assert_eq!(error.extensions[EXTENSION_CLASS], json!("ReviewsDown"));
        assert_eq!(error.path, vec![PathSegment::from("_entities"), PathSegment::from(1usize)]);
    }

    #[tokio::test]
    async fn test_typed_error_keeps_type() {
        let params = ExceptionParameters::new(
            HandlerError::bad_request(BadRequestError::MissingTypename),
            vec![],
        )
        .with_coordinates(FieldCoordinates::new("Query", "_entities"));
        let errors = DefaultDataFetcherExceptionHandler.handle(params).await;

        assert_eq!(errors[0].error_type(), Some(ErrorType::BadRequest));
        assert_eq!(errors[0].message, "missing __typename");
        assert_eq!(errors[0].extensions[EXTENSION_CLASS], json!("BadRequestError"));
    }
}
