//! Error taxonomy for gqlwire.
//!
//! Assembly-time problems are [`ConfigurationError`]s and abort the whole pass.
//! Request-time problems ([`BadRequestError`], [`ResolutionError`]) stay scoped
//! to one field or one entity and are surfaced to clients as [`GraphQLError`]s.

use crate::coordinates::FieldCoordinates;
use indexmap::IndexMap;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Extension key holding the [`ErrorType`] of a typed error.
pub const EXTENSION_ERROR_TYPE: &str = "errorType";
/// Extension key holding the finer-grained error detail.
pub const EXTENSION_ERROR_DETAIL: &str = "errorDetail";
/// Extension key holding the origin service of an error.
pub const EXTENSION_ORIGIN: &str = "origin";
/// Extension key holding a link with debugging help.
pub const EXTENSION_DEBUG_URI: &str = "debugUri";
/// Extension key holding arbitrary debugging data.
pub const EXTENSION_DEBUG_INFO: &str = "debugInfo";
/// Extension key holding the type name of the error that caused a failure.
pub const EXTENSION_CLASS: &str = "class";

/// Error classification carried in the `errorType` extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorType {
    /// Unexpected failure inside the server.
    Internal,
    /// The requested entity does not exist.
    NotFound,
    /// The caller may not access the requested entity.
    PermissionDenied,
    /// The request itself is malformed.
    BadRequest,
    /// A dependency is temporarily unavailable.
    Unavailable,
    /// No classification is known.
    Unknown,
}

impl ErrorType {
    /// Returns the wire representation of the error type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "INTERNAL",
            Self::NotFound => "NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unavailable => "UNAVAILABLE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parses the wire representation produced by [`ErrorType::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INTERNAL" => Some(Self::Internal),
            "NOT_FOUND" => Some(Self::NotFound),
            "PERMISSION_DENIED" => Some(Self::PermissionDenied),
            "BAD_REQUEST" => Some(Self::BadRequest),
            "UNAVAILABLE" => Some(Self::Unavailable),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Returns true if the caller is at fault.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::PermissionDenied | Self::BadRequest
        )
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A segment of a response path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A field name.
    Field(String),
    /// A list index.
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        Self::Field(value.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(value: String) -> Self {
        Self::Field(value)
    }
}

impl From<usize> for PathSegment {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A line/column position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

/// A GraphQL error whose extensions carry a typed classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Human-readable message.
    pub message: String,
    /// Response path of the failing field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    /// Document locations related to the error.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<SourceLocation>,
    /// Extension data, always including `errorType` for typed errors.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extensions: IndexMap<String, serde_json::Value>,
}

impl GraphQLError {
    /// Creates a new error with the given classification.
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        let mut extensions = IndexMap::new();
        extensions.insert(
            EXTENSION_ERROR_TYPE.to_string(),
            serde_json::Value::String(error_type.as_str().to_string()),
        );
        Self {
            message: message.into(),
            path: Vec::new(),
            locations: Vec::new(),
            extensions,
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Internal, message)
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorType::NotFound, message)
    }

    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorType::BadRequest, message)
    }

    /// Creates a permission denied error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorType::PermissionDenied, message)
    }

    /// Sets the response path.
    pub fn with_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathSegment>,
    {
        self.path = path.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a document location.
    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.locations.push(SourceLocation { line, column });
        self
    }

    /// Adds extension data. Values that fail to serialize are skipped.
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.extensions.insert(key.into(), value);
        }
        self
    }

    /// Sets the `errorDetail` extension.
    pub fn with_error_detail(self, detail: impl Into<String>) -> Self {
        self.with_extension(EXTENSION_ERROR_DETAIL, detail.into())
    }

    /// Sets the `origin` extension.
    pub fn with_origin(self, origin: impl Into<String>) -> Self {
        self.with_extension(EXTENSION_ORIGIN, origin.into())
    }

    /// Sets the `debugUri` extension.
    pub fn with_debug_uri(self, uri: impl Into<String>) -> Self {
        self.with_extension(EXTENSION_DEBUG_URI, uri.into())
    }

    /// Sets the `debugInfo` extension.
    pub fn with_debug_info(self, info: impl Serialize) -> Self {
        self.with_extension(EXTENSION_DEBUG_INFO, info)
    }

    /// Returns the classification stored in the extensions.
    pub fn error_type(&self) -> Option<ErrorType> {
        self.extensions
            .get(EXTENSION_ERROR_TYPE)
            .and_then(serde_json::Value::as_str)
            .and_then(ErrorType::parse)
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GraphQLError {}

/// A fatal problem found while assembling a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[non_exhaustive]
pub enum ConfigurationError {
    #[error("No schema files found in {locations:?}")]
    #[diagnostic(
        code(gqlwire::config::no_schema),
        help("add a schema location, pass raw schema text, or register a type definition contributor")
    )]
    NoSchemaFound { locations: Vec<String> },

    #[error("Failed to parse schema fragment `{fragment}` at {line}:{column}: {message}")]
    #[diagnostic(code(gqlwire::config::invalid_fragment))]
    InvalidFragment {
        fragment: String,
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Invalid schema location `{pattern}`: {message}")]
    #[diagnostic(code(gqlwire::config::invalid_location))]
    InvalidSchemaLocation { pattern: String, message: String },

    #[error("Failed to read `{path}`: {message}")]
    #[diagnostic(code(gqlwire::config::io))]
    Io { path: String, message: String },

    #[error("Type `{name}` is defined in both `{first}` and `{second}`")]
    #[diagnostic(code(gqlwire::config::duplicate_type))]
    DuplicateType {
        name: String,
        first: String,
        second: String,
    },

    #[error("Directive `@{name}` is defined more than once")]
    #[diagnostic(code(gqlwire::config::duplicate_directive))]
    DuplicateDirective { name: String },

    #[error("Fragment `{fragment}` extends `{name}`, which is not defined")]
    #[diagnostic(code(gqlwire::config::unknown_extension))]
    ExtensionOfUnknownType { name: String, fragment: String },

    #[error("Parent type `{parent_type}` not found for data fetcher {owner}.{handler}")]
    #[diagnostic(code(gqlwire::config::missing_parent_type))]
    MissingParentType {
        parent_type: String,
        owner: String,
        handler: String,
    },

    #[error("Duplicate data fetchers registered for {coordinates}")]
    #[diagnostic(code(gqlwire::config::duplicate_data_fetcher))]
    DuplicateDataFetcher { coordinates: FieldCoordinates },

    #[error("Invalid type resolver on {owner} for `{type_name}`: {reason}")]
    #[diagnostic(code(gqlwire::config::invalid_type_resolver))]
    InvalidTypeResolver {
        type_name: String,
        owner: String,
        reason: String,
    },

    #[error("Duplicate type resolvers registered for `{type_name}`")]
    #[diagnostic(code(gqlwire::config::duplicate_type_resolver))]
    DuplicateTypeResolver { type_name: String },

    #[error("Field-scoped data loader on `{component}` must declare a name")]
    #[diagnostic(code(gqlwire::config::unnamed_data_loader))]
    UnnamedDataLoaderOnField { component: String },

    #[error("Field-scoped data loader `{name}` cannot be declared on decorated component `{component}`")]
    #[diagnostic(
        code(gqlwire::config::decorated_data_loader),
        help("declare the loader on an undecorated component or at component scope")
    )]
    DecoratedDataLoader { component: String, name: String },

    #[error("Duplicate data loader registered with name `{name}`")]
    #[diagnostic(code(gqlwire::config::duplicate_data_loader))]
    DuplicateDataLoader { name: String },

    #[error("Duplicate entity fetchers registered for `{typename}` on {first} and {second}")]
    #[diagnostic(code(gqlwire::config::duplicate_entity_fetcher))]
    DuplicateEntityFetcher {
        typename: String,
        first: String,
        second: String,
    },

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(gqlwire::config::invalid))]
    InvalidConfig(String),
}

/// A malformed request, reported to the caller and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BadRequestError {
    #[error("missing __typename")]
    MissingTypename,

    #[error("The federated query is missing the `representations` argument")]
    MissingRepresentations,
}

impl BadRequestError {
    /// Returns the classification of the error.
    pub const fn error_type(&self) -> ErrorType {
        ErrorType::BadRequest
    }
}

/// A request-scoped failure to find something needed to resolve a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Could not resolve parameter [{index}] in {handler}: No suitable resolver")]
    NoArgumentResolver { index: usize, handler: String },

    #[error("Unsupported parameter [{index}] in {handler}; supports() must be checked first")]
    UnsupportedParameter { index: usize, handler: String },

    #[error("Input argument for parameter [{index}] in {handler} has a blank name")]
    BlankArgumentName { index: usize, handler: String },

    #[error("Invalid input argument `{argument}`: {message}")]
    InvalidInputArgument { argument: String, message: String },

    #[error(
        "The default type resolver could not find a suitable type for `{abstract_type}` (value typename: {found:?})"
    )]
    NoConcreteType {
        abstract_type: String,
        found: Option<String>,
    },

    #[error("Type resolver for `{abstract_type}` returned `{type_name}`, which is not one of its possible types")]
    InvalidResolvedType {
        abstract_type: String,
        type_name: String,
    },

    #[error("Missing entity fetcher for type {0}")]
    MissingEntityFetcher(String),
}

impl ResolutionError {
    /// Returns the classification of the error, if it carries one.
    pub const fn error_type(&self) -> Option<ErrorType> {
        match self {
            Self::InvalidInputArgument { .. } => Some(ErrorType::BadRequest),
            _ => None,
        }
    }
}
