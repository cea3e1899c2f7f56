//! Core types for gqlwire.
//!
//! This crate provides the types shared by the runtime and the CLI:
//! - `error`: Error taxonomy and typed GraphQL errors
//! - `coordinates`: `(type, field)` schema coordinates
//! - `config`: Assembler configuration

pub mod config;
pub mod coordinates;
pub mod error;

pub use config::{AssemblerConfig, ExtensionsConfig, ScalarsConfig};
pub use coordinates::FieldCoordinates;
pub use error::{
    BadRequestError, ConfigurationError, ErrorType, GraphQLError, PathSegment, ResolutionError,
    SourceLocation,
};
