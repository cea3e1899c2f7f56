//! Runtime for gqlwire.
//!
//! This crate wires a GraphQL schema to independently registered handlers:
//! - `schema` / `fragment`: Type definitions and fragment merging
//! - `assembler`: Schema assembly and snapshot publication
//! - `component`: Component descriptors
//! - `argument`: Argument resolver chain
//! - `handler` / `fetcher`: Handlers and data fetchers
//! - `dataloader` / `loader_registry`: Batch loaders and per-request dispatch
//! - `entity` / `federation`: Entity fetchers and the federation resolver
//! - `wiring`: Code registry, runtime wiring and the wired schema
//! - `scalars` / `validation`: Extended scalars and validation directives

pub mod argument;
pub mod assembler;
pub mod component;
pub mod context;
pub mod dataloader;
pub mod entity;
pub mod environment;
pub mod exception;
pub mod federation;
pub mod fetcher;
pub mod fragment;
pub mod handler;
pub mod loader_registry;
pub mod scalars;
pub mod schema;
pub mod type_resolver;
pub mod validation;
pub mod wiring;

pub use argument::{
    ArgumentResolver, ArgumentResolverComposite, DefaultInputObjectMapper, InputObjectMapper,
};
pub use assembler::{
    DataFetcherBinding, ReloadIndicator, SchemaAssembler, SchemaAssemblerBuilder, SchemaSnapshot,
};
pub use component::{Component, ComponentRegistry, DataFetcherDefinition};
pub use context::{ContextSupplier, RequestContext, SharedContext};
pub use dataloader::{BatchLoader, DataLoader, FnBatchLoader, LoaderEnvironment, LoaderError, Statistics};
pub use entity::{EntityFetcherRegistry, EntityHandler};
pub use environment::DataFetchingEnvironment;
pub use exception::{DataFetcherExceptionHandler, DefaultDataFetcherExceptionHandler, ExceptionParameters};
pub use federation::{DefaultFederationResolver, FederationResolver};
pub use fetcher::{DataFetcher, DataFetcherResult, FnDataFetcher, SharedDataFetcher};
pub use fragment::SchemaFragment;
pub use handler::{HandlerError, HandlerResult, HandlerShape, MethodHandler, ResolvedArguments};
pub use loader_registry::{
    BatchLoaderDefinition, DataLoaderInstrumentation, DataLoaderProvider, DepthPredicate,
    DispatchRegistry, ElapsedPredicate, LoggingInstrumentation,
};
pub use schema::TypeRegistry;
pub use type_resolver::{DefaultTypeResolver, FnTypeResolver, TypeResolver};
pub use wiring::{
    CodeRegistry, Coercing, FieldVisibility, RuntimeWiring, ScalarType, Schema,
    SchemaDirectiveWiring,
};

pub use gqlwire_core::{ConfigurationError, ErrorType, FieldCoordinates, GraphQLError};
