//! Federated entity resolution.
//!
//! `Query._entities` receives a list of representations, each carrying a
//! `__typename`. The [`DefaultFederationResolver`] looks up the entity fetcher
//! for every representation, runs them all concurrently and returns results
//! in input order, isolating failures to their own slot.

use crate::entity::EntityFetcherRegistry;
use crate::environment::DataFetchingEnvironment;
use crate::exception::{
    DataFetcherExceptionHandler, DefaultDataFetcherExceptionHandler, ExceptionParameters,
};
use crate::fetcher::{DataFetcher, DataFetcherResult, FetchFuture, SharedDataFetcher};
use crate::fragment::{merge_fragments, SchemaFragment};
use crate::handler::{HandlerError, HandlerFuture, HandlerResult};
use crate::schema::{TypeDef, TypeRegistry};
use crate::type_resolver::{TypeResolutionEnvironment, TypeResolver, TYPENAME_FIELD};
use futures_util::future::join_all;
use futures_util::FutureExt;
use gqlwire_core::{
    BadRequestError, ConfigurationError, FieldCoordinates, PathSegment, ResolutionError,
};
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::warn;

/// Directive marking a federated entity type.
pub const KEY_DIRECTIVE: &str = "key";

/// Field added to the query type for entity resolution.
pub const ENTITIES_FIELD: &str = "_entities";

/// Field added to the query type exposing the subgraph SDL.
pub const SERVICE_FIELD: &str = "_service";

/// Argument of `_entities` holding the representations.
pub const REPRESENTATIONS_ARGUMENT: &str = "representations";

/// Origin recorded for the federation types.
pub const FEDERATION_ORIGIN: &str = "<federation>";

/// The two pieces a federation layer plugs into the execution engine.
pub trait FederationResolver: Send + Sync {
    /// Returns the fetcher bound to `Query._entities`.
    fn entities_fetcher(&self) -> SharedDataFetcher;

    /// Returns the resolver for the `_Entity` union.
    fn type_resolver(&self) -> Arc<dyn TypeResolver>;
}

struct FederationInner {
    registry: Arc<EntityFetcherRegistry>,
    exception_handler: Arc<dyn DataFetcherExceptionHandler>,
    type_mapping: FxHashMap<String, String>,
}

/// The built-in federation resolver over an [`EntityFetcherRegistry`].
#[derive(Clone)]
pub struct DefaultFederationResolver {
    inner: Arc<FederationInner>,
}

impl DefaultFederationResolver {
    /// Creates a resolver using the default exception handler.
    pub fn new(registry: Arc<EntityFetcherRegistry>) -> Self {
        Self::with_options(
            registry,
            Arc::new(DefaultDataFetcherExceptionHandler),
            FxHashMap::default(),
        )
    }

    /// Creates a resolver with an exception handler and a typename mapping.
    ///
    /// The mapping translates a representation's `__typename` into the
    /// schema type name when resolving `_Entity`.
    pub fn with_options(
        registry: Arc<EntityFetcherRegistry>,
        exception_handler: Arc<dyn DataFetcherExceptionHandler>,
        type_mapping: FxHashMap<String, String>,
    ) -> Self {
        Self {
            inner: Arc::new(FederationInner {
                registry,
                exception_handler,
                type_mapping,
            }),
        }
    }

    /// Returns the entity registry.
    pub fn registry(&self) -> &EntityFetcherRegistry {
        &self.inner.registry
    }

    /// Fetches every representation concurrently, preserving input order.
    ///
    /// A handler returning a list contributes all of its items in place of
    /// its slot. A failed representation contributes a null slot and the
    /// errors produced by the exception handler, at `["_entities", index]`.
    pub async fn fetch_entities(
        &self,
        representations: Vec<Value>,
        environment: &DataFetchingEnvironment,
    ) -> DataFetcherResult {
        let futures: Vec<HandlerFuture> = representations
            .into_iter()
            .map(|representation| self.fetch_one(representation, environment))
            .collect();
        let results = join_all(futures).await;

        let mut data = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(Value::Array(items)) => data.extend(items),
                Ok(value) => data.push(value),
                Err(error) => {
                    data.push(Value::Null);
                    let parameters = ExceptionParameters::new(
                        error,
                        vec![PathSegment::from(ENTITIES_FIELD), PathSegment::from(index)],
                    )
                    .with_coordinates(environment.coordinates().clone());
                    errors.extend(self.inner.exception_handler.handle(parameters).await);
                }
            }
        }
        DataFetcherResult::new(Value::Array(data)).with_errors(errors)
    }

    fn fetch_one(&self, representation: Value, environment: &DataFetchingEnvironment) -> HandlerFuture {
        match self.invoke_one(representation, environment) {
            Ok(handler_result) => handler_result.into_future(),
            Err(error) => futures_util::future::ready(Err::<Value, _>(error)).boxed(),
        }
    }

    fn invoke_one(
        &self,
        representation: Value,
        environment: &DataFetchingEnvironment,
    ) -> Result<HandlerResult, HandlerError> {
        let Value::Object(map) = representation else {
            return Err(HandlerError::bad_request(BadRequestError::MissingTypename));
        };
        let typename = map
            .get(TYPENAME_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::bad_request(BadRequestError::MissingTypename))?;
        let entry = self.inner.registry.get(typename).ok_or_else(|| {
            HandlerError::resolution(ResolutionError::MissingEntityFetcher(typename.to_string()))
        })?;
        entry.handler.invoke(map, environment)
    }
}

impl fmt::Debug for DefaultFederationResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultFederationResolver")
            .field("entity_fetchers", &self.inner.registry.len())
            .field("type_mapping", &self.inner.type_mapping)
            .finish()
    }
}

impl FederationResolver for DefaultFederationResolver {
    fn entities_fetcher(&self) -> SharedDataFetcher {
        Arc::new(EntitiesDataFetcher {
            resolver: self.clone(),
        })
    }

    fn type_resolver(&self) -> Arc<dyn TypeResolver> {
        Arc::new(EntityTypeResolver {
            type_mapping: self.inner.type_mapping.clone(),
        })
    }
}

struct EntitiesDataFetcher {
    resolver: DefaultFederationResolver,
}

impl DataFetcher for EntitiesDataFetcher {
    fn fetch(&self, environment: DataFetchingEnvironment) -> FetchFuture {
        let resolver = self.resolver.clone();
        async move {
            let representations = match environment.argument(REPRESENTATIONS_ARGUMENT) {
                Some(Value::Array(items)) => items.clone(),
                _ => {
                    return Err(HandlerError::bad_request(
                        BadRequestError::MissingRepresentations,
                    ))
                }
            };
            Ok(resolver.fetch_entities(representations, &environment).await)
        }
        .boxed()
    }
}

struct EntityTypeResolver {
    type_mapping: FxHashMap<String, String>,
}

impl TypeResolver for EntityTypeResolver {
    fn resolve(&self, environment: &TypeResolutionEnvironment<'_>) -> Result<String, ResolutionError> {
        let typename = environment.typename();
        let resolved = typename.map(|name| {
            self.type_mapping
                .get(name)
                .map_or(name, String::as_str)
        });
        match resolved {
            Some(name) if matches!(environment.registry.get(name), Some(TypeDef::Object(_))) => {
                Ok(name.to_string())
            }
            _ => {
                warn!(
                    typename = typename.unwrap_or("<none>"),
                    "Unable to resolve entity type"
                );
                Err(ResolutionError::NoConcreteType {
                    abstract_type: "_Entity".to_string(),
                    found: typename.map(str::to_string),
                })
            }
        }
    }
}

/// Answers `Query._service` with the subgraph SDL.
#[derive(Debug, Clone)]
pub struct ServiceDataFetcher {
    sdl: Arc<str>,
}

impl ServiceDataFetcher {
    /// Creates a new fetcher serving the given SDL.
    pub fn new(sdl: impl Into<Arc<str>>) -> Self {
        Self { sdl: sdl.into() }
    }
}

impl DataFetcher for ServiceDataFetcher {
    fn fetch(&self, _environment: DataFetchingEnvironment) -> FetchFuture {
        let value = json!({ "sdl": self.sdl.as_ref() });
        futures_util::future::ready(Ok(DataFetcherResult::new(value))).boxed()
    }
}

/// Returns true if the registry declares `@key` types or fetchers exist.
pub fn needs_federation(registry: &TypeRegistry, entities: &EntityFetcherRegistry) -> bool {
    !entities.is_empty() || !registry.objects_with_directive(KEY_DIRECTIVE).is_empty()
}

/// Adds the federation types and query fields to a registry.
///
/// Returns the coordinates of the fields that were added. `_Entity` is a union
/// of the `@key` object types and the object types with an entity fetcher; it
/// and `_entities` are left out when that set is empty.
pub fn add_federation_types(
    registry: &mut TypeRegistry,
    entities: &EntityFetcherRegistry,
) -> Result<Vec<FieldCoordinates>, ConfigurationError> {
    let mut members: Vec<String> = registry
        .objects_with_directive(KEY_DIRECTIVE)
        .into_iter()
        .map(str::to_string)
        .collect();
    for typename in entities.typenames() {
        let is_object = matches!(registry.get(typename), Some(TypeDef::Object(_)));
        if is_object && !members.iter().any(|m| m == typename) {
            members.push(typename.to_string());
        }
    }

    let query = registry.roots().query.clone();
    let mut sdl = String::new();
    let mut fields = Vec::new();

    if !registry.contains("_FieldSet") {
        sdl.push_str("scalar _FieldSet\n");
    }
    for (name, definition) in [
        (KEY_DIRECTIVE, "directive @key(fields: _FieldSet!) repeatable on OBJECT | INTERFACE"),
        ("extends", "directive @extends on OBJECT | INTERFACE"),
        ("external", "directive @external on FIELD_DEFINITION"),
        ("requires", "directive @requires(fields: _FieldSet!) on FIELD_DEFINITION"),
        ("provides", "directive @provides(fields: _FieldSet!) on FIELD_DEFINITION"),
    ] {
        if registry.directive(name).is_none() {
            let _ = writeln!(sdl, "{definition}");
        }
    }
    if !registry.contains("_Any") {
        sdl.push_str("scalar _Any\n");
    }
    if !registry.contains("_Service") {
        sdl.push_str("type _Service { sdl: String }\n");
    }

    let mut query_fields = format!("  {SERVICE_FIELD}: _Service!\n");
    fields.push(FieldCoordinates::new(query.clone(), SERVICE_FIELD));
    if !members.is_empty() {
        let _ = writeln!(sdl, "union _Entity = {}", members.join(" | "));
        let _ = writeln!(
            query_fields,
            "  {ENTITIES_FIELD}({REPRESENTATIONS_ARGUMENT}: [_Any!]!): [_Entity]!"
        );
        fields.push(FieldCoordinates::new(query.clone(), ENTITIES_FIELD));
    }

    let keyword = if registry.contains(&query) { "extend type" } else { "type" };
    let _ = write!(sdl, "{keyword} {query} {{\n{query_fields}}}\n");

    let fragment = SchemaFragment::parse(FEDERATION_ORIGIN, sdl)?;
    merge_fragments(registry, [&fragment])?;
    Ok(fields)
}
