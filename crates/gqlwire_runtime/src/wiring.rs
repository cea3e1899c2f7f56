//! Runtime wiring: scalars, directive wirings, field visibility and the code
//! registry that maps coordinates to data fetchers.

use crate::fetcher::{PropertyDataFetcher, SharedDataFetcher};
use crate::schema::{DirectiveUse, FieldDef, TypeRegistry};
use crate::type_resolver::{resolve_type, TypeResolutionEnvironment, TypeResolver};
use gqlwire_core::{FieldCoordinates, ResolutionError};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A scalar value that failed to convert.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CoercingError {
    pub message: String,
}

impl CoercingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Converts scalar values between their external and internal forms.
pub trait Coercing: Send + Sync {
    /// Converts a result value for the response.
    fn serialize(&self, value: &Value) -> Result<Value, CoercingError>;

    /// Converts a variable value.
    fn parse_value(&self, input: &Value) -> Result<Value, CoercingError>;

    /// Converts a literal from the query document.
    fn parse_literal(&self, input: &Value) -> Result<Value, CoercingError> {
        self.parse_value(input)
    }
}

/// A custom scalar implementation.
#[derive(Clone)]
pub struct ScalarType {
    name: String,
    description: Option<String>,
    coercing: Arc<dyn Coercing>,
}

impl ScalarType {
    /// Creates a new scalar.
    pub fn new(name: impl Into<String>, coercing: Arc<dyn Coercing>) -> Self {
        Self {
            name: name.into(),
            description: None,
            coercing,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn coercing(&self) -> &dyn Coercing {
        self.coercing.as_ref()
    }
}

impl fmt::Debug for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarType")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// What a directive wiring sees about the field it wraps.
#[derive(Debug, Clone, Copy)]
pub struct FieldWiringEnvironment<'a> {
    pub coordinates: &'a FieldCoordinates,
    pub field: &'a FieldDef,
    pub registry: &'a TypeRegistry,
    /// The applied directive; `None` for global wirings.
    pub directive: Option<&'a DirectiveUse>,
}

/// Wraps the data fetchers of fields carrying a directive.
pub trait SchemaDirectiveWiring: Send + Sync {
    /// Returns the fetcher to use for the field.
    fn on_field(
        &self,
        environment: &FieldWiringEnvironment<'_>,
        fetcher: SharedDataFetcher,
    ) -> SharedDataFetcher;
}

/// Decides which fields are visible to introspection and validation.
pub trait FieldVisibility: Send + Sync {
    /// Returns true if the field is visible.
    fn is_visible(&self, coordinates: &FieldCoordinates) -> bool;
}

/// Every field is visible.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFieldVisibility;

impl FieldVisibility for DefaultFieldVisibility {
    fn is_visible(&self, _coordinates: &FieldCoordinates) -> bool {
        true
    }
}

/// Hides the introspection fields `__schema` and `__type`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIntrospectionFieldVisibility;

impl FieldVisibility for NoIntrospectionFieldVisibility {
    fn is_visible(&self, coordinates: &FieldCoordinates) -> bool {
        !matches!(coordinates.field.as_str(), "__schema" | "__type")
    }
}

/// Coordinates mapped to data fetchers, plus abstract type resolvers.
#[derive(Clone)]
pub struct CodeRegistry {
    data_fetchers: IndexMap<FieldCoordinates, SharedDataFetcher>,
    type_resolvers: IndexMap<String, Arc<dyn TypeResolver>>,
    default_fetcher: SharedDataFetcher,
}

impl CodeRegistry {
    /// Starts an empty registry.
    pub fn builder() -> CodeRegistryBuilder {
        CodeRegistryBuilder::new()
    }

    /// Gets the fetcher bound to a coordinate.
    pub fn bound_data_fetcher(&self, coordinates: &FieldCoordinates) -> Option<&SharedDataFetcher> {
        self.data_fetchers.get(coordinates)
    }

    /// Gets the fetcher for a coordinate, falling back to property access.
    pub fn data_fetcher(&self, coordinates: &FieldCoordinates) -> SharedDataFetcher {
        self.data_fetchers
            .get(coordinates)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_fetcher))
    }

    /// Returns the bound coordinates in binding order.
    pub fn coordinates(&self) -> impl Iterator<Item = &FieldCoordinates> {
        self.data_fetchers.keys()
    }

    /// Gets the type resolver of an abstract type.
    pub fn type_resolver(&self, type_name: &str) -> Option<&Arc<dyn TypeResolver>> {
        self.type_resolvers.get(type_name)
    }

    /// Returns the names of types with a resolver.
    pub fn type_resolver_names(&self) -> impl Iterator<Item = &str> {
        self.type_resolvers.keys().map(String::as_str)
    }
}

impl fmt::Debug for CodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeRegistry")
            .field("data_fetchers", &self.data_fetchers.len())
            .field("type_resolvers", &self.type_resolvers.len())
            .finish()
    }
}

/// Builder for [`CodeRegistry`], handed to code registry contributors.
pub struct CodeRegistryBuilder {
    data_fetchers: IndexMap<FieldCoordinates, SharedDataFetcher>,
    type_resolvers: IndexMap<String, Arc<dyn TypeResolver>>,
    default_fetcher: SharedDataFetcher,
}

impl CodeRegistryBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            data_fetchers: IndexMap::new(),
            type_resolvers: IndexMap::new(),
            default_fetcher: Arc::new(PropertyDataFetcher),
        }
    }

    /// Binds a fetcher, replacing any existing binding.
    pub fn data_fetcher(&mut self, coordinates: FieldCoordinates, fetcher: SharedDataFetcher) -> &mut Self {
        self.data_fetchers.insert(coordinates, fetcher);
        self
    }

    /// Returns true if the coordinate has a fetcher.
    pub fn has_data_fetcher(&self, coordinates: &FieldCoordinates) -> bool {
        self.data_fetchers.contains_key(coordinates)
    }

    /// Gets a bound fetcher.
    pub fn get_data_fetcher(&self, coordinates: &FieldCoordinates) -> Option<&SharedDataFetcher> {
        self.data_fetchers.get(coordinates)
    }

    /// Returns the bound coordinates.
    pub fn coordinates(&self) -> impl Iterator<Item = &FieldCoordinates> {
        self.data_fetchers.keys()
    }

    /// Sets the type resolver of an abstract type.
    pub fn type_resolver(&mut self, type_name: impl Into<String>, resolver: Arc<dyn TypeResolver>) -> &mut Self {
        self.type_resolvers.insert(type_name.into(), resolver);
        self
    }

    /// Returns true if the type has a resolver.
    pub fn has_type_resolver(&self, type_name: &str) -> bool {
        self.type_resolvers.contains_key(type_name)
    }

    /// Sets the fetcher used for unbound fields.
    pub fn default_data_fetcher(&mut self, fetcher: SharedDataFetcher) -> &mut Self {
        self.default_fetcher = fetcher;
        self
    }

    pub(crate) fn map_data_fetchers<F>(&mut self, mut f: F)
    where
        F: FnMut(&FieldCoordinates, SharedDataFetcher) -> SharedDataFetcher,
    {
        for (coordinates, fetcher) in self.data_fetchers.iter_mut() {
            *fetcher = f(coordinates, Arc::clone(fetcher));
        }
    }

    /// Builds the registry.
    pub fn build(self) -> CodeRegistry {
        CodeRegistry {
            data_fetchers: self.data_fetchers,
            type_resolvers: self.type_resolvers,
            default_fetcher: self.default_fetcher,
        }
    }
}

impl Default for CodeRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodeRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeRegistryBuilder")
            .field("data_fetchers", &self.data_fetchers.len())
            .field("type_resolvers", &self.type_resolvers.len())
            .finish()
    }
}

/// Scalars, directive wirings and manual bindings added on top of the
/// discovered components.
#[derive(Clone, Default)]
pub struct RuntimeWiring {
    scalars: IndexMap<String, ScalarType>,
    directives: IndexMap<String, Arc<dyn SchemaDirectiveWiring>>,
    global_directives: Vec<Arc<dyn SchemaDirectiveWiring>>,
    data_fetchers: IndexMap<FieldCoordinates, SharedDataFetcher>,
    type_resolvers: IndexMap<String, Arc<dyn TypeResolver>>,
}

impl RuntimeWiring {
    /// Creates a new, empty wiring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scalar, replacing one with the same name.
    pub fn scalar(&mut self, scalar: ScalarType) -> &mut Self {
        self.scalars.insert(scalar.name().to_string(), scalar);
        self
    }

    /// Adds a wiring for fields carrying `@name`. A blank name registers a
    /// global wiring applied to every bound field.
    pub fn directive(&mut self, name: impl Into<String>, wiring: Arc<dyn SchemaDirectiveWiring>) -> &mut Self {
        let name = name.into();
        if name.trim().is_empty() {
            self.global_directives.push(wiring);
        } else {
            self.directives.insert(name, wiring);
        }
        self
    }

    /// Binds a fetcher; applied after the code registry contributors.
    pub fn data_fetcher(
        &mut self,
        parent_type: impl Into<String>,
        field: impl Into<String>,
        fetcher: SharedDataFetcher,
    ) -> &mut Self {
        self.data_fetchers
            .insert(FieldCoordinates::new(parent_type, field), fetcher);
        self
    }

    /// Sets the type resolver of an abstract type.
    pub fn type_resolver(&mut self, type_name: impl Into<String>, resolver: Arc<dyn TypeResolver>) -> &mut Self {
        self.type_resolvers.insert(type_name.into(), resolver);
        self
    }

    /// Returns true if a scalar with this name is wired.
    pub fn has_scalar(&self, name: &str) -> bool {
        self.scalars.contains_key(name)
    }

    /// Returns true if a named directive wiring exists.
    pub fn has_directive(&self, name: &str) -> bool {
        self.directives.contains_key(name)
    }

    pub(crate) fn into_parts(self) -> RuntimeWiringParts {
        RuntimeWiringParts {
            scalars: self.scalars,
            directives: self.directives,
            global_directives: self.global_directives,
            data_fetchers: self.data_fetchers,
            type_resolvers: self.type_resolvers,
        }
    }
}

impl fmt::Debug for RuntimeWiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeWiring")
            .field("scalars", &self.scalars.keys().collect::<Vec<_>>())
            .field("directives", &self.directives.keys().collect::<Vec<_>>())
            .field("global_directives", &self.global_directives.len())
            .field("data_fetchers", &self.data_fetchers.len())
            .finish()
    }
}

pub(crate) struct RuntimeWiringParts {
    pub scalars: IndexMap<String, ScalarType>,
    pub directives: IndexMap<String, Arc<dyn SchemaDirectiveWiring>>,
    pub global_directives: Vec<Arc<dyn SchemaDirectiveWiring>>,
    pub data_fetchers: IndexMap<FieldCoordinates, SharedDataFetcher>,
    pub type_resolvers: IndexMap<String, Arc<dyn TypeResolver>>,
}

/// The wired, queryable schema.
#[derive(Clone)]
pub struct Schema {
    registry: Arc<TypeRegistry>,
    code_registry: CodeRegistry,
    scalars: IndexMap<String, ScalarType>,
    visibility: Arc<dyn FieldVisibility>,
    sdl: Arc<str>,
}

impl Schema {
    pub(crate) fn new(
        registry: TypeRegistry,
        code_registry: CodeRegistry,
        scalars: IndexMap<String, ScalarType>,
        visibility: Arc<dyn FieldVisibility>,
        sdl: Arc<str>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            code_registry,
            scalars,
            visibility,
            sdl,
        }
    }

    /// Returns the merged types.
    pub fn type_registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Returns a shared handle to the merged types.
    pub fn shared_type_registry(&self) -> Arc<TypeRegistry> {
        Arc::clone(&self.registry)
    }

    /// Returns the code registry.
    pub fn code_registry(&self) -> &CodeRegistry {
        &self.code_registry
    }

    /// Returns the name of the query type.
    pub fn query_type(&self) -> &str {
        &self.registry.roots().query
    }

    /// Gets the fetcher for a coordinate.
    pub fn data_fetcher(&self, coordinates: &FieldCoordinates) -> SharedDataFetcher {
        self.code_registry.data_fetcher(coordinates)
    }

    /// Gets a custom scalar.
    pub fn scalar(&self, name: &str) -> Option<&ScalarType> {
        self.scalars.get(name)
    }

    /// Returns the custom scalars.
    pub fn scalars(&self) -> impl Iterator<Item = &ScalarType> {
        self.scalars.values()
    }

    /// Returns true if the field exists and is visible.
    pub fn is_field_visible(&self, coordinates: &FieldCoordinates) -> bool {
        let introspection = coordinates.field.starts_with("__");
        (introspection || self.registry.field(coordinates).is_some())
            && self.visibility.is_visible(coordinates)
    }

    /// Resolves a value of an abstract type to its object type.
    pub fn resolve_type(&self, abstract_type: &str, value: &Value) -> Result<String, ResolutionError> {
        let environment = TypeResolutionEnvironment::new(value, abstract_type, &self.registry);
        match self.code_registry.type_resolver(abstract_type) {
            Some(resolver) => resolve_type(resolver.as_ref(), &environment),
            None => Err(ResolutionError::NoConcreteType {
                abstract_type: abstract_type.to_string(),
                found: environment.typename().map(str::to_string),
            }),
        }
    }

    /// Returns the SDL the schema was built from, without federation additions.
    pub fn sdl(&self) -> &str {
        &self.sdl
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("types", &self.registry.len())
            .field("code_registry", &self.code_registry)
            .field("scalars", &self.scalars.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::DataFetchingEnvironment;
    use crate::fetcher::{DataFetcher, FnDataFetcher};
    use serde_json::json;

    #[test]
    fn test_visibility() {
        let schema_field = FieldCoordinates::new("Query", "__schema");
        let shows = FieldCoordinates::new("Query", "shows");
        assert!(DefaultFieldVisibility.is_visible(&schema_field));
        assert!(!NoIntrospectionFieldVisibility.is_visible(&schema_field));
        assert!(NoIntrospectionFieldVisibility.is_visible(&shows));
    }

    #[test]
    fn test_runtime_wiring_blank_directive_is_global() {
        struct Noop;
        impl SchemaDirectiveWiring for Noop {
            fn on_field(&self, _: &FieldWiringEnvironment<'_>, fetcher: SharedDataFetcher) -> SharedDataFetcher {
                fetcher
            }
        }

        let mut wiring = RuntimeWiring::new();
        wiring.directive("uppercase", Arc::new(Noop)).directive("  ", Arc::new(Noop));
        assert!(wiring.has_directive("uppercase"));
        let parts = wiring.into_parts();
        assert_eq!(parts.directives.len(), 1);
        assert_eq!(parts.global_directives.len(), 1);
    }

    #[tokio::test]
    async fn test_code_registry_default_fetcher() {
        let mut builder = CodeRegistry::builder();
        let shows = FieldCoordinates::new("Query", "shows");
        builder.data_fetcher(shows.clone(), Arc::new(FnDataFetcher::new(|_| Ok(json!([])))));
        assert!(builder.has_data_fetcher(&shows));
        let registry = builder.build();

        let title = FieldCoordinates::new("Show", "title");
        assert!(registry.bound_data_fetcher(&title).is_none());
        let env = DataFetchingEnvironment::new(title.clone()).with_source(json!({ "title": "Dark" }));
        let result = registry.data_fetcher(&title).fetch(env).await.unwrap();
        assert_eq!(result.data, json!("Dark"));
    }
}
