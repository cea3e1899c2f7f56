//! The per-invocation data-fetching environment.

use crate::context::{RequestContext, SharedContext};
use crate::dataloader::DataLoader;
use crate::loader_registry::DispatchRegistry;
use crate::schema::{FieldDef, TypeRegistry};
use gqlwire_core::{FieldCoordinates, PathSegment};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Everything the execution engine knows about the field being resolved.
///
/// Cloning is cheap; large parts are reference counted.
#[derive(Clone)]
pub struct DataFetchingEnvironment {
    coordinates: FieldCoordinates,
    source: Value,
    arguments: Map<String, Value>,
    field_definition: Option<Arc<FieldDef>>,
    type_registry: Option<Arc<TypeRegistry>>,
    context: SharedContext,
    variables: Arc<Map<String, Value>>,
    path: Vec<PathSegment>,
    data_loaders: Option<DispatchRegistry>,
}

impl DataFetchingEnvironment {
    /// Creates a new environment for a field.
    pub fn new(coordinates: FieldCoordinates) -> Self {
        let path = vec![PathSegment::Field(coordinates.field.clone())];
        Self {
            coordinates,
            source: Value::Null,
            arguments: Map::new(),
            field_definition: None,
            type_registry: None,
            context: Arc::new(RequestContext::new()),
            variables: Arc::new(Map::new()),
            path,
            data_loaders: None,
        }
    }

    /// Sets the parent value.
    #[must_use]
    pub fn with_source(mut self, source: Value) -> Self {
        self.source = source;
        self
    }

    /// Replaces the field arguments.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Sets one field argument.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Sets the schema definition of the field.
    #[must_use]
    pub fn with_field_definition(mut self, definition: Arc<FieldDef>) -> Self {
        self.field_definition = Some(definition);
        self
    }

    /// Sets the types of the schema the field belongs to.
    #[must_use]
    pub fn with_type_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.type_registry = Some(registry);
        self
    }

    /// Sets the request context.
    #[must_use]
    pub fn with_context(mut self, context: SharedContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the operation variables.
    #[must_use]
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = Arc::new(variables);
        self
    }

    /// Sets the response path.
    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    /// Attaches the request's data loaders.
    #[must_use]
    pub fn with_data_loaders(mut self, registry: DispatchRegistry) -> Self {
        self.data_loaders = Some(registry);
        self
    }

    /// Returns the coordinates of the field.
    pub fn coordinates(&self) -> &FieldCoordinates {
        &self.coordinates
    }

    /// Returns the parent value.
    pub fn source(&self) -> &Value {
        &self.source
    }

    /// Deserializes the parent value.
    pub fn source_as<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.source.clone()).ok()
    }

    /// Returns all field arguments.
    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    /// Gets an argument by name.
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Gets an argument as a specific type.
    pub fn argument_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.arguments
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Returns the schema definition of the field, if the engine supplied one.
    pub fn field_definition(&self) -> Option<&FieldDef> {
        self.field_definition.as_deref()
    }

    /// Returns the schema types, if the engine supplied them.
    pub fn type_registry(&self) -> Option<&TypeRegistry> {
        self.type_registry.as_deref()
    }

    /// Returns the request context.
    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    /// Gets a context value by type.
    pub fn context_value<T: 'static>(&self) -> Option<&T> {
        self.context.get::<T>()
    }

    /// Returns the operation variables.
    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Returns the response path.
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// Returns the request's data loaders.
    pub fn data_loaders(&self) -> Option<&DispatchRegistry> {
        self.data_loaders.as_ref()
    }

    /// Gets a data loader by name.
    pub fn data_loader(&self, name: &str) -> Option<DataLoader> {
        self.data_loaders.as_ref()?.get(name)
    }
}

impl fmt::Debug for DataFetchingEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFetchingEnvironment")
            .field("coordinates", &self.coordinates)
            .field("arguments", &self.arguments)
            .field("path", &self.path)
            .field("has_data_loaders", &self.data_loaders.is_some())
            .finish()
    }
}
