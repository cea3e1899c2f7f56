//! Component descriptors: the handlers, loaders and contributors a component
//! registers with the assembler.

use crate::entity::EntityHandler;
use crate::fragment::SchemaFragment;
use crate::handler::{HandlerShape, MethodHandler};
use crate::loader_registry::{BatchLoaderDefinition, LoaderScope};
use crate::schema::TypeRegistry;
use crate::type_resolver::TypeResolver;
use crate::wiring::{CodeRegistryBuilder, RuntimeWiring, ScalarType, SchemaDirectiveWiring};
use gqlwire_core::ConfigurationError;
use std::fmt;
use std::sync::Arc;

/// Produces schema fragments; sees the registry merged so far.
pub type TypeDefinitionContributor =
    Arc<dyn Fn(&TypeRegistry) -> Result<Vec<SchemaFragment>, ConfigurationError> + Send + Sync>;

/// Adjusts the code registry after the component bindings are made.
pub type CodeRegistryContributor = Arc<dyn Fn(&mut CodeRegistryBuilder, &TypeRegistry) + Send + Sync>;

/// Adds to the runtime wiring after the code registry contributors ran.
pub type RuntimeWiringContributor = Arc<dyn Fn(&mut RuntimeWiring) + Send + Sync>;

/// A handler bound to a field.
#[derive(Debug, Clone)]
pub struct DataFetcherDefinition {
    parent_type: String,
    field: Option<String>,
    handler: Arc<MethodHandler>,
    instrumentation: Option<bool>,
}

impl DataFetcherDefinition {
    /// Creates a definition; the field defaults to the handler name.
    pub fn new(parent_type: impl Into<String>, handler: MethodHandler) -> Self {
        Self {
            parent_type: parent_type.into(),
            field: None,
            handler: Arc::new(handler),
            instrumentation: None,
        }
    }

    /// Sets the field name.
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Explicitly enables or disables field instrumentation.
    #[must_use]
    pub fn instrumentation(mut self, enabled: bool) -> Self {
        self.instrumentation = Some(enabled);
        self
    }

    pub fn parent_type(&self) -> &str {
        &self.parent_type
    }

    pub fn field_name(&self) -> &str {
        self.field.as_deref().unwrap_or_else(|| self.handler.name())
    }

    pub fn handler(&self) -> &Arc<MethodHandler> {
        &self.handler
    }

    /// Returns whether instrumentation applies to the bound fields.
    ///
    /// Without an explicit setting, async handlers are not instrumented.
    pub fn instrumentation_enabled(&self) -> bool {
        self.instrumentation
            .unwrap_or(!matches!(self.handler.shape(), HandlerShape::Async))
    }

    fn with_owner(mut self, owner: &str) -> Self {
        Arc::make_mut(&mut self.handler).set_owner(owner);
        self
    }
}

/// An explicit resolver for an interface or union.
#[derive(Clone)]
pub struct TypeResolverDefinition {
    pub type_name: String,
    pub resolver: Arc<dyn TypeResolver>,
}

impl fmt::Debug for TypeResolverDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeResolverDefinition")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Everything a component registers.
#[derive(Clone)]
pub struct Component {
    name: String,
    decorated: bool,
    data_fetchers: Vec<DataFetcherDefinition>,
    entity_fetchers: Vec<(String, EntityHandler)>,
    type_resolvers: Vec<TypeResolverDefinition>,
    data_loaders: Vec<(LoaderScope, BatchLoaderDefinition)>,
    scalars: Vec<ScalarType>,
    directives: Vec<(String, Arc<dyn SchemaDirectiveWiring>)>,
    type_definitions: Vec<TypeDefinitionContributor>,
    code_registry: Vec<CodeRegistryContributor>,
    runtime_wiring: Vec<RuntimeWiringContributor>,
}

impl Component {
    /// Creates a new component.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            decorated: false,
            data_fetchers: Vec::new(),
            entity_fetchers: Vec::new(),
            type_resolvers: Vec::new(),
            data_loaders: Vec::new(),
            scalars: Vec::new(),
            directives: Vec::new(),
            type_definitions: Vec::new(),
            code_registry: Vec::new(),
            runtime_wiring: Vec::new(),
        }
    }

    /// Marks the component as wrapped by a decorator.
    ///
    /// Field-scoped loaders are rejected on decorated components.
    #[must_use]
    pub fn decorated(mut self) -> Self {
        self.decorated = true;
        self
    }

    /// Binds a handler to `parent_type.<handler name>`.
    #[must_use]
    pub fn data_fetcher(self, parent_type: impl Into<String>, handler: MethodHandler) -> Self {
        self.data_fetcher_definition(DataFetcherDefinition::new(parent_type, handler))
    }

    /// Adds a data fetcher definition.
    #[must_use]
    pub fn data_fetcher_definition(mut self, definition: DataFetcherDefinition) -> Self {
        let definition = definition.with_owner(&self.name);
        self.data_fetchers.push(definition);
        self
    }

    /// Adds an entity fetcher for a federated type.
    #[must_use]
    pub fn entity_fetcher(mut self, typename: impl Into<String>, handler: EntityHandler) -> Self {
        self.entity_fetchers.push((typename.into(), handler));
        self
    }

    /// Adds an explicit type resolver.
    #[must_use]
    pub fn type_resolver(mut self, type_name: impl Into<String>, resolver: Arc<dyn TypeResolver>) -> Self {
        self.type_resolvers.push(TypeResolverDefinition {
            type_name: type_name.into(),
            resolver,
        });
        self
    }

    /// Declares a component-scoped loader. A blank name takes the component's
    /// simple name.
    #[must_use]
    pub fn data_loader(mut self, definition: BatchLoaderDefinition) -> Self {
        self.data_loaders.push((LoaderScope::Component, definition));
        self
    }

    /// Declares a field-scoped loader, which must be named.
    #[must_use]
    pub fn field_data_loader(mut self, definition: BatchLoaderDefinition) -> Self {
        self.data_loaders.push((LoaderScope::Field, definition));
        self
    }

    #[must_use]
    pub fn scalar(mut self, scalar: ScalarType) -> Self {
        self.scalars.push(scalar);
        self
    }

    /// Adds a directive wiring; a blank name makes it global.
    #[must_use]
    pub fn directive(mut self, name: impl Into<String>, wiring: Arc<dyn SchemaDirectiveWiring>) -> Self {
        self.directives.push((name.into(), wiring));
        self
    }

    /// Adds a type definition contributor.
    #[must_use]
    pub fn type_definitions<F>(mut self, f: F) -> Self
    where
        F: Fn(&TypeRegistry) -> Result<Vec<SchemaFragment>, ConfigurationError> + Send + Sync + 'static,
    {
        self.type_definitions.push(Arc::new(f));
        self
    }

    /// Adds a code registry contributor.
    #[must_use]
    pub fn code_registry<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut CodeRegistryBuilder, &TypeRegistry) + Send + Sync + 'static,
    {
        self.code_registry.push(Arc::new(f));
        self
    }

    /// Adds a runtime wiring contributor.
    #[must_use]
    pub fn runtime_wiring<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RuntimeWiring) + Send + Sync + 'static,
    {
        self.runtime_wiring.push(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_decorated(&self) -> bool {
        self.decorated
    }

    pub fn data_fetchers(&self) -> &[DataFetcherDefinition] {
        &self.data_fetchers
    }

    pub fn entity_fetchers(&self) -> &[(String, EntityHandler)] {
        &self.entity_fetchers
    }

    pub fn type_resolvers(&self) -> &[TypeResolverDefinition] {
        &self.type_resolvers
    }

    pub fn data_loaders(&self) -> &[(LoaderScope, BatchLoaderDefinition)] {
        &self.data_loaders
    }

    pub fn scalars(&self) -> &[ScalarType] {
        &self.scalars
    }

    pub fn directives(&self) -> &[(String, Arc<dyn SchemaDirectiveWiring>)] {
        &self.directives
    }

    pub fn type_definition_contributors(&self) -> &[TypeDefinitionContributor] {
        &self.type_definitions
    }

    pub fn code_registry_contributors(&self) -> &[CodeRegistryContributor] {
        &self.code_registry
    }

    pub fn runtime_wiring_contributors(&self) -> &[RuntimeWiringContributor] {
        &self.runtime_wiring
    }

    /// Returns true if the component contributes types or wiring by hand.
    pub fn has_contributors(&self) -> bool {
        !self.type_definitions.is_empty()
            || !self.code_registry.is_empty()
            || !self.runtime_wiring.is_empty()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("decorated", &self.decorated)
            .field("data_fetchers", &self.data_fetchers.len())
            .field("entity_fetchers", &self.entity_fetchers.len())
            .field("type_resolvers", &self.type_resolvers.len())
            .field("data_loaders", &self.data_loaders.len())
            .finish_non_exhaustive()
    }
}

type ComponentFilter = Arc<dyn Fn(&Component) -> bool + Send + Sync>;

/// The registered components, in registration order.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    components: Vec<Component>,
    filter: Option<ComponentFilter>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component.
    #[must_use]
    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    /// Adds a component.
    pub fn register(&mut self, component: Component) {
        self.components.push(component);
    }

    /// Only components accepted by the filter take part in assembly.
    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Component) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Returns the components that pass the filter.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components
            .iter()
            .filter(|c| self.filter.as_ref().map_or(true, |accept| accept(c)))
    }

    /// Returns the number of registered components, filtered or not.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.components)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}
