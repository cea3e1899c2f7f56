//! Schema assembly: binds component handlers to schema coordinates and
//! publishes the result as a shared snapshot.
//!
//! One pass runs in a fixed order:
//! 1. enumerate components (after the registry filter)
//! 2. gather and merge fragments
//! 3. run type definition contributors
//! 4. bind data fetchers, fanning out over interfaces and unions
//! 5. register scalars and directive wirings
//! 6. register type resolvers, defaulting every abstract type
//! 7. run code registry, then runtime wiring contributors
//! 8. wire federation
//!
//! Directive wirings are applied last, around the bound fetchers.

use crate::argument::{ArgumentResolver, ArgumentResolverComposite, DefaultInputObjectMapper, InputObjectMapper};
use crate::component::{Component, ComponentRegistry, DataFetcherDefinition};
use crate::entity::EntityFetcherRegistry;
use crate::environment::DataFetchingEnvironment;
use crate::exception::{DataFetcherExceptionHandler, DefaultDataFetcherExceptionHandler, ExceptionParameters};
use crate::federation::{
    add_federation_types, needs_federation, DefaultFederationResolver, FederationResolver,
    ServiceDataFetcher, ENTITIES_FIELD, SERVICE_FIELD,
};
use crate::fetcher::{DataFetcherResult, MethodDataFetcher, PropertyDataFetcher, SharedDataFetcher};
use crate::fragment::{load_fragments, merge_fragments, SchemaFragment};
use crate::handler::MethodHandler;
use crate::loader_registry::{DataLoaderInstrumentation, DataLoaderProvider};
use crate::scalars::extended_scalars;
use crate::schema::{TypeDef, TypeRegistry};
use crate::type_resolver::DefaultTypeResolver;
use crate::validation::{missing_directive_definitions, ValidationDirectiveWiring};
use crate::wiring::{
    CodeRegistryBuilder, DefaultFieldVisibility, FieldVisibility, FieldWiringEnvironment,
    NoIntrospectionFieldVisibility, RuntimeWiring, Schema,
};
use gqlwire_core::{AssemblerConfig, ConfigurationError, FieldCoordinates};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Name of the fragment built from raw schema text.
pub const RAW_SCHEMA_FRAGMENT: &str = "<raw>";

const VALIDATION_FRAGMENT: &str = "<validation>";

/// Decides, per request, whether the schema must be reassembled.
pub trait ReloadIndicator: Send + Sync {
    fn reload(&self) -> bool;
}

impl<F> ReloadIndicator for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn reload(&self) -> bool {
        self()
    }
}

/// A handler bound to one concrete coordinate.
#[derive(Debug, Clone)]
pub struct DataFetcherBinding {
    pub owner: String,
    pub handler: Arc<MethodHandler>,
    /// The parent type the handler was declared on; an interface or union
    /// for fanned-out bindings.
    pub declared_parent: String,
    pub parent_type: String,
    pub field: String,
    pub instrumentation_enabled: bool,
}

impl DataFetcherBinding {
    pub fn coordinates(&self) -> FieldCoordinates {
        FieldCoordinates::new(self.parent_type.clone(), self.field.clone())
    }

    /// Returns true if the binding came from an interface or union.
    pub fn is_fanned_out(&self) -> bool {
        self.declared_parent != self.parent_type
    }
}

/// The product of one assembly pass.
pub struct SchemaSnapshot {
    schema: Schema,
    bindings: Vec<DataFetcherBinding>,
    instrumentation: FxHashMap<String, bool>,
    data_loader_provider: Arc<DataLoaderProvider>,
    entity_fetchers: Arc<EntityFetcherRegistry>,
    exception_handler: Arc<dyn DataFetcherExceptionHandler>,
}

impl SchemaSnapshot {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the bindings in coordinate order.
    pub fn bindings(&self) -> &[DataFetcherBinding] {
        &self.bindings
    }

    /// Returns the instrumentation flag for a `Type.field` key.
    ///
    /// Keys without a recorded flag count as enabled.
    pub fn is_field_instrumentation_enabled(&self, key: &str) -> bool {
        self.instrumentation.get(key).copied().unwrap_or(true)
    }

    pub fn data_loader_provider(&self) -> &Arc<DataLoaderProvider> {
        &self.data_loader_provider
    }

    pub fn entity_fetcher_registry(&self) -> &Arc<EntityFetcherRegistry> {
        &self.entity_fetchers
    }

    /// Resolves one field, routing a failure through the exception handler.
    ///
    /// The field definition and schema types are filled in when the caller
    /// did not supply them.
    pub async fn fetch_field(&self, environment: DataFetchingEnvironment) -> DataFetcherResult {
        let environment = self.with_schema_types(environment);
        let coordinates = environment.coordinates().clone();
        let path = environment.path().to_vec();
        match self.schema.data_fetcher(&coordinates).fetch(environment).await {
            Ok(result) => result,
            Err(error) => {
                let parameters = ExceptionParameters::new(error, path).with_coordinates(coordinates);
                let errors = self.exception_handler.handle(parameters).await;
                DataFetcherResult::new(serde_json::Value::Null).with_errors(errors)
            }
        }
    }
}

impl SchemaSnapshot {
    fn with_schema_types(&self, mut environment: DataFetchingEnvironment) -> DataFetchingEnvironment {
        if environment.type_registry().is_none() {
            environment = environment.with_type_registry(self.schema.shared_type_registry());
        }
        if environment.field_definition().is_none() {
            let definition = self.schema.type_registry().field(environment.coordinates()).cloned();
            if let Some(definition) = definition {
                environment = environment.with_field_definition(Arc::new(definition));
            }
        }
        environment
    }
}

impl fmt::Debug for SchemaSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaSnapshot")
            .field("schema", &self.schema)
            .field("bindings", &self.bindings.len())
            .field("data_loaders", &self.data_loader_provider.len())
            .field("entity_fetchers", &self.entity_fetchers.len())
            .finish()
    }
}

/// Builder for [`SchemaAssembler`].
pub struct SchemaAssemblerBuilder {
    config: AssemblerConfig,
    components: ComponentRegistry,
    raw_schema: Option<String>,
    fragments: Vec<SchemaFragment>,
    type_registry: Option<TypeRegistry>,
    argument_resolvers: Vec<Arc<dyn ArgumentResolver>>,
    input_mapper: Arc<dyn InputObjectMapper>,
    exception_handler: Arc<dyn DataFetcherExceptionHandler>,
    federation_resolver: Option<Arc<dyn FederationResolver>>,
    entity_type_mapping: FxHashMap<String, String>,
    loader_instrumentation: Vec<Arc<dyn DataLoaderInstrumentation>>,
    field_visibility: Option<Arc<dyn FieldVisibility>>,
    reload_indicator: Option<Arc<dyn ReloadIndicator>>,
}

impl SchemaAssemblerBuilder {
    /// Creates a new builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: AssemblerConfig::default(),
            components: ComponentRegistry::new(),
            raw_schema: None,
            fragments: Vec::new(),
            type_registry: None,
            argument_resolvers: Vec::new(),
            input_mapper: Arc::new(DefaultInputObjectMapper),
            exception_handler: Arc::new(DefaultDataFetcherExceptionHandler),
            federation_resolver: None,
            entity_type_mapping: FxHashMap::default(),
            loader_instrumentation: Vec::new(),
            field_visibility: None,
            reload_indicator: None,
        }
    }

    pub fn with_config(mut self, config: AssemblerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_components(mut self, components: ComponentRegistry) -> Self {
        self.components = components;
        self
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.register(component);
        self
    }

    /// Uses raw schema text instead of the configured locations.
    pub fn with_raw_schema(mut self, sdl: impl Into<String>) -> Self {
        self.raw_schema = Some(sdl.into());
        self
    }

    /// Adds a programmatic fragment, merged alongside the located ones.
    pub fn with_fragment(mut self, fragment: SchemaFragment) -> Self {
        self.fragments.push(fragment);
        self
    }

    /// Starts from an existing registry.
    pub fn with_type_registry(mut self, registry: TypeRegistry) -> Self {
        self.type_registry = Some(registry);
        self
    }

    /// Adds a custom argument resolver, consulted before the built-ins.
    pub fn with_argument_resolver(mut self, resolver: Arc<dyn ArgumentResolver>) -> Self {
        self.argument_resolvers.push(resolver);
        self
    }

    pub fn with_input_object_mapper(mut self, mapper: Arc<dyn InputObjectMapper>) -> Self {
        self.input_mapper = mapper;
        self
    }

    pub fn with_exception_handler(mut self, handler: Arc<dyn DataFetcherExceptionHandler>) -> Self {
        self.exception_handler = handler;
        self
    }

    /// Replaces the built-in federation resolver.
    pub fn with_federation_resolver(mut self, resolver: Arc<dyn FederationResolver>) -> Self {
        self.federation_resolver = Some(resolver);
        self
    }

    /// Maps a representation `__typename` to a schema type for `_Entity`.
    pub fn with_entity_type_mapping(mut self, typename: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.entity_type_mapping.insert(typename.into(), type_name.into());
        self
    }

    pub fn with_loader_instrumentation(mut self, provider: Arc<dyn DataLoaderInstrumentation>) -> Self {
        self.loader_instrumentation.push(provider);
        self
    }

    /// Overrides the visibility derived from the introspection setting.
    pub fn with_field_visibility(mut self, visibility: Arc<dyn FieldVisibility>) -> Self {
        self.field_visibility = Some(visibility);
        self
    }

    pub fn with_reload_indicator(mut self, indicator: Arc<dyn ReloadIndicator>) -> Self {
        self.reload_indicator = Some(indicator);
        self
    }

    /// Runs the first assembly pass.
    pub fn build(self) -> Result<SchemaAssembler, ConfigurationError> {
        let resolvers = Arc::new(ArgumentResolverComposite::with_defaults(
            self.argument_resolvers.iter().cloned(),
            Arc::clone(&self.input_mapper),
        ));
        let assembler = Assembler {
            config: self.config,
            components: self.components,
            raw_schema: self.raw_schema,
            fragments: self.fragments,
            type_registry: self.type_registry,
            resolvers,
            exception_handler: self.exception_handler,
            federation_resolver: self.federation_resolver,
            entity_type_mapping: self.entity_type_mapping,
            loader_instrumentation: self.loader_instrumentation,
            field_visibility: self.field_visibility,
        };
        let snapshot = assembler.assemble(assembler.raw_schema.as_deref(), assembler.visibility())?;
        Ok(SchemaAssembler {
            assembler,
            reload_indicator: self.reload_indicator,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }
}

impl Default for SchemaAssemblerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The immutable inputs of an assembly pass.
struct Assembler {
    config: AssemblerConfig,
    components: ComponentRegistry,
    raw_schema: Option<String>,
    fragments: Vec<SchemaFragment>,
    type_registry: Option<TypeRegistry>,
    resolvers: Arc<ArgumentResolverComposite>,
    exception_handler: Arc<dyn DataFetcherExceptionHandler>,
    federation_resolver: Option<Arc<dyn FederationResolver>>,
    entity_type_mapping: FxHashMap<String, String>,
    loader_instrumentation: Vec<Arc<dyn DataLoaderInstrumentation>>,
    field_visibility: Option<Arc<dyn FieldVisibility>>,
}

impl Assembler {
    fn visibility(&self) -> Arc<dyn FieldVisibility> {
        match &self.field_visibility {
            Some(visibility) => Arc::clone(visibility),
            None if self.config.introspection => Arc::new(DefaultFieldVisibility),
            None => Arc::new(NoIntrospectionFieldVisibility),
        }
    }

    fn assemble(
        &self,
        raw_schema: Option<&str>,
        visibility: Arc<dyn FieldVisibility>,
    ) -> Result<SchemaSnapshot, ConfigurationError> {
        let started = Instant::now();

        // 1
        let components: Vec<&Component> = self.components.components().collect();

        // 2
        let mut registry = self.type_registry.clone().unwrap_or_default();
        let mut fragments = match raw_schema {
            Some(sdl) => vec![SchemaFragment::parse(RAW_SCHEMA_FRAGMENT, sdl)?],
            None => load_fragments(&self.config.resolved_locations())?,
        };
        fragments.extend(self.fragments.iter().cloned());
        let has_contributors = components.iter().any(|c| c.has_contributors());
        if fragments.is_empty() && self.type_registry.is_none() && !has_contributors {
            return Err(ConfigurationError::NoSchemaFound {
                locations: self.config.resolved_locations(),
            });
        }
        merge_fragments(&mut registry, &fragments)?;

        // 3
        for component in &components {
            for contributor in component.type_definition_contributors() {
                let contributed = contributor(&registry)?;
                merge_fragments(&mut registry, &contributed)?;
            }
        }
        if self.config.extensions.validation {
            if let Some(sdl) = missing_directive_definitions(&registry) {
                let fragment = SchemaFragment::parse(VALIDATION_FRAGMENT, sdl)?;
                merge_fragments(&mut registry, [&fragment])?;
            }
        }
        let sdl: Arc<str> = registry.sdl().into();

        // 4
        let mut code_registry = CodeRegistryBuilder::new();
        let mut instrumentation = FxHashMap::default();
        let bindings = self.bind_data_fetchers(&components, &registry)?;
        let mut fetchers: FxHashMap<_, SharedDataFetcher> = FxHashMap::default();
        for binding in &bindings {
            let fetcher = fetchers.entry(binding.handler.id()).or_insert_with(|| -> SharedDataFetcher {
                Arc::new(MethodDataFetcher::new(
                    Arc::clone(&binding.handler),
                    Arc::clone(&self.resolvers),
                ))
            });
            let coordinates = binding.coordinates();
            debug!(
                coordinates = %coordinates,
                handler = %binding.handler.qualified_name(),
                "Bound data fetcher"
            );
            instrumentation.insert(coordinates.key(), binding.instrumentation_enabled);
            code_registry.data_fetcher(coordinates, Arc::clone(fetcher));
        }

        let mut loaders = DataLoaderProvider::new();
        loaders.set_instrumentation(self.loader_instrumentation.clone());
        for component in &components {
            for (scope, definition) in component.data_loaders() {
                loaders.register_declared(
                    component.name(),
                    component.is_decorated(),
                    *scope,
                    definition.clone(),
                )?;
            }
        }

        // 5
        let mut wiring = RuntimeWiring::new();
        let extensions = &self.config.extensions;
        for scalar in extended_scalars(&extensions.scalars) {
            wiring.scalar(scalar);
        }
        if extensions.validation {
            wiring.directive("", Arc::new(ValidationDirectiveWiring));
        }
        for component in &components {
            for scalar in component.scalars() {
                wiring.scalar(scalar.clone());
            }
            for (name, directive) in component.directives() {
                wiring.directive(name.clone(), Arc::clone(directive));
            }
        }

        // 6
        let mut resolver_owners: FxHashMap<&str, &str> = FxHashMap::default();
        for component in &components {
            for definition in component.type_resolvers() {
                let type_name = definition.type_name.as_str();
                let reason = match registry.get(type_name) {
                    None => Some("type not found"),
                    Some(def) if !def.is_abstract() => Some("type is not an interface or union"),
                    Some(_) => None,
                };
                if let Some(reason) = reason {
                    return Err(ConfigurationError::InvalidTypeResolver {
                        type_name: type_name.to_string(),
                        owner: component.name().to_string(),
                        reason: reason.to_string(),
                    });
                }
                if resolver_owners.insert(type_name, component.name()).is_some() {
                    return Err(ConfigurationError::DuplicateTypeResolver {
                        type_name: type_name.to_string(),
                    });
                }
                code_registry.type_resolver(type_name, Arc::clone(&definition.resolver));
            }
        }
        for def in registry.types().filter(|def| def.is_abstract()) {
            if !code_registry.has_type_resolver(def.name()) {
                code_registry.type_resolver(def.name(), Arc::new(DefaultTypeResolver));
            }
        }

        // 7
        for component in &components {
            for contributor in component.code_registry_contributors() {
                contributor(&mut code_registry, &registry);
            }
        }
        for component in &components {
            for contributor in component.runtime_wiring_contributors() {
                contributor(&mut wiring);
            }
        }
        let parts = wiring.into_parts();
        for (coordinates, fetcher) in parts.data_fetchers {
            code_registry.data_fetcher(coordinates, fetcher);
        }
        for (type_name, resolver) in parts.type_resolvers {
            code_registry.type_resolver(type_name, resolver);
        }

        // 8
        let entities = Arc::new(self.register_entity_fetchers(&components, &mut instrumentation)?);
        if needs_federation(&registry, &entities) {
            let added = add_federation_types(&mut registry, &entities)?;
            let resolver: Arc<dyn FederationResolver> = match &self.federation_resolver {
                Some(resolver) => Arc::clone(resolver),
                None => Arc::new(DefaultFederationResolver::with_options(
                    Arc::clone(&entities),
                    Arc::clone(&self.exception_handler),
                    self.entity_type_mapping.clone(),
                )),
            };
            for coordinates in added {
                let fetcher: SharedDataFetcher = match coordinates.field.as_str() {
                    ENTITIES_FIELD => resolver.entities_fetcher(),
                    SERVICE_FIELD => Arc::new(ServiceDataFetcher::new(Arc::clone(&sdl))),
                    _ => continue,
                };
                code_registry.data_fetcher(coordinates, fetcher);
            }
            if registry.contains("_Entity") {
                code_registry.type_resolver("_Entity", resolver.type_resolver());
            }
        }

        // Fields carrying a wired directive get a fetcher to wrap.
        for def in registry.types() {
            let Some(fields) = def.fields() else { continue };
            if !matches!(def, TypeDef::Object(_)) {
                continue;
            }
            for field in fields.values() {
                let wired = field.directives.iter().any(|d| parts.directives.contains_key(&d.name));
                let coordinates = FieldCoordinates::new(def.name(), field.name.clone());
                if wired && !code_registry.has_data_fetcher(&coordinates) {
                    code_registry.data_fetcher(coordinates, Arc::new(PropertyDataFetcher));
                }
            }
        }
        code_registry.map_data_fetchers(|coordinates, mut fetcher| {
            let Some(field) = registry.field(coordinates) else {
                return fetcher;
            };
            for directive in &field.directives {
                if let Some(wiring) = parts.directives.get(&directive.name) {
                    let environment = FieldWiringEnvironment {
                        coordinates,
                        field,
                        registry: &registry,
                        directive: Some(directive),
                    };
                    fetcher = wiring.on_field(&environment, fetcher);
                }
            }
            for wiring in &parts.global_directives {
                let environment = FieldWiringEnvironment {
                    coordinates,
                    field,
                    registry: &registry,
                    directive: None,
                };
                fetcher = wiring.on_field(&environment, fetcher);
            }
            fetcher
        });

        let schema = Schema::new(registry, code_registry.build(), parts.scalars, visibility, sdl);
        debug!("Assembled schema in {}ms", started.elapsed().as_millis());

        Ok(SchemaSnapshot {
            schema,
            bindings,
            instrumentation,
            data_loader_provider: Arc::new(loaders),
            entity_fetchers: entities,
            exception_handler: Arc::clone(&self.exception_handler),
        })
    }

    fn bind_data_fetchers(
        &self,
        components: &[&Component],
        registry: &TypeRegistry,
    ) -> Result<Vec<DataFetcherBinding>, ConfigurationError> {
        let mut declared: BTreeMap<FieldCoordinates, Vec<&DataFetcherDefinition>> = BTreeMap::new();
        for component in components {
            for definition in component.data_fetchers() {
                if !registry.contains(definition.parent_type()) {
                    return Err(ConfigurationError::MissingParentType {
                        parent_type: definition.parent_type().to_string(),
                        owner: component.name().to_string(),
                        handler: definition.handler().name().to_string(),
                    });
                }
                declared
                    .entry(FieldCoordinates::new(definition.parent_type(), definition.field_name()))
                    .or_default()
                    .push(definition);
            }
        }
        // BTreeMap order makes the reported duplicate the smallest one.
        if let Some((coordinates, _)) = declared.iter().find(|(_, defs)| defs.len() > 1) {
            return Err(ConfigurationError::DuplicateDataFetcher {
                coordinates: coordinates.clone(),
            });
        }

        let mut concrete: BTreeMap<FieldCoordinates, DataFetcherBinding> = BTreeMap::new();
        let mut fanned_out = Vec::new();
        for (coordinates, definitions) in &declared {
            let definition = definitions[0];
            let binding = |parent_type: &str| DataFetcherBinding {
                owner: definition.handler().owner().to_string(),
                handler: Arc::clone(definition.handler()),
                declared_parent: coordinates.parent_type.clone(),
                parent_type: parent_type.to_string(),
                field: coordinates.field.clone(),
                instrumentation_enabled: definition.instrumentation_enabled(),
            };
            if registry.is_abstract(&coordinates.parent_type) {
                for object in registry.possible_types(&coordinates.parent_type) {
                    fanned_out.push(binding(object));
                }
            } else {
                concrete.insert(coordinates.clone(), binding(&coordinates.parent_type));
            }
        }
        for binding in fanned_out {
            concrete.entry(binding.coordinates()).or_insert(binding);
        }
        Ok(concrete.into_values().collect())
    }

    fn register_entity_fetchers(
        &self,
        components: &[&Component],
        instrumentation: &mut FxHashMap<String, bool>,
    ) -> Result<EntityFetcherRegistry, ConfigurationError> {
        let mut entities = EntityFetcherRegistry::new();
        for component in components {
            for (typename, handler) in component.entity_fetchers() {
                if let Some(first) = entities.get(typename) {
                    return Err(ConfigurationError::DuplicateEntityFetcher {
                        typename: typename.clone(),
                        first: first.owner.clone(),
                        second: component.name().to_string(),
                    });
                }
                entities.put(typename.clone(), component.name(), handler.clone());
                instrumentation.insert(format!("__entities.{typename}"), false);
            }
        }
        Ok(entities)
    }
}

/// Owns the published snapshot and rebuilds it on demand.
pub struct SchemaAssembler {
    assembler: Assembler,
    reload_indicator: Option<Arc<dyn ReloadIndicator>>,
    snapshot: RwLock<Arc<SchemaSnapshot>>,
}

impl SchemaAssembler {
    /// Starts configuring an assembler.
    pub fn builder() -> SchemaAssemblerBuilder {
        SchemaAssemblerBuilder::new()
    }

    /// Runs one assembly pass without publishing the result.
    pub fn assemble(
        &self,
        raw_schema: Option<&str>,
        field_visibility: Arc<dyn FieldVisibility>,
    ) -> Result<SchemaSnapshot, ConfigurationError> {
        self.assembler.assemble(raw_schema, field_visibility)
    }

    /// Returns the published snapshot.
    pub async fn snapshot(&self) -> Arc<SchemaSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Reassembles and publishes. On failure the previous snapshot stays
    /// published and the error is returned.
    ///
    /// Assembly reads the schema files synchronously and blocks the calling
    /// thread while the write lock is held. Run it inside
    /// `tokio::task::spawn_blocking` when the fragments are large.
    pub async fn reload(&self) -> Result<Arc<SchemaSnapshot>, ConfigurationError> {
        let mut published = self.snapshot.write().await;
        let snapshot = Arc::new(
            self.assembler
                .assemble(self.assembler.raw_schema.as_deref(), self.assembler.visibility())?,
        );
        *published = Arc::clone(&snapshot);
        info!("Reloaded schema");
        Ok(snapshot)
    }

    /// Returns the snapshot to use for a request, reloading first if the
    /// reload indicator asks for it.
    pub async fn snapshot_for_request(&self) -> Result<Arc<SchemaSnapshot>, ConfigurationError> {
        match &self.reload_indicator {
            Some(indicator) if indicator.reload() => self.reload().await,
            _ => Ok(self.snapshot().await),
        }
    }

    /// Returns the bindings of the published snapshot.
    pub async fn resolved_data_fetchers(&self) -> Vec<DataFetcherBinding> {
        self.snapshot().await.bindings().to_vec()
    }

    /// Returns the instrumentation flag of a `Type.field` key.
    pub async fn is_field_instrumentation_enabled(&self, key: &str) -> bool {
        self.snapshot().await.is_field_instrumentation_enabled(key)
    }

    pub async fn schema(&self) -> Schema {
        self.snapshot().await.schema().clone()
    }

    pub async fn data_loader_provider(&self) -> Arc<DataLoaderProvider> {
        Arc::clone(self.snapshot().await.data_loader_provider())
    }

    pub async fn entity_fetcher_registry(&self) -> Arc<EntityFetcherRegistry> {
        Arc::clone(self.snapshot().await.entity_fetcher_registry())
    }
}

impl fmt::Debug for SchemaAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaAssembler")
            .field("components", &self.assembler.components.len())
            .field("reload_indicator", &self.reload_indicator.is_some())
            .finish_non_exhaustive()
    }
}
