//! Argument resolution for handler parameters.
//!
//! A handler declares its parameters through [`ParameterDescriptor`]s. At
//! invocation time the [`ArgumentResolverComposite`] picks, per parameter,
//! the first resolver that supports it and asks it for a value. The winning
//! resolver is cached per parameter identity.

use crate::environment::DataFetchingEnvironment;
use crate::handler::{ArgumentValue, HandlerId, ParameterDescriptor, ParameterKind};
use crate::schema::{TypeDef, TypeRef, TypeRegistry};
use dashmap::DashMap;
use gqlwire_core::ResolutionError;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Converts a parameter descriptor plus the field environment into a value.
pub trait ArgumentResolver: Send + Sync {
    /// Returns true if this resolver can produce a value for the parameter.
    fn supports(&self, parameter: &ParameterDescriptor) -> bool;

    /// Produces the value for a supported parameter.
    fn resolve(
        &self,
        parameter: &ParameterDescriptor,
        environment: &DataFetchingEnvironment,
    ) -> Result<ArgumentValue, ResolutionError>;
}

/// Converts raw input argument values before they reach a handler.
pub trait InputObjectMapper: Send + Sync {
    /// Maps one raw argument value declared with type `ty`.
    ///
    /// `ty` and `registry` are `None` when the engine supplied no schema
    /// information for the field.
    fn map_input(
        &self,
        value: Value,
        ty: Option<&TypeRef>,
        registry: Option<&TypeRegistry>,
    ) -> Result<Value, ResolutionError>;
}

/// Rewrites input object keys from camelCase to snake_case.
///
/// Only values declared as input objects are rewritten, recursing through
/// their input-object-typed fields. Scalars such as `JSON` and values of an
/// unknown type pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInputObjectMapper;

impl InputObjectMapper for DefaultInputObjectMapper {
    fn map_input(
        &self,
        value: Value,
        ty: Option<&TypeRef>,
        registry: Option<&TypeRegistry>,
    ) -> Result<Value, ResolutionError> {
        Ok(match (ty, registry) {
            (Some(ty), Some(registry)) => snake_case_keys(value, ty.named_type(), registry),
            _ => value,
        })
    }
}

/// Passes input values through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityInputObjectMapper;

impl InputObjectMapper for IdentityInputObjectMapper {
    fn map_input(
        &self,
        value: Value,
        _ty: Option<&TypeRef>,
        _registry: Option<&TypeRegistry>,
    ) -> Result<Value, ResolutionError> {
        Ok(value)
    }
}

fn snake_case_keys(value: Value, type_name: &str, registry: &TypeRegistry) -> Value {
    let Some(TypeDef::InputObject(input)) = registry.get(type_name) else {
        return value;
    };
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let v = match input.fields.get(&k) {
                        Some(field) => snake_case_keys(v, field.ty.named_type(), registry),
                        None => v,
                    };
                    (to_snake_case(&k), v)
                })
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| snake_case_keys(v, type_name, registry))
                .collect(),
        ),
        other => other,
    }
}

/// Converts a camelCase name to snake_case.
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// Resolves parameters bound to an explicitly named field argument.
pub struct InputArgumentResolver {
    mapper: Arc<dyn InputObjectMapper>,
}

impl InputArgumentResolver {
    /// Creates a new resolver using the given mapper.
    pub fn new(mapper: Arc<dyn InputObjectMapper>) -> Self {
        Self { mapper }
    }
}

impl Default for InputArgumentResolver {
    fn default() -> Self {
        Self::new(Arc::new(DefaultInputObjectMapper))
    }
}

impl fmt::Debug for InputArgumentResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputArgumentResolver").finish_non_exhaustive()
    }
}

impl ArgumentResolver for InputArgumentResolver {
    fn supports(&self, parameter: &ParameterDescriptor) -> bool {
        matches!(parameter.kind(), ParameterKind::InputArgument { .. })
    }

    fn resolve(
        &self,
        parameter: &ParameterDescriptor,
        environment: &DataFetchingEnvironment,
    ) -> Result<ArgumentValue, ResolutionError> {
        let name = match parameter.kind() {
            ParameterKind::InputArgument { name } => name.trim(),
            _ => "",
        };
        if name.is_empty() {
            return Err(ResolutionError::BlankArgumentName {
                index: parameter.index(),
                handler: environment.coordinates().to_string(),
            });
        }
        resolve_named(name, environment, self.mapper.as_ref())
    }
}

fn resolve_named(
    name: &str,
    environment: &DataFetchingEnvironment,
    mapper: &dyn InputObjectMapper,
) -> Result<ArgumentValue, ResolutionError> {
    let declared = environment
        .field_definition()
        .map(|definition| definition.arguments.get(name));
    if let Some(None) = declared {
        warn!(
            argument = name,
            field = %environment.coordinates(),
            "Unknown argument"
        );
    }

    match environment.argument(name) {
        Some(value) => mapper
            .map_input(
                value.clone(),
                declared.flatten().map(|argument| &argument.ty),
                environment.type_registry(),
            )
            .map(ArgumentValue::Value),
        None => Ok(ArgumentValue::Value(Value::Null)),
    }
}

/// Injects the data-fetching environment or the request context.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentArgumentResolver;

impl ArgumentResolver for EnvironmentArgumentResolver {
    fn supports(&self, parameter: &ParameterDescriptor) -> bool {
        matches!(
            parameter.kind(),
            ParameterKind::Environment | ParameterKind::Context
        )
    }

    fn resolve(
        &self,
        parameter: &ParameterDescriptor,
        environment: &DataFetchingEnvironment,
    ) -> Result<ArgumentValue, ResolutionError> {
        Ok(match parameter.kind() {
            ParameterKind::Context => ArgumentValue::Context(environment.context().clone()),
            _ => ArgumentValue::Environment(environment.clone()),
        })
    }
}

/// Treats the parameter's own name as the field argument name.
pub struct FallbackArgumentResolver {
    mapper: Arc<dyn InputObjectMapper>,
}

impl FallbackArgumentResolver {
    /// Creates a new resolver using the given mapper.
    pub fn new(mapper: Arc<dyn InputObjectMapper>) -> Self {
        Self { mapper }
    }
}

impl Default for FallbackArgumentResolver {
    fn default() -> Self {
        Self::new(Arc::new(DefaultInputObjectMapper))
    }
}

impl fmt::Debug for FallbackArgumentResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackArgumentResolver").finish_non_exhaustive()
    }
}

impl ArgumentResolver for FallbackArgumentResolver {
    fn supports(&self, parameter: &ParameterDescriptor) -> bool {
        matches!(parameter.kind(), ParameterKind::Argument)
    }

    fn resolve(
        &self,
        parameter: &ParameterDescriptor,
        environment: &DataFetchingEnvironment,
    ) -> Result<ArgumentValue, ResolutionError> {
        resolve_named(parameter.name(), environment, self.mapper.as_ref())
    }
}

/// An ordered chain of resolvers with a memoized lookup.
pub struct ArgumentResolverComposite {
    resolvers: Vec<Arc<dyn ArgumentResolver>>,
    cache: DashMap<(HandlerId, usize), usize>,
}

impl ArgumentResolverComposite {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
            cache: DashMap::new(),
        }
    }

    /// Creates the standard chain: custom resolvers first, then the built-ins.
    pub fn with_defaults(
        custom: impl IntoIterator<Item = Arc<dyn ArgumentResolver>>,
        mapper: Arc<dyn InputObjectMapper>,
    ) -> Self {
        let mut composite = Self::new();
        for resolver in custom {
            composite.add_resolver(resolver);
        }
        composite.add_resolver(Arc::new(InputArgumentResolver::new(mapper.clone())));
        composite.add_resolver(Arc::new(EnvironmentArgumentResolver));
        composite.add_resolver(Arc::new(FallbackArgumentResolver::new(mapper)));
        composite
    }

    /// Appends a resolver to the end of the chain.
    pub fn add_resolver(&mut self, resolver: Arc<dyn ArgumentResolver>) {
        self.resolvers.push(resolver);
        self.cache.clear();
    }

    /// Returns the number of resolvers in the chain.
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    /// Returns true if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Returns the position of the resolver that handles the parameter.
    ///
    /// Concurrent first lookups may both scan the chain; they compute the
    /// same position, so the cache only ever holds one answer per key.
    pub fn resolver_index(&self, parameter: &ParameterDescriptor) -> Option<usize> {
        if let Some(hit) = self.cache.get(&parameter.key()) {
            return Some(*hit);
        }
        let index = self.resolvers.iter().position(|r| r.supports(parameter))?;
        self.cache.insert(parameter.key(), index);
        Some(index)
    }

    /// Returns the resolver that handles the parameter.
    pub fn resolver_for(&self, parameter: &ParameterDescriptor) -> Option<&Arc<dyn ArgumentResolver>> {
        self.resolver_index(parameter)
            .and_then(|i| self.resolvers.get(i))
    }

    /// Returns the number of memoized lookups.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl Default for ArgumentResolverComposite {
    fn default() -> Self {
        Self::with_defaults(Vec::new(), Arc::new(DefaultInputObjectMapper))
    }
}

impl fmt::Debug for ArgumentResolverComposite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentResolverComposite")
            .field("resolvers", &self.resolvers.len())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl ArgumentResolver for ArgumentResolverComposite {
    fn supports(&self, parameter: &ParameterDescriptor) -> bool {
        self.resolver_index(parameter).is_some()
    }

    fn resolve(
        &self,
        parameter: &ParameterDescriptor,
        environment: &DataFetchingEnvironment,
    ) -> Result<ArgumentValue, ResolutionError> {
        match self.resolver_for(parameter) {
            Some(resolver) => resolver.resolve(parameter, environment),
            None => Err(ResolutionError::UnsupportedParameter {
                index: parameter.index(),
                handler: environment.coordinates().to_string(),
            }),
        }
    }
}
