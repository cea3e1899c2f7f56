//! Resolution of abstract types to concrete object types.

use crate::schema::{TypeDef, TypeRegistry};
use gqlwire_core::ResolutionError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Name of the field the default resolver reads.
pub const TYPENAME_FIELD: &str = "__typename";

/// What a type resolver sees.
#[derive(Debug, Clone, Copy)]
pub struct TypeResolutionEnvironment<'a> {
    pub object: &'a Value,
    pub abstract_type: &'a str,
    pub registry: &'a TypeRegistry,
}

impl<'a> TypeResolutionEnvironment<'a> {
    pub fn new(object: &'a Value, abstract_type: &'a str, registry: &'a TypeRegistry) -> Self {
        Self {
            object,
            abstract_type,
            registry,
        }
    }

    /// Returns the `__typename` of the value, if it carries one.
    pub fn typename(&self) -> Option<&'a str> {
        self.object.get(TYPENAME_FIELD)?.as_str()
    }

    /// Returns true if `name` is an object type the abstract type may resolve to.
    pub fn is_possible_type(&self, name: &str) -> bool {
        self.registry
            .possible_types(self.abstract_type)
            .contains(&name)
    }
}

/// Maps a value of an interface or union to its object type.
pub trait TypeResolver: Send + Sync {
    /// Returns the name of the concrete object type.
    fn resolve(&self, environment: &TypeResolutionEnvironment<'_>) -> Result<String, ResolutionError>;
}

/// Runs a resolver and checks its answer against the possible types.
pub fn resolve_type(
    resolver: &dyn TypeResolver,
    environment: &TypeResolutionEnvironment<'_>,
) -> Result<String, ResolutionError> {
    let type_name = resolver.resolve(environment)?;
    if environment.is_possible_type(&type_name) {
        Ok(type_name)
    } else {
        Err(ResolutionError::InvalidResolvedType {
            abstract_type: environment.abstract_type.to_string(),
            type_name,
        })
    }
}

/// The fallback resolver for abstract types without an explicit one.
///
/// The value's `__typename` must name an object type that is a possible type
/// of the abstract type.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTypeResolver;

impl TypeResolver for DefaultTypeResolver {
    fn resolve(&self, environment: &TypeResolutionEnvironment<'_>) -> Result<String, ResolutionError> {
        let found = environment.typename();
        match found {
            Some(name)
                if matches!(environment.registry.get(name), Some(TypeDef::Object(_)))
                    && environment.is_possible_type(name) =>
            {
                Ok(name.to_string())
            }
            _ => Err(ResolutionError::NoConcreteType {
                abstract_type: environment.abstract_type.to_string(),
                found: found.map(str::to_string),
            }),
        }
    }
}

type ResolveFn = Arc<dyn Fn(&TypeResolutionEnvironment<'_>) -> Option<String> + Send + Sync>;

/// A type resolver backed by a closure.
#[derive(Clone)]
pub struct FnTypeResolver {
    func: ResolveFn,
}

impl FnTypeResolver {
    /// Creates a new resolver; returning `None` means no concrete type.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&TypeResolutionEnvironment<'_>) -> Option<String> + Send + Sync + 'static,
    {
        Self { func: Arc::new(f) }
    }
}

impl fmt::Debug for FnTypeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnTypeResolver")
    }
}

impl TypeResolver for FnTypeResolver {
    fn resolve(&self, environment: &TypeResolutionEnvironment<'_>) -> Result<String, ResolutionError> {
        (self.func)(environment).ok_or_else(|| ResolutionError::NoConcreteType {
            abstract_type: environment.abstract_type.to_string(),
            found: environment.typename().map(str::to_string),
        })
    }
}
