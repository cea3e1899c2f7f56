//! Schema type model and the merged type registry.
//!
//! Fragments contribute [`TypeDef`]s into one [`TypeRegistry`]; the registry
//! answers the polymorphism questions the assembler needs (which object types
//! implement an interface, which are members of a union).

use gqlwire_core::{ConfigurationError, FieldCoordinates};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin recorded for the built-in scalars.
pub const BUILTIN_ORIGIN: &str = "<builtin>";

/// Names of the built-in scalars.
pub const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// A type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeDef {
    Scalar(ScalarDef),
    Object(ObjectDef),
    Interface(InterfaceDef),
    Union(UnionDef),
    Enum(EnumDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    /// Returns the type name.
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(s) => &s.name,
            Self::Object(o) => &o.name,
            Self::Interface(i) => &i.name,
            Self::Union(u) => &u.name,
            Self::Enum(e) => &e.name,
            Self::InputObject(i) => &i.name,
        }
    }

    /// Returns the kind as written in SDL.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Object(_) => "type",
            Self::Interface(_) => "interface",
            Self::Union(_) => "union",
            Self::Enum(_) => "enum",
            Self::InputObject(_) => "input",
        }
    }

    /// Returns true for interfaces and unions.
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Union(_))
    }

    /// Returns the fields of an object or interface.
    pub fn fields(&self) -> Option<&IndexMap<String, FieldDef>> {
        match self {
            Self::Object(o) => Some(&o.fields),
            Self::Interface(i) => Some(&i.fields),
            _ => None,
        }
    }

    /// Returns the directives applied to the type.
    pub fn directives(&self) -> &[DirectiveUse] {
        match self {
            Self::Scalar(s) => &s.directives,
            Self::Object(o) => &o.directives,
            Self::Interface(i) => &i.directives,
            Self::Union(u) => &u.directives,
            Self::Enum(e) => &e.directives,
            Self::InputObject(i) => &i.directives,
        }
    }
}

/// Scalar type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
    pub directives: Vec<DirectiveUse>,
}

/// Object type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
    pub directives: Vec<DirectiveUse>,
}

impl ObjectDef {
    /// Creates an object type with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
            implements: Vec::new(),
            directives: Vec::new(),
        }
    }
}

/// Interface type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
    pub directives: Vec<DirectiveUse>,
}

/// Union type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionDef {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<String>,
    pub directives: Vec<DirectiveUse>,
}

/// Enum type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<EnumValueDef>,
    pub directives: Vec<DirectiveUse>,
}

/// Enum value definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumValueDef {
    pub name: String,
    pub description: Option<String>,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
}

/// Input object type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputFieldDef>,
    pub directives: Vec<DirectiveUse>,
}

/// Field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputFieldDef>,
    pub directives: Vec<DirectiveUse>,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
}

impl FieldDef {
    /// Creates a field without arguments.
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            arguments: IndexMap::new(),
            directives: Vec::new(),
            deprecated: false,
            deprecation_reason: None,
        }
    }

    /// Adds an argument.
    pub fn with_argument(mut self, argument: InputFieldDef) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }

    /// Returns true if the field carries the directive.
    pub fn has_directive(&self, name: &str) -> bool {
        self.directives.iter().any(|d| d.name == name)
    }
}

/// Input field or argument definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<serde_json::Value>,
    pub directives: Vec<DirectiveUse>,
}

impl InputFieldDef {
    /// Creates an input value without default or directives.
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            default_value: None,
            directives: Vec::new(),
        }
    }
}

/// A directive applied to a definition, with constant arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectiveUse {
    pub name: String,
    pub arguments: IndexMap<String, serde_json::Value>,
}

impl DirectiveUse {
    /// Creates a directive use without arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: IndexMap::new(),
        }
    }

    /// Adds an argument.
    pub fn with_argument(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Gets an argument value.
    pub fn argument(&self, name: &str) -> Option<&serde_json::Value> {
        self.arguments.get(name)
    }
}

/// Type reference. Nullable types are wrapped in `Option`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeRef {
    Named(String),
    Option(Box<TypeRef>),
    List(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn option(inner: TypeRef) -> Self {
        Self::Option(Box::new(inner))
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    /// Returns the innermost named type.
    pub fn named_type(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Option(inner) | Self::List(inner) => inner.named_type(),
        }
    }

    /// Returns true if null is an acceptable value.
    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::Option(_))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}!"),
            Self::List(inner) => write!(f, "[{inner}]!"),
            Self::Option(inner) => match inner.as_ref() {
                Self::Named(name) => f.write_str(name),
                Self::List(item) => write!(f, "[{item}]"),
                Self::Option(_) => write!(f, "{inner}"),
            },
        }
    }
}

/// Directive definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectiveDefinition {
    pub name: String,
    pub description: Option<String>,
    pub arguments: IndexMap<String, InputFieldDef>,
    pub locations: Vec<DirectiveLocation>,
    pub repeatable: bool,
}

/// Directive location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectiveLocation {
    Query,
    Mutation,
    Subscription,
    Field,
    FragmentDefinition,
    FragmentSpread,
    InlineFragment,
    VariableDefinition,
    Schema,
    Scalar,
    Object,
    FieldDefinition,
    ArgumentDefinition,
    Interface,
    Union,
    Enum,
    EnumValue,
    InputObject,
    InputFieldDefinition,
}

/// Root operation type names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootTypes {
    pub query: String,
    pub mutation: String,
    pub subscription: String,
}

impl Default for RootTypes {
    fn default() -> Self {
        Self {
            query: "Query".to_string(),
            mutation: "Mutation".to_string(),
            subscription: "Subscription".to_string(),
        }
    }
}

/// The merged set of type definitions from every schema fragment.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: IndexMap<String, TypeDef>,
    directives: IndexMap<String, DirectiveDefinition>,
    origins: FxHashMap<String, String>,
    roots: RootTypes,
    sources: Vec<String>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Creates a registry holding only the built-in scalars.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for name in BUILTIN_SCALARS {
            registry.types.insert(
                name.to_string(),
                TypeDef::Scalar(ScalarDef {
                    name: name.to_string(),
                    description: Some(format!("Built-in {name} scalar")),
                    directives: Vec::new(),
                }),
            );
            registry
                .origins
                .insert(name.to_string(), BUILTIN_ORIGIN.to_string());
        }
        registry
    }

    fn empty() -> Self {
        Self {
            types: IndexMap::new(),
            directives: IndexMap::new(),
            origins: FxHashMap::default(),
            roots: RootTypes::default(),
            sources: Vec::new(),
        }
    }

    /// Adds a type, failing if a type with the same name exists.
    pub fn add_type(&mut self, def: TypeDef, origin: &str) -> Result<(), ConfigurationError> {
        let name = def.name().to_string();
        if let Some(first) = self.origins.get(&name) {
            return Err(ConfigurationError::DuplicateType {
                name,
                first: first.clone(),
                second: origin.to_string(),
            });
        }
        self.origins.insert(name.clone(), origin.to_string());
        self.types.insert(name, def);
        Ok(())
    }

    /// Adds a directive definition, failing on duplicates.
    pub fn add_directive(&mut self, def: DirectiveDefinition) -> Result<(), ConfigurationError> {
        if self.directives.contains_key(&def.name) {
            return Err(ConfigurationError::DuplicateDirective { name: def.name });
        }
        self.directives.insert(def.name.clone(), def);
        Ok(())
    }

    /// Applies a type extension to an existing definition of the same kind.
    pub fn extend_type(&mut self, ext: TypeDef, origin: &str) -> Result<(), ConfigurationError> {
        let name = ext.name().to_string();
        let Some(existing) = self.types.get_mut(&name) else {
            return Err(ConfigurationError::ExtensionOfUnknownType {
                name,
                fragment: origin.to_string(),
            });
        };
        match (existing, ext) {
            (TypeDef::Object(base), TypeDef::Object(ext)) => {
                base.fields.extend(ext.fields);
                extend_unique(&mut base.implements, ext.implements);
                base.directives.extend(ext.directives);
            }
            (TypeDef::Interface(base), TypeDef::Interface(ext)) => {
                base.fields.extend(ext.fields);
                extend_unique(&mut base.implements, ext.implements);
                base.directives.extend(ext.directives);
            }
            (TypeDef::Union(base), TypeDef::Union(ext)) => {
                extend_unique(&mut base.members, ext.members);
                base.directives.extend(ext.directives);
            }
            (TypeDef::Enum(base), TypeDef::Enum(ext)) => {
                base.values.extend(ext.values);
                base.directives.extend(ext.directives);
            }
            (TypeDef::InputObject(base), TypeDef::InputObject(ext)) => {
                base.fields.extend(ext.fields);
                base.directives.extend(ext.directives);
            }
            (TypeDef::Scalar(base), TypeDef::Scalar(ext)) => {
                base.directives.extend(ext.directives);
            }
            (base, ext) => {
                return Err(ConfigurationError::InvalidFragment {
                    fragment: origin.to_string(),
                    message: format!(
                        "cannot extend {} `{}` with a {} extension",
                        base.kind(),
                        name,
                        ext.kind()
                    ),
                    line: 0,
                    column: 0,
                });
            }
        }
        Ok(())
    }

    /// Merges another registry into this one. Built-in scalars are shared.
    pub fn merge(&mut self, other: TypeRegistry) -> Result<(), ConfigurationError> {
        let TypeRegistry {
            types,
            directives,
            mut origins,
            roots,
            sources,
        } = other;
        for (name, def) in types {
            let origin = origins.remove(&name).unwrap_or_default();
            if origin == BUILTIN_ORIGIN && self.contains(&name) {
                continue;
            }
            self.add_type(def, &origin)?;
        }
        for (_, def) in directives {
            self.add_directive(def)?;
        }
        if roots != RootTypes::default() {
            self.roots = roots;
        }
        self.sources.extend(sources);
        Ok(())
    }

    /// Overrides the root operation type names.
    pub fn set_roots(&mut self, roots: RootTypes) {
        self.roots = roots;
    }

    /// Records SDL text that contributed to this registry.
    pub fn add_source(&mut self, source: impl Into<String>) {
        self.sources.push(source.into());
    }

    /// Returns the contributing SDL text joined into one document.
    pub fn sdl(&self) -> String {
        self.sources.join("\n")
    }

    /// Returns the root operation type names.
    pub fn roots(&self) -> &RootTypes {
        &self.roots
    }

    /// Gets a type by name.
    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Gets a mutable type by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut TypeDef> {
        self.types.get_mut(name)
    }

    /// Returns true if a type with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Returns all types in definition order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    /// Returns the number of types, built-ins included.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if the registry holds nothing beyond the built-in scalars.
    pub fn is_empty(&self) -> bool {
        self.origins.values().all(|origin| origin == BUILTIN_ORIGIN)
    }

    /// Gets a directive definition.
    pub fn directive(&self, name: &str) -> Option<&DirectiveDefinition> {
        self.directives.get(name)
    }

    /// Returns the fragment that defined a type.
    pub fn origin(&self, name: &str) -> Option<&str> {
        self.origins.get(name).map(String::as_str)
    }

    /// Gets a field definition.
    pub fn field(&self, coordinates: &FieldCoordinates) -> Option<&FieldDef> {
        self.get(&coordinates.parent_type)?
            .fields()?
            .get(&coordinates.field)
    }

    /// Returns true if the type is an interface or union.
    pub fn is_abstract(&self, name: &str) -> bool {
        self.get(name).is_some_and(TypeDef::is_abstract)
    }

    /// Returns the object types implementing an interface, in definition order.
    pub fn implementations(&self, interface: &str) -> Vec<&str> {
        self.types
            .values()
            .filter_map(|def| match def {
                TypeDef::Object(object) if object.implements.iter().any(|i| i == interface) => {
                    Some(object.name.as_str())
                }
                _ => None,
            })
            .collect()
    }

    /// Returns the concrete object types a value of `name` may have.
    ///
    /// An object type is its own only possible type; an unknown or
    /// non-composite type has none.
    pub fn possible_types(&self, name: &str) -> Vec<&str> {
        match self.get(name) {
            Some(TypeDef::Object(object)) => vec![object.name.as_str()],
            Some(TypeDef::Interface(interface)) => self.implementations(&interface.name),
            Some(TypeDef::Union(union)) => union
                .members
                .iter()
                .filter(|member| matches!(self.get(member), Some(TypeDef::Object(_))))
                .map(String::as_str)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns object types carrying the directive.
    pub fn objects_with_directive(&self, directive: &str) -> Vec<&str> {
        self.types
            .values()
            .filter_map(|def| match def {
                TypeDef::Object(object) if object.directives.iter().any(|d| d.name == directive) => {
                    Some(object.name.as_str())
                }
                _ => None,
            })
            .collect()
    }
}

fn extend_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}
