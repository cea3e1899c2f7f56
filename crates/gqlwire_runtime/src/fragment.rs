//! Schema fragments.
//!
//! A fragment is one unit of SDL text, parsed once with
//! `async-graphql-parser` and converted into the registry's type model.
//! Fragments are immutable; a reload parses them again from scratch.

use crate::schema::{
    DirectiveDefinition, DirectiveLocation, DirectiveUse, EnumDef, EnumValueDef, FieldDef,
    InputFieldDef, InputObjectDef, InterfaceDef, ObjectDef, RootTypes, ScalarDef, TypeDef,
    TypeRef, TypeRegistry, UnionDef,
};
use async_graphql_parser::types::{
    BaseType, ConstDirective, DirectiveDefinition as AstDirectiveDefinition,
    DirectiveLocation as AstDirectiveLocation, FieldDefinition, InputValueDefinition,
    SchemaDefinition, Type, TypeDefinition, TypeKind, TypeSystemDefinition,
};
use async_graphql_parser::Positioned;
use gqlwire_core::ConfigurationError;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

/// A parsed definition inside a fragment.
#[derive(Debug, Clone)]
enum Definition {
    Type { def: TypeDef, extend: bool },
    Directive(DirectiveDefinition),
    Schema(SchemaRoots),
}

#[derive(Debug, Clone, Default)]
struct SchemaRoots {
    query: Option<String>,
    mutation: Option<String>,
    subscription: Option<String>,
}

/// An immutable, parsed unit of type-definition source.
#[derive(Debug, Clone)]
pub struct SchemaFragment {
    name: String,
    source: String,
    definitions: Vec<Definition>,
}

impl SchemaFragment {
    /// Parses SDL text. `name` identifies the fragment in errors.
    pub fn parse(
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let source = source.into();
        let document = async_graphql_parser::parse_schema(&source).map_err(|e| {
            let (line, column) = e
                .positions()
                .next()
                .map_or((0, 0), |pos| (pos.line, pos.column));
            ConfigurationError::InvalidFragment {
                fragment: name.clone(),
                message: e.to_string(),
                line,
                column,
            }
        })?;

        let definitions = document
            .definitions
            .into_iter()
            .map(|definition| match definition {
                TypeSystemDefinition::Type(ty) => {
                    let extend = ty.node.extend;
                    Definition::Type {
                        def: convert_type(ty.node),
                        extend,
                    }
                }
                TypeSystemDefinition::Directive(directive) => {
                    Definition::Directive(convert_directive_definition(directive.node))
                }
                TypeSystemDefinition::Schema(schema) => {
                    Definition::Schema(convert_schema_definition(schema.node))
                }
            })
            .collect();

        Ok(Self {
            name,
            source,
            definitions,
        })
    }

    /// Returns the fragment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the SDL text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the number of top-level definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true if the fragment defines nothing.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Returns the names of the types this fragment defines (not extends).
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().filter_map(|definition| match definition {
            Definition::Type { def, extend: false } => Some(def.name()),
            _ => None,
        })
    }
}

/// Merges fragments into one registry.
///
/// Base definitions from every fragment are added first, then extensions are
/// applied, so an `extend type` may precede its base definition in file order.
pub fn merge_fragments<'a, I>(
    registry: &mut TypeRegistry,
    fragments: I,
) -> Result<(), ConfigurationError>
where
    I: IntoIterator<Item = &'a SchemaFragment>,
{
    let fragments: Vec<&SchemaFragment> = fragments.into_iter().collect();
    let mut roots = SchemaRoots::default();

    for fragment in &fragments {
        for definition in &fragment.definitions {
            match definition {
                Definition::Type { def, extend: false } => {
                    registry.add_type(def.clone(), &fragment.name)?;
                }
                Definition::Directive(def) => registry.add_directive(def.clone())?,
                Definition::Schema(schema) => {
                    roots.query = schema.query.clone().or(roots.query);
                    roots.mutation = schema.mutation.clone().or(roots.mutation);
                    roots.subscription = schema.subscription.clone().or(roots.subscription);
                }
                Definition::Type { extend: true, .. } => {}
            }
        }
        registry.add_source(fragment.source.clone());
    }

    for fragment in &fragments {
        for definition in &fragment.definitions {
            if let Definition::Type { def, extend: true } = definition {
                registry.extend_type(def.clone(), &fragment.name)?;
            }
        }
    }

    if roots.query.is_some() || roots.mutation.is_some() || roots.subscription.is_some() {
        let defaults = RootTypes::default();
        registry.set_roots(RootTypes {
            query: roots.query.unwrap_or(defaults.query),
            mutation: roots.mutation.unwrap_or(defaults.mutation),
            subscription: roots.subscription.unwrap_or(defaults.subscription),
        });
    }
    Ok(())
}

/// Loads every file matched by the given glob patterns, sorted by path.
///
/// A file matched by several patterns is loaded once.
pub fn load_fragments(locations: &[String]) -> Result<Vec<SchemaFragment>, ConfigurationError> {
    let mut paths = BTreeSet::<PathBuf>::new();
    for pattern in locations {
        let entries =
            glob::glob(pattern).map_err(|e| ConfigurationError::InvalidSchemaLocation {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        for entry in entries {
            let path = entry.map_err(|e| ConfigurationError::Io {
                path: e.path().display().to_string(),
                message: e.to_string(),
            })?;
            if path.is_file() {
                paths.insert(path);
            }
        }
    }

    paths
        .into_iter()
        .map(|path| {
            let display = path.display().to_string();
            debug!("loading schema fragment {}", path.display());
            let source = std::fs::read_to_string(&path).map_err(|e| ConfigurationError::Io {
                path: display.clone(),
                message: e.to_string(),
            })?;
            SchemaFragment::parse(display, source)
        })
        .collect()
}

fn convert_type(def: TypeDefinition) -> TypeDef {
    let name = def.name.node.to_string();
    let description = def.description.map(|d| d.node);
    let directives = convert_directives(def.directives);
    match def.kind {
        TypeKind::Scalar => TypeDef::Scalar(ScalarDef {
            name,
            description,
            directives,
        }),
        TypeKind::Object(object) => TypeDef::Object(ObjectDef {
            name,
            description,
            fields: convert_fields(object.fields),
            implements: object.implements.into_iter().map(|i| i.node.to_string()).collect(),
            directives,
        }),
        TypeKind::Interface(interface) => TypeDef::Interface(InterfaceDef {
            name,
            description,
            fields: convert_fields(interface.fields),
            implements: interface
                .implements
                .into_iter()
                .map(|i| i.node.to_string())
                .collect(),
            directives,
        }),
        TypeKind::Union(union) => TypeDef::Union(UnionDef {
            name,
            description,
            members: union.members.into_iter().map(|m| m.node.to_string()).collect(),
            directives,
        }),
        TypeKind::Enum(enumeration) => TypeDef::Enum(EnumDef {
            name,
            description,
            values: enumeration
                .values
                .into_iter()
                .map(|value| {
                    let value = value.node;
                    let directives = convert_directives(value.directives);
                    let (deprecated, deprecation_reason) = deprecation(&directives);
                    EnumValueDef {
                        name: value.value.node.to_string(),
                        description: value.description.map(|d| d.node),
                        deprecated,
                        deprecation_reason,
                    }
                })
                .collect(),
            directives,
        }),
        TypeKind::InputObject(input) => TypeDef::InputObject(InputObjectDef {
            name,
            description,
            fields: convert_input_values(input.fields),
            directives,
        }),
    }
}

fn convert_fields(fields: Vec<Positioned<FieldDefinition>>) -> IndexMap<String, FieldDef> {
    fields
        .into_iter()
        .map(|field| {
            let field = field.node;
            let directives = convert_directives(field.directives);
            let (deprecated, deprecation_reason) = deprecation(&directives);
            let name = field.name.node.to_string();
            (
                name.clone(),
                FieldDef {
                    name,
                    description: field.description.map(|d| d.node),
                    ty: convert_type_ref(&field.ty.node),
                    arguments: convert_input_values(field.arguments),
                    directives,
                    deprecated,
                    deprecation_reason,
                },
            )
        })
        .collect()
}

fn convert_input_values(
    values: Vec<Positioned<InputValueDefinition>>,
) -> IndexMap<String, InputFieldDef> {
    values
        .into_iter()
        .map(|value| {
            let value = value.node;
            let name = value.name.node.to_string();
            (
                name.clone(),
                InputFieldDef {
                    name,
                    description: value.description.map(|d| d.node),
                    ty: convert_type_ref(&value.ty.node),
                    default_value: value.default_value.and_then(|v| v.node.into_json().ok()),
                    directives: convert_directives(value.directives),
                },
            )
        })
        .collect()
}

fn convert_type_ref(ty: &Type) -> TypeRef {
    let inner = match &ty.base {
        BaseType::Named(name) => TypeRef::named(name.to_string()),
        BaseType::List(item) => TypeRef::list(convert_type_ref(item)),
    };
    if ty.nullable {
        TypeRef::option(inner)
    } else {
        inner
    }
}

fn convert_directives(directives: Vec<Positioned<ConstDirective>>) -> Vec<DirectiveUse> {
    directives
        .into_iter()
        .map(|directive| {
            let directive = directive.node;
            DirectiveUse {
                name: directive.name.node.to_string(),
                arguments: directive
                    .arguments
                    .into_iter()
                    .map(|(name, value)| {
                        (
                            name.node.to_string(),
                            value.node.into_json().unwrap_or(serde_json::Value::Null),
                        )
                    })
                    .collect(),
            }
        })
        .collect()
}

fn deprecation(directives: &[DirectiveUse]) -> (bool, Option<String>) {
    directives
        .iter()
        .find(|d| d.name == "deprecated")
        .map_or((false, None), |d| {
            (
                true,
                d.argument("reason")
                    .and_then(serde_json::Value::as_str)
                    .map(ToString::to_string),
            )
        })
}

fn convert_directive_definition(def: AstDirectiveDefinition) -> DirectiveDefinition {
    DirectiveDefinition {
        name: def.name.node.to_string(),
        description: def.description.map(|d| d.node),
        arguments: convert_input_values(def.arguments),
        locations: def
            .locations
            .into_iter()
            .map(|location| convert_location(location.node))
            .collect(),
        repeatable: def.is_repeatable,
    }
}

fn convert_location(location: AstDirectiveLocation) -> DirectiveLocation {
    match location {
        AstDirectiveLocation::Query => DirectiveLocation::Query,
        AstDirectiveLocation::Mutation => DirectiveLocation::Mutation,
        AstDirectiveLocation::Subscription => DirectiveLocation::Subscription,
        AstDirectiveLocation::Field => DirectiveLocation::Field,
        AstDirectiveLocation::FragmentDefinition => DirectiveLocation::FragmentDefinition,
        AstDirectiveLocation::FragmentSpread => DirectiveLocation::FragmentSpread,
        AstDirectiveLocation::InlineFragment => DirectiveLocation::InlineFragment,
        AstDirectiveLocation::VariableDefinition => DirectiveLocation::VariableDefinition,
        AstDirectiveLocation::Schema => DirectiveLocation::Schema,
        AstDirectiveLocation::Scalar => DirectiveLocation::Scalar,
        AstDirectiveLocation::Object => DirectiveLocation::Object,
        AstDirectiveLocation::FieldDefinition => DirectiveLocation::FieldDefinition,
        AstDirectiveLocation::ArgumentDefinition => DirectiveLocation::ArgumentDefinition,
        AstDirectiveLocation::Interface => DirectiveLocation::Interface,
        AstDirectiveLocation::Union => DirectiveLocation::Union,
        AstDirectiveLocation::Enum => DirectiveLocation::Enum,
        AstDirectiveLocation::EnumValue => DirectiveLocation::EnumValue,
        AstDirectiveLocation::InputObject => DirectiveLocation::InputObject,
        AstDirectiveLocation::InputFieldDefinition => DirectiveLocation::InputFieldDefinition,
    }
}

fn convert_schema_definition(def: SchemaDefinition) -> SchemaRoots {
    SchemaRoots {
        query: def.query.map(|n| n.node.to_string()),
        mutation: def.mutation.map(|n| n.node.to_string()),
        subscription: def.subscription.map(|n| n.node.to_string()),
    }
}
