//! Argument validation directives: `@Size`, `@Range`, `@NotBlank` and `@Pattern`.
//!
//! [`ValidationDirectiveWiring`] is registered as a global wiring. Fields with
//! constrained arguments get their fetcher wrapped; a request violating a
//! constraint resolves to null with one `BAD_REQUEST` error per violation and
//! the wrapped fetcher is not called.

use crate::environment::DataFetchingEnvironment;
use crate::fetcher::{DataFetcher, DataFetcherResult, FetchFuture, SharedDataFetcher};
use crate::handler::{HandlerError, HandlerStream};
use crate::schema::{FieldDef, TypeRegistry};
use crate::wiring::{FieldWiringEnvironment, SchemaDirectiveWiring};
use futures_util::FutureExt;
use gqlwire_core::GraphQLError;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Directive definitions added when the schema does not declare them.
const DEFINITIONS: [(&str, &str); 4] = [
    (
        "Size",
        "directive @Size(min: Int = 0, max: Int = 2147483647, message: String) on ARGUMENT_DEFINITION | INPUT_FIELD_DEFINITION",
    ),
    (
        "Range",
        "directive @Range(min: Int, max: Int, message: String) on ARGUMENT_DEFINITION | INPUT_FIELD_DEFINITION",
    ),
    (
        "NotBlank",
        "directive @NotBlank(message: String) on ARGUMENT_DEFINITION | INPUT_FIELD_DEFINITION",
    ),
    (
        "Pattern",
        "directive @Pattern(regexp: String!, message: String) on ARGUMENT_DEFINITION | INPUT_FIELD_DEFINITION",
    ),
];

/// Returns SDL for the validation directives missing from the registry.
pub fn missing_directive_definitions(registry: &TypeRegistry) -> Option<String> {
    let sdl: Vec<&str> = DEFINITIONS
        .iter()
        .filter(|(name, _)| registry.directive(name).is_none())
        .map(|(_, definition)| *definition)
        .collect();
    (!sdl.is_empty()).then(|| sdl.join("\n"))
}

#[derive(Debug, Clone)]
enum Constraint {
    Size { min: i64, max: i64 },
    Range { min: Option<f64>, max: Option<f64> },
    NotBlank,
    Pattern { source: String, regex: Regex },
}

#[derive(Debug, Clone)]
struct Rule {
    argument: String,
    constraint: Constraint,
    message: Option<String>,
}

impl Rule {
    /// Returns the violation message, if the value breaks the rule.
    fn check(&self, value: &Value) -> Option<String> {
        let violated = match (&self.constraint, value) {
            (Constraint::NotBlank, Value::String(s)) => s.trim().is_empty(),
            (Constraint::NotBlank, _) => true,
            (_, Value::Null) => false,
            (Constraint::Size { min, max }, value) => {
                let size = match value {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    _ => return None,
                };
                let size = i64::try_from(size).unwrap_or(i64::MAX);
                size < *min || size > *max
            }
            (Constraint::Range { min, max }, value) => match value.as_f64() {
                Some(n) => min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m),
                None => return None,
            },
            (Constraint::Pattern { regex, .. }, Value::String(s)) => !regex.is_match(s),
            (Constraint::Pattern { .. }, _) => false,
        };
        violated.then(|| {
            let detail = self.message.clone().unwrap_or_else(|| self.default_message());
            format!("{} {}", self.argument, detail)
        })
    }

    fn default_message(&self) -> String {
        match &self.constraint {
            Constraint::Size { min, max } => format!("size must be between {min} and {max}"),
            Constraint::Range { min, max } => format!(
                "range must be between {} and {}",
                min.map_or_else(|| "-inf".to_string(), |m| m.to_string()),
                max.map_or_else(|| "inf".to_string(), |m| m.to_string())
            ),
            Constraint::NotBlank => "must not be blank".to_string(),
            Constraint::Pattern { source, .. } => format!("must match \"{source}\""),
        }
    }
}

fn rules_for(field: &FieldDef) -> Vec<Rule> {
    let mut rules = Vec::new();
    for argument in field.arguments.values() {
        for directive in &argument.directives {
            let int = |name: &str| directive.argument(name).and_then(Value::as_i64);
            let float = |name: &str| directive.argument(name).and_then(Value::as_f64);
            let constraint = match directive.name.as_str() {
                "Size" => Constraint::Size {
                    min: int("min").unwrap_or(0),
                    max: int("max").unwrap_or_else(|| i64::from(i32::MAX)),
                },
                "Range" => Constraint::Range {
                    min: float("min"),
                    max: float("max"),
                },
                "NotBlank" => Constraint::NotBlank,
                "Pattern" => {
                    let Some(source) = directive.argument("regexp").and_then(Value::as_str) else {
                        warn!(field = %field.name, argument = %argument.name, "@Pattern without regexp");
                        continue;
                    };
                    match Regex::new(&format!("^(?:{source})$")) {
                        Ok(regex) => Constraint::Pattern {
                            source: source.to_string(),
                            regex,
                        },
                        Err(e) => {
                            warn!(field = %field.name, argument = %argument.name, "Invalid @Pattern: {}", e);
                            continue;
                        }
                    }
                }
                _ => continue,
            };
            rules.push(Rule {
                argument: argument.name.clone(),
                constraint,
                message: directive
                    .argument("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
    }
    rules
}

/// The global wiring enforcing the validation directives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationDirectiveWiring;

impl SchemaDirectiveWiring for ValidationDirectiveWiring {
    fn on_field(
        &self,
        environment: &FieldWiringEnvironment<'_>,
        fetcher: SharedDataFetcher,
    ) -> SharedDataFetcher {
        let rules = rules_for(environment.field);
        if rules.is_empty() {
            return fetcher;
        }
        Arc::new(ValidatingDataFetcher {
            rules: rules.into(),
            inner: fetcher,
        })
    }
}

struct ValidatingDataFetcher {
    rules: Arc<[Rule]>,
    inner: SharedDataFetcher,
}

impl ValidatingDataFetcher {
    fn violations(&self, environment: &DataFetchingEnvironment) -> Vec<GraphQLError> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let value = environment.argument(&rule.argument).unwrap_or(&Value::Null);
                rule.check(value)
            })
            .map(|message| {
                GraphQLError::bad_request(message)
                    .with_path(environment.path().to_vec())
                    .with_extension("classification", "ExtendedValidation")
            })
            .collect()
    }
}

impl DataFetcher for ValidatingDataFetcher {
    fn fetch(&self, environment: DataFetchingEnvironment) -> FetchFuture {
        let errors = self.violations(&environment);
        if errors.is_empty() {
            return self.inner.fetch(environment);
        }
        futures_util::future::ready(Ok::<_, HandlerError>(
            DataFetcherResult::new(Value::Null).with_errors(errors),
        ))
        .boxed()
    }

    fn subscribe(&self, environment: DataFetchingEnvironment) -> Option<Result<HandlerStream, HandlerError>> {
        let errors = self.violations(&environment);
        match errors.first() {
            None => self.inner.subscribe(environment),
            Some(first) => Some(Err(HandlerError::typed(
                gqlwire_core::ErrorType::BadRequest,
                first.message.clone(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FnDataFetcher;
    use crate::fragment::{merge_fragments, SchemaFragment};
    use gqlwire_core::{ErrorType, FieldCoordinates, PathSegment};
    use serde_json::json;

    fn wired() -> (TypeRegistry, SharedDataFetcher) {
        let fragment = SchemaFragment::parse(
            "shows.graphqls",
            r#"
            type Query {
                shows(
                    titleFilter: String @Size(min: 2, max: 5)
                    year: Int @Range(min: 1900, max: 2100)
                    code: String @Pattern(regexp: "[A-Z]+")
                    owner: String @NotBlank(message: "needs an owner")
                ): [String]
            }
            "#,
        )
        .unwrap();
        let mut registry = TypeRegistry::new();
        merge_fragments(&mut registry, [&fragment]).unwrap();

        let coordinates = FieldCoordinates::new("Query", "shows");
        let field = registry.field(&coordinates).unwrap().clone();
        let environment = FieldWiringEnvironment {
            coordinates: &coordinates,
            field: &field,
            registry: &registry,
            directive: None,
        };
        let inner: SharedDataFetcher = Arc::new(FnDataFetcher::new(|_| Ok(json!(["ok"]))));
        let fetcher = ValidationDirectiveWiring.on_field(&environment, inner);
        (registry, fetcher)
    }

    #[test]
    fn test_missing_definitions() {
        let registry = TypeRegistry::new();
        let sdl = missing_directive_definitions(&registry).unwrap();
        assert!(sdl.contains("directive @Size"));
        assert!(sdl.contains("directive @Pattern"));
    }

    #[tokio::test]
    async fn test_valid_arguments_reach_fetcher() {
        let (_, fetcher) = wired();
        let env = DataFetchingEnvironment::new(FieldCoordinates::new("Query", "shows"))
            .with_argument("titleFilter", json!("Dark"))
            .with_argument("year", json!(2017))
            .with_argument("code", json!("DRK"))
            .with_argument("owner", json!("netflix"));
        let result = fetcher.fetch(env).await.unwrap();
        assert!(!result.has_errors());
        assert_eq!(result.data, json!(["ok"]));
    }

    #[tokio::test]
    async fn test_violations_are_reported() {
        let (_, fetcher) = wired();
        let env = DataFetchingEnvironment::new(FieldCoordinates::new("Query", "shows"))
            .with_argument("titleFilter", json!("x"))
            .with_argument("year", json!(1800))
            .with_argument("code", json!("drk"))
            .with_path(vec!["shows".into()]);
        let result = fetcher.fetch(env).await.unwrap();
        assert_eq!(result.data, Value::Null);

        let messages: Vec<_> = result.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            [
                "titleFilter size must be between 2 and 5",
                "year range must be between 1900 and 2100",
                "code must match \"[A-Z]+\"",
                "owner needs an owner",
            ]
        );
        assert_eq!(result.errors[0].error_type(), Some(ErrorType::BadRequest));
        assert_eq!(result.errors[0].path, vec![PathSegment::from("shows")]);
    }

    #[test]
    fn test_unconstrained_field_is_untouched() {
        let field = FieldDef::new("title", crate::schema::TypeRef::named("String"));
        assert!(rules_for(&field).is_empty());
    }
}
