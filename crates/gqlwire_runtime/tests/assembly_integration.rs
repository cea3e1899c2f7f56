//! Integration tests for schema assembly and field resolution.

use gqlwire_core::{AssemblerConfig, ConfigurationError, ErrorType, ExtensionsConfig, FieldCoordinates};
use gqlwire_runtime::{
    component::DataFetcherDefinition,
    fetcher::FnDataFetcher,
    schema::TypeRegistry,
    type_resolver::FnTypeResolver,
    Component, ComponentRegistry, DataFetchingEnvironment, HandlerError, MethodHandler,
    SchemaAssembler, SchemaFragment,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const SCHEMA: &str = r#"
type Query {
    shows(titleFilter: String, filter: ShowFilter): [Show]
    search: [SearchResult]
    video: Video
}

input ShowFilter { releaseYear: Int }

interface Video { title: String }

type Show implements Video {
    title: String
    releaseYear: Int
}

type Movie implements Video {
    title: String
    director: String
}

union SearchResult = Show | Movie
"#;

fn shows() -> Value {
    json!([
        { "title": "Stranger Things", "release_year": 2016 },
        { "title": "Ozark", "release_year": 2017 },
        { "title": "The Crown", "release_year": 2016 },
    ])
}

fn shows_component() -> Component {
    let handler = MethodHandler::builder("shows")
        .input_argument("title_filter", "titleFilter")
        .input_argument("filter", "filter")
        .sync(|args| {
            #[derive(Deserialize)]
            struct Filter {
                release_year: Option<i64>,
            }
            let title: Option<String> = args.get(0)?;
            let filter: Option<Filter> = args.get(1)?;
            let year = filter.and_then(|f| f.release_year);
            let Value::Array(all) = shows() else {
                return Err(HandlerError::msg("no shows"));
            };
            Ok(Value::Array(
                all.into_iter()
                    .filter(|s| title.as_deref().map_or(true, |t| s["title"].as_str().is_some_and(|x| x.contains(t))))
                    .filter(|s| year.map_or(true, |y| s["release_year"] == y))
                    .collect(),
            ))
        });
    Component::new("ShowsDataFetcher").data_fetcher("Query", handler)
}

fn assembler(components: impl IntoIterator<Item = Component>) -> Result<SchemaAssembler, ConfigurationError> {
    let mut builder = SchemaAssembler::builder().with_raw_schema(SCHEMA);
    for component in components {
        builder = builder.with_component(component);
    }
    builder.build()
}

/// Test an input argument flows through the chain into the handler.
#[tokio::test]
async fn test_input_argument_reaches_handler() {
    let assembler = assembler([shows_component()]).unwrap();
    let snapshot = assembler.snapshot().await;

    let env = DataFetchingEnvironment::new(FieldCoordinates::new("Query", "shows"))
        .with_argument("titleFilter", json!("Ozark"));
    let result = snapshot.fetch_field(env).await;
    assert!(!result.has_errors());
    assert_eq!(result.data, json!([{ "title": "Ozark", "release_year": 2017 }]));
}

/// Test input objects are mapped to snake_case before conversion.
#[tokio::test]
async fn test_input_object_is_mapped() {
    let assembler = assembler([shows_component()]).unwrap();
    let snapshot = assembler.snapshot().await;

    let env = DataFetchingEnvironment::new(FieldCoordinates::new("Query", "shows"))
        .with_argument("filter", json!({ "releaseYear": 2016 }));
    let result = snapshot.fetch_field(env).await;
    assert_eq!(result.data.as_array().map(Vec::len), Some(2));
}

/// Test a handler failure is converted by the exception handler.
#[tokio::test]
async fn test_handler_error_becomes_graphql_error() {
    #[derive(Debug, thiserror::Error)]
    #[error("show service is down")]
    struct ShowServiceDown;

    let failing = MethodHandler::builder("shows").sync(|_| Err(ShowServiceDown.into()));
    let assembler = assembler([Component::new("Broken").data_fetcher("Query", failing)]).unwrap();
    let snapshot = assembler.snapshot().await;

    let env = DataFetchingEnvironment::new(FieldCoordinates::new("Query", "shows"))
        .with_path(vec!["shows".into()]);
    let result = snapshot.fetch_field(env).await;
    assert_eq!(result.data, Value::Null);
    assert_eq!(result.errors.len(), 1);
    let error = &result.errors[0];
    assert!(error.message.ends_with("ShowServiceDown: show service is down"));
    assert_eq!(error.error_type(), Some(ErrorType::Internal));
    assert_eq!(error.extensions["class"], json!("ShowServiceDown"));
}

/// Test interface bindings fan out and record instrumentation flags.
#[tokio::test]
async fn test_interface_fan_out_and_instrumentation() {
    let title = MethodHandler::builder("title").future(|args| {
        let source = args.environment().source().clone();
        async move { Ok(json!(format!("Title of {}", source["id"]))) }
    });
    let director = DataFetcherDefinition::new(
        "Movie",
        MethodHandler::builder("director").future(|_| async { Ok(json!("Kubrick")) }),
    )
    .instrumentation(true);
    let assembler = assembler([Component::new("VideoFetcher")
        .data_fetcher("Video", title)
        .data_fetcher_definition(director)])
    .unwrap();

    let bindings = assembler.resolved_data_fetchers().await;
    let coordinates: Vec<_> = bindings.iter().map(|b| b.coordinates().to_string()).collect();
    assert_eq!(coordinates, ["Movie.director", "Movie.title", "Show.title"]);
    assert!(bindings.iter().all(|b| b.owner == "VideoFetcher"));

    assert!(!assembler.is_field_instrumentation_enabled("Show.title").await);
    assert!(assembler.is_field_instrumentation_enabled("Movie.director").await);
    assert!(assembler.is_field_instrumentation_enabled("Show.releaseYear").await);

    let snapshot = assembler.snapshot().await;
    let env = DataFetchingEnvironment::new(FieldCoordinates::new("Show", "title"))
        .with_source(json!({ "id": 7 }));
    assert_eq!(snapshot.fetch_field(env).await.data, json!("Title of 7"));
}

/// Test union members get the binding declared on the union.
#[tokio::test]
async fn test_union_fan_out() {
    let handler = MethodHandler::builder("title").sync(|_| Ok(json!("any")));
    let assembler = assembler([Component::new("Search").data_fetcher("SearchResult", handler)]).unwrap();
    let bindings = assembler.resolved_data_fetchers().await;
    assert_eq!(bindings.len(), 2);
    assert!(bindings.iter().all(|b| b.declared_parent == "SearchResult"));
}

/// Test a handler on an unknown type fails assembly.
#[test]
fn test_missing_parent_type() {
    let handler = MethodHandler::builder("episodes").sync(|_| Ok(json!([])));
    let err = assembler([Component::new("Episodes").data_fetcher("Season", handler)]).unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::MissingParentType {
            parent_type: "Season".into(),
            owner: "Episodes".into(),
            handler: "episodes".into(),
        }
    );
}

/// Test type resolver targets are checked.
#[test]
fn test_type_resolver_validation() {
    let resolver = Arc::new(FnTypeResolver::new(|_| Some("Show".into())));

    let err = assembler([Component::new("A").type_resolver("Show", resolver.clone())]).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidTypeResolver { .. }));

    let err = assembler([Component::new("A").type_resolver("Episode", resolver.clone())]).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidTypeResolver { .. }));

    let err = assembler([
        Component::new("A").type_resolver("Video", resolver.clone()),
        Component::new("B").type_resolver("Video", resolver),
    ])
    .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::DuplicateTypeResolver {
            type_name: "Video".into()
        }
    );
}

/// Test abstract types fall back to `__typename` resolution.
#[tokio::test]
async fn test_default_type_resolution() {
    let assembler = assembler([]).unwrap();
    let schema = assembler.schema().await;
    assert_eq!(
        schema.resolve_type("Video", &json!({ "__typename": "Movie" })).unwrap(),
        "Movie"
    );
    assert!(schema.resolve_type("SearchResult", &json!({ "title": "x" })).is_err());
}

/// Test contributors run in order and can extend the bindings.
#[tokio::test]
async fn test_contributors() {
    let component = Component::new("Ratings")
        .type_definitions(|_: &TypeRegistry| {
            Ok(vec![SchemaFragment::parse(
                "ratings.graphqls",
                "extend type Show { rating: Float }",
            )?])
        })
        .code_registry(|builder, registry| {
            let coordinates = FieldCoordinates::new("Show", "rating");
            assert!(registry.field(&coordinates).is_some());
            builder.data_fetcher(coordinates, Arc::new(FnDataFetcher::new(|_| Ok(json!(4.5)))));
        })
        .runtime_wiring(|wiring| {
            wiring.data_fetcher("Movie", "director", Arc::new(FnDataFetcher::new(|_| Ok(json!("Nolan")))));
        });
    let assembler = assembler([shows_component(), component]).unwrap();
    let snapshot = assembler.snapshot().await;

    let rating = snapshot
        .fetch_field(DataFetchingEnvironment::new(FieldCoordinates::new("Show", "rating")))
        .await;
    assert_eq!(rating.data, json!(4.5));
    let director = snapshot
        .fetch_field(DataFetchingEnvironment::new(FieldCoordinates::new("Movie", "director")))
        .await;
    assert_eq!(director.data, json!("Nolan"));
}

/// Test unbound fields read the parent value.
#[tokio::test]
async fn test_property_fallback() {
    let assembler = assembler([]).unwrap();
    let snapshot = assembler.snapshot().await;
    let env = DataFetchingEnvironment::new(FieldCoordinates::new("Show", "releaseYear"))
        .with_source(json!({ "release_year": 2016 }));
    assert_eq!(snapshot.fetch_field(env).await.data, json!(2016));
}

/// Test schema files are loaded from the configured locations.
#[tokio::test]
async fn test_schema_locations() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("schema/shows")).unwrap();
    std::fs::write(dir.path().join("schema/query.graphqls"), "type Query { shows: [Show] }").unwrap();
    std::fs::write(
        dir.path().join("schema/shows/show.graphql"),
        "type Show { title: String }",
    )
    .unwrap();

    let config = AssemblerConfig::new()
        .base_dir(dir.path())
        .extensions(ExtensionsConfig::none());
    let assembler = SchemaAssembler::builder()
        .with_config(config)
        .with_components(ComponentRegistry::new().with_component(shows_component()))
        .build()
        .unwrap();
    let schema = assembler.schema().await;
    assert!(schema.type_registry().contains("Show"));
    assert!(schema.scalar("DateTime").is_none());
    assert!(schema.type_registry().directive("Size").is_none());
}

/// Test a fragment that fails to parse names the fragment.
#[test]
fn test_invalid_fragment() {
    let err = SchemaAssembler::builder()
        .with_raw_schema("type Query {")
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidFragment { ref fragment, .. } if fragment == "<raw>"));
}

/// Test the introspection toggle hides introspection fields.
#[tokio::test]
async fn test_introspection_toggle() {
    let assembler = SchemaAssembler::builder()
        .with_raw_schema(SCHEMA)
        .with_config(AssemblerConfig::new().no_introspection())
        .build()
        .unwrap();
    let schema = assembler.schema().await;
    assert!(!schema.is_field_visible(&FieldCoordinates::new("Query", "__schema")));
    assert!(schema.is_field_visible(&FieldCoordinates::new("Query", "shows")));
}
