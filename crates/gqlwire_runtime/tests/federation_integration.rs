//! Integration tests for federated entity resolution through an assembled schema.

use gqlwire_core::{ConfigurationError, ErrorType, FieldCoordinates, PathSegment};
use gqlwire_runtime::{
    federation::{ENTITIES_FIELD, REPRESENTATIONS_ARGUMENT, SERVICE_FIELD},
    Component, DataFetchingEnvironment, EntityHandler, HandlerError, SchemaAssembler,
};
use serde_json::{json, Value};

const SCHEMA: &str = r#"
type Query { shows: [Show] }

type Show @key(fields: "id") {
    id: ID!
    title: String
}

type Review @key(fields: "showId") {
    showId: ID!
    stars: Int
}
"#;

fn entities_component() -> Component {
    Component::new("ShowsEntityFetcher")
        .entity_fetcher(
            "Show",
            EntityHandler::new(|rep| {
                let id = rep.get("id").cloned().unwrap_or(Value::Null);
                Ok(json!({ "__typename": "Show", "id": id, "title": "Dark" }).into())
            }),
        )
        .entity_fetcher(
            "Review",
            EntityHandler::future(|rep| async move {
                match rep.get("showId").and_then(Value::as_str) {
                    Some("missing") => Err(HandlerError::typed(ErrorType::NotFound, "no reviews")),
                    _ => Ok(json!({ "__typename": "Review", "showId": rep["showId"], "stars": 5 })),
                }
            }),
        )
}

fn entities_env(representations: Value) -> DataFetchingEnvironment {
    DataFetchingEnvironment::new(FieldCoordinates::new("Query", ENTITIES_FIELD))
        .with_argument(REPRESENTATIONS_ARGUMENT, representations)
        .with_path(vec![ENTITIES_FIELD.into()])
}

/// Test federation types are added and the entity query resolves in order.
#[tokio::test]
async fn test_entities_query() {
    let assembler = SchemaAssembler::builder()
        .with_raw_schema(SCHEMA)
        .with_component(entities_component())
        .build()
        .unwrap();
    let snapshot = assembler.snapshot().await;

    let types = snapshot.schema().type_registry();
    for name in ["_Any", "_Entity", "_Service", "_FieldSet"] {
        assert!(types.contains(name), "missing {name}");
    }
    assert!(types.field(&FieldCoordinates::new("Query", ENTITIES_FIELD)).is_some());

    let result = snapshot
        .fetch_field(entities_env(json!([
            { "__typename": "Review", "showId": "s1" },
            { "__typename": "Show", "id": "s1" },
            { "__typename": "Review", "showId": "missing" },
        ])))
        .await;
    assert_eq!(
        result.data,
        json!([
            { "__typename": "Review", "showId": "s1", "stars": 5 },
            { "__typename": "Show", "id": "s1", "title": "Dark" },
            null,
        ])
    );
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message, "no reviews");
    assert_eq!(result.errors[0].error_type(), Some(ErrorType::NotFound));
    assert_eq!(
        result.errors[0].path,
        vec![PathSegment::from(ENTITIES_FIELD), PathSegment::from(2usize)]
    );

    let schema = snapshot.schema();
    assert_eq!(
        schema.resolve_type("_Entity", &result.data[1]).unwrap(),
        "Show"
    );
}

/// Test entity fetchers are excluded from field instrumentation.
#[tokio::test]
async fn test_entity_instrumentation_flags() {
    let assembler = SchemaAssembler::builder()
        .with_raw_schema(SCHEMA)
        .with_component(entities_component())
        .build()
        .unwrap();
    assert!(!assembler.is_field_instrumentation_enabled("__entities.Show").await);
    assert!(!assembler.is_field_instrumentation_enabled("__entities.Review").await);
    assert_eq!(assembler.entity_fetcher_registry().await.len(), 2);
}

/// Test missing representations are a bad request.
#[tokio::test]
async fn test_missing_representations() {
    let assembler = SchemaAssembler::builder()
        .with_raw_schema(SCHEMA)
        .with_component(entities_component())
        .build()
        .unwrap();
    let snapshot = assembler.snapshot().await;
    let result = snapshot
        .fetch_field(DataFetchingEnvironment::new(FieldCoordinates::new("Query", ENTITIES_FIELD)))
        .await;
    assert_eq!(result.data, Value::Null);
    assert_eq!(result.errors[0].error_type(), Some(ErrorType::BadRequest));
}

/// Test `_service` serves the SDL without the federation additions.
#[tokio::test]
async fn test_service_sdl() {
    let assembler = SchemaAssembler::builder()
        .with_raw_schema(SCHEMA)
        .build()
        .unwrap();
    let snapshot = assembler.snapshot().await;
    let result = snapshot
        .fetch_field(DataFetchingEnvironment::new(FieldCoordinates::new("Query", SERVICE_FIELD)))
        .await;
    let sdl = result.data["sdl"].as_str().unwrap();
    assert!(sdl.contains("type Show @key(fields: \"id\")"));
    assert!(!sdl.contains("_entities"));
}

/// Test a schema without keys or entity fetchers stays unfederated.
#[tokio::test]
async fn test_no_federation() {
    let assembler = SchemaAssembler::builder()
        .with_raw_schema("type Query { shows: [String] }")
        .build()
        .unwrap();
    let schema = assembler.schema().await;
    assert!(!schema.type_registry().contains("_Service"));
}

/// Test two entity fetchers for one type fail assembly.
#[test]
fn test_duplicate_entity_fetchers() {
    let err = SchemaAssembler::builder()
        .with_raw_schema(SCHEMA)
        .with_component(entities_component())
        .with_component(
            Component::new("OtherShows")
                .entity_fetcher("Show", EntityHandler::new(|_| Ok(Value::Null.into()))),
        )
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::DuplicateEntityFetcher {
            typename: "Show".into(),
            first: "ShowsEntityFetcher".into(),
            second: "OtherShows".into(),
        }
    );
}
