//! Integration tests for data loaders registered through components.

use gqlwire_core::{ConfigurationError, FieldCoordinates};
use gqlwire_runtime::{
    BatchLoader, BatchLoaderDefinition, Component, DataFetchingEnvironment, DataLoaderInstrumentation,
    DepthPredicate, FnBatchLoader, HandlerError, LoaderEnvironment, LoggingInstrumentation,
    MethodHandler, SchemaAssembler,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SCHEMA: &str = r#"
type Query { shows: [Show] }

type Show {
    id: ID!
    title: String
    director: String
}
"#;

fn titles() -> Arc<dyn BatchLoader> {
    Arc::new(FnBatchLoader::new(|keys: Vec<Value>, _env: LoaderEnvironment| async move {
        Ok::<_, HandlerError>(keys.iter().map(|k| json!(format!("Title {}", k))).collect())
    }))
}

fn title_fetcher() -> MethodHandler {
    MethodHandler::builder("title").future(|args| {
        let env = args.environment();
        let pending = env
            .data_loader("TitlesDataLoader")
            .map(|loader| loader.load(env.source()["id"].clone()));
        async move {
            let pending = pending.ok_or_else(|| HandlerError::msg("no loader"))?;
            pending.await.map_err(|e| e.into_handler_error())
        }
    })
}

fn components() -> [Component; 2] {
    [
        Component::new("app::TitlesDataLoader").data_loader(BatchLoaderDefinition::new("", titles())),
        Component::new("ShowsDataFetcher")
            .data_fetcher("Show", title_fetcher())
            .field_data_loader(
                BatchLoaderDefinition::new("directors", titles())
                    .dispatch_predicate(Arc::new(DepthPredicate(2))),
            ),
    ]
}

fn assembler() -> SchemaAssembler {
    let mut builder = SchemaAssembler::builder().with_raw_schema(SCHEMA);
    for component in components() {
        builder = builder.with_component(component);
    }
    builder.build().unwrap()
}

/// Test loaders are named by the rules for their scope.
#[tokio::test]
async fn test_loader_names() {
    let provider = assembler().data_loader_provider().await;
    assert_eq!(
        provider.names().collect::<Vec<_>>(),
        vec!["TitlesDataLoader", "directors"]
    );
    assert!(provider.get("directors").unwrap().has_predicate());
}

/// Test a handler loads through the request's dispatch registry.
#[tokio::test]
async fn test_handler_uses_loader() {
    let assembler = assembler();
    let snapshot = assembler.snapshot().await;
    let registry = snapshot.data_loader_provider().build_dispatch_registry();

    let env = |id: &str| {
        DataFetchingEnvironment::new(FieldCoordinates::new("Show", "title"))
            .with_source(json!({ "id": id }))
            .with_data_loaders(registry.clone())
    };
    let (first, second, duplicate, _) = tokio::join!(
        snapshot.fetch_field(env("s1")),
        snapshot.fetch_field(env("s2")),
        snapshot.fetch_field(env("s1")),
        async {
            tokio::task::yield_now().await;
            registry.dispatch_all().await;
        }
    );
    assert_eq!(first.data, json!("Title \"s1\""));
    assert_eq!(second.data, json!("Title \"s2\""));
    assert_eq!(duplicate.data, json!("Title \"s1\""));

    let cached = registry.get("TitlesDataLoader").unwrap().load(json!("s2")).await;
    assert_eq!(cached.unwrap(), json!("Title \"s2\""));

    let statistics = registry.statistics();
    assert_eq!(statistics.load_count, 4);
    assert_eq!(statistics.batch_invoke_count, 1);
    assert_eq!(statistics.batch_load_count, 2);
    assert_eq!(statistics.cache_hit_count, 1);
}

/// Test a field without a registry reports the missing loader.
#[tokio::test]
async fn test_missing_registry() {
    let assembler = assembler();
    let snapshot = assembler.snapshot().await;
    let env = DataFetchingEnvironment::new(FieldCoordinates::new("Show", "title"))
        .with_source(json!({ "id": "s1" }));
    let result = snapshot.fetch_field(env).await;
    assert_eq!(result.data, Value::Null);
    assert!(result.errors[0].message.contains("no loader"));
}

/// Test predicate loaders wait for their predicate outside `dispatch_all`.
#[tokio::test]
async fn test_predicate_group() {
    let provider = assembler().data_loader_provider().await;
    let registry = provider.build_dispatch_registry();
    let directors = registry.get("directors").unwrap();

    let first = directors.load(json!(1));
    assert_eq!(registry.dispatch_ready().await, 0);
    let second = directors.load(json!(2));
    assert_eq!(registry.dispatch_ready().await, 2);
    assert_eq!(first.await.unwrap(), json!("Title 1"));
    assert_eq!(second.await.unwrap(), json!("Title 2"));
}

/// Test primed values skip the batch and cleared keys load again.
#[tokio::test]
async fn test_prime_and_clear() {
    let provider = assembler().data_loader_provider().await;
    let registry = provider.build_dispatch_registry();
    let loader = registry.get("TitlesDataLoader").unwrap();

    loader.prime(json!("s1"), json!("Primed"));
    assert_eq!(loader.load(json!("s1")).await.unwrap(), json!("Primed"));
    assert_eq!(registry.dispatch_depth(), 0);

    loader.clear_key(&json!("s1"));
    let pending = loader.load(json!("s1"));
    assert_eq!(registry.dispatch_depth(), 1);
    registry.dispatch_all().await;
    assert_eq!(pending.await.unwrap(), json!("Title \"s1\""));
}

struct Counting(Arc<AtomicUsize>);

impl DataLoaderInstrumentation for Counting {
    fn provide(&self, loader: Arc<dyn BatchLoader>, _name: &str) -> Arc<dyn BatchLoader> {
        self.0.fetch_add(1, Ordering::SeqCst);
        loader
    }
}

/// Test instrumentation providers wrap every loader of every registry.
#[tokio::test]
async fn test_loader_instrumentation() {
    let provided = Arc::new(AtomicUsize::new(0));
    let mut builder = SchemaAssembler::builder()
        .with_raw_schema(SCHEMA)
        .with_loader_instrumentation(Arc::new(LoggingInstrumentation))
        .with_loader_instrumentation(Arc::new(Counting(Arc::clone(&provided))));
    for component in components() {
        builder = builder.with_component(component);
    }
    let assembler = builder.build().unwrap();

    let provider = assembler.data_loader_provider().await;
    provider.build_dispatch_registry();
    provider.build_dispatch_registry();
    assert_eq!(provided.load(Ordering::SeqCst), 4);
}

/// Test loader declaration errors fail assembly.
#[test]
fn test_loader_declaration_errors() {
    let build = |component: Component| {
        SchemaAssembler::builder()
            .with_raw_schema(SCHEMA)
            .with_component(component)
            .build()
    };

    let err = build(Component::new("ShowsDataFetcher").field_data_loader(BatchLoaderDefinition::new("", titles())))
        .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::UnnamedDataLoaderOnField {
            component: "ShowsDataFetcher".into()
        }
    );

    let err = build(
        Component::new("Decorated")
            .decorated()
            .field_data_loader(BatchLoaderDefinition::new("titles", titles())),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigurationError::DecoratedDataLoader { .. }));

    let err = build(
        Component::new("Twice")
            .data_loader(BatchLoaderDefinition::new("titles", titles()))
            .data_loader(BatchLoaderDefinition::new("titles", titles())),
    )
    .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::DuplicateDataLoader {
            name: "titles".into()
        }
    );
}
