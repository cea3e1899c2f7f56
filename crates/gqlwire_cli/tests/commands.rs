//! Tests for the `check` and `inspect` building blocks.

use gqlwire_cli::{check_fragments, load_config, SchemaSummary};
use gqlwire_core::{ConfigurationError, FieldCoordinates};
use gqlwire_runtime::SchemaAssembler;
use std::path::Path;

fn write(dir: &Path, name: &str, sdl: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, sdl).unwrap();
    path
}

/// Test fragments that parse and merge report no problems.
#[test]
fn test_check_clean_fragments() {
    let dir = tempfile::tempdir().unwrap();
    let files = [
        write(dir.path(), "query.graphqls", "type Query { shows: [Show] }"),
        write(dir.path(), "show.graphqls", "type Show { title: String }"),
        write(dir.path(), "rating.graphqls", "extend type Show { rating: Float }"),
    ];
    let (registry, errors) = check_fragments(&files);
    assert!(errors.is_empty(), "{errors:?}");
    assert!(registry
        .field(&FieldCoordinates::new("Show", "rating"))
        .is_some());
}

/// Test parse and merge problems are all collected.
#[test]
fn test_check_reports_problems() {
    let dir = tempfile::tempdir().unwrap();
    let files = [
        write(dir.path(), "broken.graphqls", "type Query {"),
        write(dir.path(), "a.graphqls", "type Show { title: String }"),
        write(dir.path(), "b.graphqls", "type Show { id: ID }"),
        dir.path().join("missing.graphqls"),
    ];
    let (_, errors) = check_fragments(&files);
    assert_eq!(errors.len(), 3);
    assert!(matches!(errors[0], ConfigurationError::InvalidFragment { .. }));
    assert!(matches!(errors[1], ConfigurationError::Io { .. }));
    assert!(matches!(errors[2], ConfigurationError::DuplicateType { ref name, .. } if name == "Show"));
}

/// Test a missing config file falls back to defaults next to it.
#[test]
fn test_load_config_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(&dir.path().join("gqlwire.toml")).unwrap();
    assert_eq!(config.base_dir.as_deref(), Some(dir.path()));
    assert!(config.introspection);
}

/// Test the summary lists user types, fields and extension scalars.
#[tokio::test]
async fn test_inspect_summary() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "schema/shows.graphqls",
        r#"
        type Query { shows: [Show] }
        type Show @key(fields: "id") { id: ID! title: String }
        "#,
    );
    let config_path = write(
        dir.path(),
        "gqlwire.toml",
        "introspection = false\n\n[extensions.scalars]\nnumbers = false\n",
    );

    let config = load_config(&config_path).unwrap();
    let assembler = SchemaAssembler::builder().with_config(config).build().unwrap();
    let summary = SchemaSummary::from_schema(&assembler.schema().await);

    assert!(summary.federated);
    assert!(summary.types.contains(&("type".to_string(), "Show".to_string())));
    assert!(!summary.types.iter().any(|(_, name)| name == "String"));
    assert!(summary.scalars.contains(&"DateTime".to_string()));
    assert!(!summary.scalars.contains(&"Long".to_string()));

    let entities = summary
        .fields
        .iter()
        .find(|f| f.coordinates == FieldCoordinates::new("Query", "_entities"))
        .unwrap();
    assert!(entities.bound);
    let title = summary
        .fields
        .iter()
        .find(|f| f.coordinates == FieldCoordinates::new("Show", "title"))
        .unwrap();
    assert!(!title.bound);

    let json = summary.to_json();
    assert_eq!(json["federated"], serde_json::json!(true));
}
