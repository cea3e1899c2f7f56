//! Command-line interface for gqlwire.
//!
//! # Usage
//!
//! ```bash
//! # Parse and merge schema fragments
//! gqlwire check schema/query.graphqls schema/shows.graphqls
//!
//! # Assemble the schema described by a config file
//! gqlwire inspect --config gqlwire.toml
//!
//! # Print the assembled SDL
//! gqlwire inspect --sdl
//! ```

use clap::{Parser, Subcommand};
use colored::Colorize;
use gqlwire_core::{AssemblerConfig, ConfigurationError, FieldCoordinates};
use gqlwire_runtime::fragment::merge_fragments;
use gqlwire_runtime::schema::BUILTIN_ORIGIN;
use gqlwire_runtime::{Schema, SchemaAssembler, SchemaFragment, TypeRegistry};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file looked up by `inspect` when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "gqlwire.toml";

#[derive(Parser, Debug)]
#[command(name = "gqlwire")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse schema fragments and merge them into one registry
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Assemble the schema described by a config file
    Inspect {
        /// Config file; defaults apply when it does not exist
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Print the assembled SDL instead of the summary
        #[arg(long)]
        sdl: bool,

        /// Print the summary as JSON
        #[arg(long, conflicts_with = "sdl")]
        json: bool,
    },

    /// Print version information
    Version,
}

pub async fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Check { files } => Ok(check_files(&files, cli.verbose, cli.quiet)),
        Commands::Inspect { config, sdl, json } => {
            inspect(&config, InspectFormat::from_flags(sdl, json), cli.quiet).await
        }
        Commands::Version => {
            println!("gqlwire {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

fn report(error: ConfigurationError) {
    eprintln!("{:?}", miette::Report::new(error));
}

/// Parses every file, then merges the ones that parsed.
///
/// Returns every problem found; an empty list means the fragments form one
/// consistent registry.
pub fn check_fragments(files: &[PathBuf]) -> (TypeRegistry, Vec<ConfigurationError>) {
    let mut fragments = Vec::with_capacity(files.len());
    let mut errors = Vec::new();

    for file in files {
        let display = file.display().to_string();
        let parsed = std::fs::read_to_string(file)
            .map_err(|e| ConfigurationError::Io {
                path: display.clone(),
                message: e.to_string(),
            })
            .and_then(|source| SchemaFragment::parse(display, source));
        match parsed {
            Ok(fragment) => fragments.push(fragment),
            Err(e) => errors.push(e),
        }
    }

    let mut registry = TypeRegistry::new();
    if let Err(e) = merge_fragments(&mut registry, &fragments) {
        errors.push(e);
    }
    (registry, errors)
}

fn check_files(files: &[PathBuf], verbose: bool, quiet: bool) -> i32 {
    if verbose {
        for file in files {
            println!("{} {}", "Checking".blue(), file.display());
        }
    }

    let (registry, errors) = check_fragments(files);
    if !errors.is_empty() {
        let count = errors.len();
        for error in errors {
            report(error);
        }
        eprintln!("{} {} problem(s) found", "Error:".red().bold(), count);
        return 1;
    }

    if verbose {
        for def in registry.types() {
            if registry.origin(def.name()) != Some(BUILTIN_ORIGIN) {
                println!("  {} {}", def.kind().dimmed(), def.name());
            }
        }
    }
    if !quiet {
        println!(
            "{} {} file(s) checked",
            "Success:".green().bold(),
            files.len()
        );
    }
    0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InspectFormat {
    Summary,
    Sdl,
    Json,
}

impl InspectFormat {
    fn from_flags(sdl: bool, json: bool) -> Self {
        match (sdl, json) {
            (true, _) => Self::Sdl,
            (_, true) => Self::Json,
            _ => Self::Summary,
        }
    }
}

/// Loads the config at `path`, or the defaults rooted next to it.
pub fn load_config(path: &Path) -> Result<AssemblerConfig, ConfigurationError> {
    if path.is_file() {
        return AssemblerConfig::from_path(path);
    }
    debug!("{} not found, using default configuration", path.display());
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok(AssemblerConfig::new().base_dir(base))
}

/// One object or interface field of the assembled schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSummary {
    pub coordinates: FieldCoordinates,
    /// True if a data fetcher is bound; otherwise the field reads its parent.
    pub bound: bool,
    pub visible: bool,
}

/// What `inspect` prints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSummary {
    /// `(kind, name)` of every non-built-in type.
    pub types: Vec<(String, String)>,
    pub fields: Vec<FieldSummary>,
    pub scalars: Vec<String>,
    pub federated: bool,
}

impl SchemaSummary {
    pub fn from_schema(schema: &Schema) -> Self {
        let registry = schema.type_registry();
        let mut types = Vec::new();
        let mut fields = Vec::new();

        for def in registry.types() {
            if registry.origin(def.name()) == Some(BUILTIN_ORIGIN) {
                continue;
            }
            types.push((def.kind().to_string(), def.name().to_string()));
            for field in def.fields().into_iter().flat_map(|f| f.keys()) {
                let coordinates = FieldCoordinates::new(def.name(), field.as_str());
                fields.push(FieldSummary {
                    bound: schema.code_registry().bound_data_fetcher(&coordinates).is_some(),
                    visible: schema.is_field_visible(&coordinates),
                    coordinates,
                });
            }
        }

        let mut scalars: Vec<String> = schema.scalars().map(|s| s.name().to_string()).collect();
        scalars.sort();

        Self {
            types,
            fields,
            scalars,
            federated: registry.contains("_Service"),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "types": self.types.iter().map(|(kind, name)| json!({ "kind": kind, "name": name })).collect::<Vec<_>>(),
            "fields": self.fields.iter().map(|f| json!({
                "coordinates": f.coordinates.to_string(),
                "bound": f.bound,
                "visible": f.visible,
            })).collect::<Vec<_>>(),
            "scalars": self.scalars,
            "federated": self.federated,
        })
    }

    fn print(&self) {
        println!("{}", "Types".bold());
        for (kind, name) in &self.types {
            println!("  {} {}", kind.dimmed(), name);
        }

        println!("{}", "Fields".bold());
        for field in &self.fields {
            let status = if field.bound {
                "bound".green()
            } else {
                "property".dimmed()
            };
            let hidden = if field.visible { "" } else { " (hidden)" };
            println!("  {} {}{}", field.coordinates, status, hidden.yellow());
        }

        if !self.scalars.is_empty() {
            println!("{} {}", "Scalars".bold(), self.scalars.join(", "));
        }
        if self.federated {
            println!("{}", "Federation enabled".cyan());
        }
    }
}

async fn inspect(
    config: &Path,
    format: InspectFormat,
    quiet: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let assembled = load_config(config).and_then(|config| {
        SchemaAssembler::builder().with_config(config).build()
    });
    let assembler = match assembled {
        Ok(assembler) => assembler,
        Err(e) => {
            report(e);
            return Ok(1);
        }
    };
    let schema = assembler.schema().await;

    match format {
        InspectFormat::Sdl => println!("{}", schema.sdl()),
        InspectFormat::Json => {
            let summary = SchemaSummary::from_schema(&schema);
            println!("{}", serde_json::to_string_pretty(&summary.to_json())?);
        }
        InspectFormat::Summary => {
            let summary = SchemaSummary::from_schema(&schema);
            summary.print();
            if !quiet {
                println!(
                    "{} {} type(s), {} field(s)",
                    "Success:".green().bold(),
                    summary.types.len(),
                    summary.fields.len()
                );
            }
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_inspect_defaults() {
        let cli = Cli::parse_from(["gqlwire", "inspect"]);
        match cli.command {
            Commands::Inspect { config, sdl, json } => {
                assert_eq!(config, PathBuf::from(DEFAULT_CONFIG_FILE));
                assert_eq!(InspectFormat::from_flags(sdl, json), InspectFormat::Summary);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_sdl_and_json_conflict() {
        assert!(Cli::try_parse_from(["gqlwire", "inspect", "--sdl", "--json"]).is_err());
    }
}
