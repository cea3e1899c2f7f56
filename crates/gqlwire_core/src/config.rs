//! Assembler configuration.
//!
//! The configuration only decides which schema fragments and built-in
//! handlers exist; it never changes how assembly itself works.
//!
//! ```toml
//! schema-locations = ["schema/**/*.graphqls"]
//! introspection = false
//!
//! [extensions.scalars]
//! numbers = false
//! ```

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default glob used to discover schema fragments.
pub const DEFAULT_SCHEMA_LOCATION: &str = "schema/**/*.graphql*";

/// Configuration consumed by the schema assembler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AssemblerConfig {
    /// Glob patterns of schema fragment files.
    pub schema_locations: Vec<String>,
    /// Directory the locations are resolved against. Defaults to the working directory.
    pub base_dir: Option<PathBuf>,
    /// Whether `__schema` and `__type` stay visible.
    pub introspection: bool,
    /// Built-in extension toggles.
    pub extensions: ExtensionsConfig,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AssemblerConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self {
            schema_locations: vec![DEFAULT_SCHEMA_LOCATION.to_string()],
            base_dir: None,
            introspection: true,
            extensions: ExtensionsConfig::default(),
        }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(source).map_err(|e| ConfigurationError::InvalidConfig(e.to_string()))
    }

    /// Reads and parses a TOML file. Relative locations resolve against the file's directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut config = Self::from_toml_str(&source)?;
        if config.base_dir.is_none() {
            config.base_dir = path.parent().map(Path::to_path_buf);
        }
        Ok(config)
    }

    /// Replaces the schema locations.
    pub fn schema_locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema_locations = locations.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the base directory for relative locations.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Hides introspection fields.
    pub fn no_introspection(mut self) -> Self {
        self.introspection = false;
        self
    }

    /// Replaces the extension toggles.
    pub fn extensions(mut self, extensions: ExtensionsConfig) -> Self {
        self.extensions = extensions;
        self
    }

    /// Returns the locations joined onto the base directory.
    pub fn resolved_locations(&self) -> Vec<String> {
        self.schema_locations
            .iter()
            .map(|location| match &self.base_dir {
                Some(base) if Path::new(location).is_relative() => {
                    base.join(location).to_string_lossy().into_owned()
                }
                _ => location.clone(),
            })
            .collect()
    }
}

/// Toggles for the built-in extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExtensionsConfig {
    /// Argument validation directives (`@Size`, `@Range`, `@NotBlank`, `@Pattern`).
    pub validation: bool,
    pub scalars: ScalarsConfig,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            validation: true,
            scalars: ScalarsConfig::default(),
        }
    }
}

impl ExtensionsConfig {
    /// Disables every extension.
    pub fn none() -> Self {
        Self {
            validation: false,
            scalars: ScalarsConfig {
                enabled: false,
                ..ScalarsConfig::default()
            },
        }
    }
}

/// Toggles for the extended scalar groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScalarsConfig {
    /// Master switch for every group below.
    pub enabled: bool,
    pub time_dates: bool,
    pub objects: bool,
    pub numbers: bool,
}

impl Default for ScalarsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time_dates: true,
            objects: true,
            numbers: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AssemblerConfig::default();
        assert_eq!(config.schema_locations, vec![DEFAULT_SCHEMA_LOCATION]);
        assert!(config.introspection);
        assert!(config.extensions.validation);
        assert!(config.extensions.scalars.numbers);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = AssemblerConfig::from_toml_str(
            r#"
            schema-locations = ["graphql/*.graphqls"]
            introspection = false

            [extensions.scalars]
            time-dates = false
            "#,
        )
        .unwrap();

        assert_eq!(config.schema_locations, vec!["graphql/*.graphqls"]);
        assert!(!config.introspection);
        assert!(!config.extensions.scalars.time_dates);
        assert!(config.extensions.scalars.objects);
        assert!(config.extensions.validation);
    }

    #[test]
    fn test_invalid_toml() {
        let err = AssemblerConfig::from_toml_str("schema-locations = 3").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidConfig(_)));
    }

    #[test]
    fn test_resolved_locations() {
        let config = AssemblerConfig::new()
            .schema_locations(["schema/*.graphql"])
            .base_dir("/srv/app");
        assert_eq!(
            config.resolved_locations(),
            vec!["/srv/app/schema/*.graphql".to_string()]
        );
    }
}
