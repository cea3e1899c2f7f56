//! Schema coordinates identifying a field on a type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `(parent type, field name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldCoordinates {
    pub parent_type: String,
    pub field: String,
}

impl FieldCoordinates {
    /// Creates new coordinates.
    pub fn new(parent_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            parent_type: parent_type.into(),
            field: field.into(),
        }
    }

    /// Parses `Type.field` notation.
    pub fn parse(value: &str) -> Option<Self> {
        let (parent_type, field) = value.split_once('.')?;
        if parent_type.is_empty() || field.is_empty() {
            return None;
        }
        Some(Self::new(parent_type, field))
    }

    /// Returns the `Type.field` key used for lookup tables.
    pub fn key(&self) -> String {
        format!("{}.{}", self.parent_type, self.field)
    }
}

impl fmt::Display for FieldCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.parent_type, self.field)
    }
}
