//! Approved database schema catalog.
//!
//! The catalog maps lowercase table names to the set of their lowercase
//! column names. Lookups are case-insensitive.
//!
//! ```yaml
//! schema_version: "5.4"
//! tables:
//!   person:
//!     columns: [person_id, gender_concept_id, year_of_birth]
//! ```

use super::ConfigError;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Raw schema file as written on disk.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    schema_version: Option<String>,
    #[serde(default)]
    tables: BTreeMap<String, TableDefinition>,
}

#[derive(Debug, Default, Deserialize)]
struct TableDefinition {
    #[serde(default)]
    columns: Vec<String>,
}

/// Read-only `table -> {columns}` lookup for the approved schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: BTreeMap<String, BTreeSet<String>>,
    version: String,
    label: String,
}

impl SchemaCatalog {
    /// An empty catalog. Validating against it fails with `SchemaNotLoaded`.
    pub fn empty(label: impl Into<String>) -> Self {
        Self {
            tables: BTreeMap::new(),
            version: String::new(),
            label: label.into(),
        }
    }

    /// Build a catalog directly from table definitions.
    pub fn from_tables<T, C, S>(version: impl Into<String>, tables: T) -> Self
    where
        T: IntoIterator<Item = (S, C)>,
        C: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let version = version.into();
        let tables = tables
            .into_iter()
            .map(|(table, columns)| {
                let columns = columns
                    .into_iter()
                    .map(|c| c.as_ref().to_lowercase())
                    .collect();
                (table.as_ref().to_lowercase(), columns)
            })
            .collect();
        Self {
            tables,
            label: format!("OMOP CDM v{version}"),
            version,
        }
    }

    /// Load a catalog from a YAML file, checking its declared version.
    pub fn from_file(path: impl AsRef<Path>, expected_version: &str) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::Config(format!(
                "Schema configuration not found: {} ({e})",
                path.display()
            ))
        })?;
        Self::from_yaml(&content, expected_version)
    }

    /// Parse a catalog from YAML content, checking its declared version.
    pub fn from_yaml(content: &str, expected_version: &str) -> Result<Self, ConfigError> {
        let file: SchemaFile = serde_yaml::from_str(content)?;
        let actual = file.schema_version.unwrap_or_else(|| "unknown".to_string());
        if actual != expected_version {
            return Err(ConfigError::Config(format!(
                "Schema version mismatch: expected {expected_version}, got {actual}"
            )));
        }

        let catalog = Self::from_tables(
            actual,
            file.tables
                .into_iter()
                .map(|(name, def)| (name, def.columns)),
        );
        tracing::debug!(
            tables = catalog.tables.len(),
            version = %catalog.version,
            "Loaded schema catalog"
        );
        Ok(catalog)
    }

    /// Replace the label used in error messages.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn is_valid_table(&self, table: &str) -> bool {
        self.tables.contains_key(&table.to_lowercase())
    }

    pub fn is_valid_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(&table.to_lowercase())
            .is_some_and(|columns| columns.contains(&column.to_lowercase()))
    }

    /// All table names, sorted.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Columns of `table`, sorted. Empty when the table is unknown.
    pub fn columns(&self, table: &str) -> Vec<&str> {
        self.tables
            .get(&table.to_lowercase())
            .map(|columns| columns.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCHEMA: &str = r#"
schema_version: "5.4"
tables:
  Person:
    columns: [person_id, Gender_Concept_Id, year_of_birth]
  visit_occurrence:
    columns: [visit_occurrence_id, person_id]
"#;

    #[test]
    fn test_lookups_are_case_insensitive() {
        let catalog = SchemaCatalog::from_yaml(SCHEMA, "5.4").unwrap();
        assert!(catalog.is_valid_table("person"));
        assert!(catalog.is_valid_table("VISIT_OCCURRENCE"));
        assert!(!catalog.is_valid_table("patients"));
        assert!(catalog.is_valid_column("PERSON", "gender_concept_id"));
        assert!(!catalog.is_valid_column("person", "visit_occurrence_id"));
        assert!(!catalog.is_valid_column("unknown", "person_id"));
    }

    #[test]
    fn test_sorted_listing() {
        let catalog = SchemaCatalog::from_yaml(SCHEMA, "5.4").unwrap();
        let tables: Vec<_> = catalog.tables().collect();
        assert_eq!(tables, vec!["person", "visit_occurrence"]);
        assert_eq!(
            catalog.columns("person"),
            vec!["gender_concept_id", "person_id", "year_of_birth"]
        );
        assert!(catalog.columns("nope").is_empty());
        assert_eq!(catalog.version(), "5.4");
        assert_eq!(catalog.label(), "OMOP CDM v5.4");
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let err = SchemaCatalog::from_yaml(SCHEMA, "5.3").unwrap_err();
        assert!(err.to_string().contains("expected 5.3, got 5.4"));
    }

    #[test]
    fn test_missing_version_is_rejected() {
        let err = SchemaCatalog::from_yaml("tables: {}", "5.4").unwrap_err();
        assert!(err.to_string().contains("got unknown"));
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = SchemaCatalog::empty("OMOP CDM v5.4");
        assert!(catalog.is_empty());
        assert_eq!(catalog.len(), 0);
    }
}
