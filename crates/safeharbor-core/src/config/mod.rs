//! Configuration types for the SafeHarbor query validator.
//!
//! Configuration is loaded from a main YAML file (`safeharbor.yaml`) which
//! may reference further files:
//!
//! - **schema file**: approved tables and columns (`schemas/omop_5.4.yaml`)
//! - **PHI file**: PHI column-name patterns (`schemas/phi_identifiers.yaml`)
//! - **prompt file**: prompt-injection patterns (`prompt_patterns.yaml`)
//!
//! Relative paths are resolved against the directory of the main file.

pub mod phi;
pub mod prompt;
pub mod schema;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use phi::{PhiCatalog, PhiCategory};
pub use prompt::PromptPatterns;
pub use schema::SchemaCatalog;

/// Minimum number of distinct patients a result row must represent.
pub const DEFAULT_MIN_PATIENT_COUNT: u64 = 20_000;

/// Complete validator configuration loaded from files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Minimum `Count_Patients` enforced by the query wrapper.
    #[serde(default = "default_min_patient_count")]
    pub min_patient_count: u64,

    /// Maximum nesting depth accepted while walking a statement.
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,

    /// Whether schema errors list the valid tables/columns.
    #[serde(default = "default_true")]
    pub verbose_errors: bool,

    /// Schema validation settings.
    #[serde(default)]
    pub schema: SchemaConfig,

    /// PHI pattern settings.
    #[serde(default)]
    pub phi: PhiConfig,

    /// Prompt-injection detection settings.
    #[serde(default)]
    pub prompt_injection: PromptInjectionConfig,

    /// Result-set validation settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// Audit trail settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_patient_count: default_min_patient_count(),
            max_nesting_depth: default_max_nesting_depth(),
            verbose_errors: true,
            schema: SchemaConfig::default(),
            phi: PhiConfig::default(),
            prompt_injection: PromptInjectionConfig::default(),
            output: OutputConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// Schema validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Whether the schema layer runs in the pipeline.
    #[serde(default)]
    pub enabled: bool,

    /// Path to the schema definition file.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Schema version the file must declare.
    #[serde(default = "default_schema_version")]
    pub expected_version: String,

    /// Human-readable schema label used in error messages.
    #[serde(default = "default_schema_label")]
    pub label: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file: None,
            expected_version: default_schema_version(),
            label: default_schema_label(),
        }
    }
}

/// PHI pattern configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PhiConfig {
    /// Path to the PHI identifiers file. Built-in patterns are used when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Prompt-injection detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptInjectionConfig {
    /// Whether the prompt-injection layer runs in the pipeline.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path to the pattern file. Built-in patterns are used when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for PromptInjectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
        }
    }
}

/// Result-set validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Maximum number of rows a result set may contain.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
        }
    }
}

/// Audit trail configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Whether audit events are recorded at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// JSON Lines file to append events to. Events go to the log when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_min_patient_count() -> u64 {
    DEFAULT_MIN_PATIENT_COUNT
}

fn default_max_nesting_depth() -> usize {
    100
}

fn default_schema_version() -> String {
    "5.4".to_string()
}

fn default_schema_label() -> String {
    "OMOP CDM v5.4".to_string()
}

fn default_max_rows() -> usize {
    10_000
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ValidatorConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    /// Load configuration and resolve referenced files against its directory.
    pub fn load_with_context(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::from_file(path)?;

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        config.schema.file = config.schema.file.map(|f| resolve(&base_dir, f));
        config.phi.file = config.phi.file.map(|f| resolve(&base_dir, f));
        config.prompt_injection.file = config.prompt_injection.file.map(|f| resolve(&base_dir, f));
        config.audit.file = config.audit.file.map(|f| resolve(&base_dir, f));

        Ok(config)
    }

    /// Load the schema catalog referenced by this configuration.
    ///
    /// Returns an empty catalog when no schema file is configured.
    pub fn load_schema(&self) -> Result<SchemaCatalog, ConfigError> {
        match &self.schema.file {
            Some(path) => SchemaCatalog::from_file(path, &self.schema.expected_version)
                .map(|catalog| catalog.with_label(self.schema.label.clone())),
            None => Ok(SchemaCatalog::empty(self.schema.label.clone())),
        }
    }

    /// Load the PHI catalog, falling back to the built-in patterns.
    pub fn load_phi(&self) -> Result<PhiCatalog, ConfigError> {
        match &self.phi.file {
            Some(path) if path.exists() => PhiCatalog::from_file(path),
            Some(path) => {
                tracing::warn!(path = %path.display(), "PHI pattern file not found, using built-in patterns");
                Ok(PhiCatalog::default())
            }
            None => Ok(PhiCatalog::default()),
        }
    }

    /// Load the prompt-injection patterns, falling back to the built-in set.
    pub fn load_prompt_patterns(&self) -> Result<PromptPatterns, ConfigError> {
        match &self.prompt_injection.file {
            Some(path) if path.exists() => PromptPatterns::from_file(path),
            Some(path) => {
                tracing::warn!(path = %path.display(), "prompt pattern file not found, using built-in patterns");
                Ok(PromptPatterns::default())
            }
            None => Ok(PromptPatterns::default()),
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.max_nesting_depth == 0 {
            return Err(ConfigError::Config(
                "max_nesting_depth must be greater than zero".to_string(),
            ));
        }
        if self.output.max_rows == 0 {
            return Err(ConfigError::Config(
                "output.max_rows must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve(base_dir: &Path, file: PathBuf) -> PathBuf {
    if file.is_absolute() {
        file
    } else {
        base_dir.join(file)
    }
}
