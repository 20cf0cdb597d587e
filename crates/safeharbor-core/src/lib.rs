//! # safeharbor-core
//!
//! Configuration shared across all SafeHarbor crates.
//!
//! This crate owns the read-only catalogs the validators consult:
//!
//! - [`SchemaCatalog`]: `table -> {columns}` for the approved OMOP CDM schema
//! - [`PhiCatalog`]: the three PHI column-name pattern sets
//! - [`PromptPatterns`]: prompt-injection keyword and encoding patterns
//!
//! All of them are loaded once at startup (from YAML, or built-in defaults)
//! and then shared behind an `Arc` for the lifetime of the process.

// Configuration types shared across all SafeHarbor crates
pub mod config;

pub use config::{
    AuditConfig, ConfigError, OutputConfig, PhiCatalog, PhiCategory, PhiConfig, PromptInjectionConfig,
    PromptPatterns, SchemaCatalog, SchemaConfig, ValidatorConfig, DEFAULT_MIN_PATIENT_COUNT,
};
