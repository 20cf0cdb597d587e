//! CLI command implementations.
//!
//! Each command returns `Ok(true)` when its input was accepted and
//! `Ok(false)` when it was rejected; errors are reserved for problems with
//! the invocation itself (unreadable files, bad configuration).

pub mod check;
pub mod output;
pub mod unwrap;
pub mod validate;

use anyhow::{Context, Result};
use safeharbor_core::ValidatorConfig;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Load configuration from `path`, or the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<ValidatorConfig> {
    tracing::debug!(config = ?path, "Loading configuration");
    match path {
        Some(path) => ValidatorConfig::load_with_context(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(ValidatorConfig::default()),
    }
}

/// Text given inline, read from a file, or read from standard input.
pub fn read_input(inline: Option<String>, file: Option<&PathBuf>) -> Result<String> {
    if let Some(text) = inline {
        return Ok(text);
    }
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read standard input")?;
            Ok(text)
        }
    }
}
