//! `safeharbor check-output` command implementation.

use anyhow::{Context, Result};
use safeharbor_runtime::Pipeline;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

use super::{load_config, read_input};

/// Parse a JSON array of row objects.
pub fn parse_rows(text: &str) -> Result<Vec<Map<String, Value>>> {
    serde_json::from_str(text).context("Result set must be a JSON array of objects")
}

pub fn run(config: Option<PathBuf>, file: Option<PathBuf>, request_id: &str) -> Result<bool> {
    let config = load_config(config.as_deref())?;
    let pipeline = Pipeline::from_config(config).context("Failed to build validation pipeline")?;

    let rows = parse_rows(&read_input(None, file.as_ref())?)?;

    let report = match pipeline.validate_output(&rows, request_id) {
        Ok(result) => serde_json::to_value(&result)?,
        Err(err) => json!({
            "success": false,
            "request_id": request_id,
            "code": err.code(),
            "message": err.to_string(),
            "details": err.details(),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(report["success"].as_bool().unwrap_or(false))
}
