//! `safeharbor validate` command implementation.

use anyhow::{Context, Result};
use safeharbor_runtime::{BuiltinGuidance, PipelineBuilder, ValidationOutcome};
use std::path::PathBuf;
use std::sync::Arc;

use super::{load_config, read_input};

#[derive(Debug, Default)]
pub struct ValidateArgs {
    pub config: Option<PathBuf>,
    pub query: Option<String>,
    pub file: Option<PathBuf>,
    pub request_id: Option<String>,
    pub threshold: Option<u64>,
    pub guidance: bool,
}

/// Run the pipeline over one query.
pub fn evaluate(args: &ValidateArgs, query: &str) -> Result<ValidationOutcome> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(threshold) = args.threshold {
        config.min_patient_count = threshold;
    }

    let mut builder =
        PipelineBuilder::from_config(config).context("Failed to load validator catalogs")?;
    if args.guidance {
        builder = builder.guidance(Arc::new(BuiltinGuidance));
    }
    let pipeline = builder
        .build()
        .context("Failed to build validation pipeline")?;

    Ok(pipeline.validate(query, args.request_id.as_deref()))
}

pub fn run(args: ValidateArgs) -> Result<bool> {
    let query = read_input(args.query.clone(), args.file.as_ref())?;
    let outcome = evaluate(&args, &query)?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome.is_valid())
}
