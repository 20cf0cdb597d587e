//! Result of running a query through the pipeline.

use safeharbor_policy::{Layer, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Every layer passed; the wrapped query may be executed.
    Valid,
    /// The query was rejected.
    Invalid,
    /// The validator itself failed (configuration or parsing).
    Error,
}

/// The rejection carried by a failed outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub code: String,
    pub message: String,
    pub layer: Layer,
    pub layer_index: u8,
    pub details: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub educational_guidance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_pattern: Option<String>,
}

impl From<&ValidationError> for OutcomeError {
    fn from(err: &ValidationError) -> Self {
        let layer = err.layer();
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            layer,
            layer_index: layer.index(),
            details: err.details(),
            educational_guidance: None,
            correct_pattern: None,
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub status: OutcomeStatus,
    pub request_id: String,
    /// SHA-256 of the submitted query, hex encoded.
    pub query_hash: String,
    pub validation_time_ms: f64,
    /// Elapsed time per executed layer, keyed `layer_<n>_<name>`.
    pub layer_times_ms: BTreeMap<String, f64>,
    pub layers_passed: Vec<u8>,
    pub layers_failed: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrapped_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.status == OutcomeStatus::Valid
    }

    /// Error code of a failed outcome.
    pub fn code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}
