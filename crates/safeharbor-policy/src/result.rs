//! Per-layer validation result.

use crate::error::{Layer, ValidationError};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of running one validation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    pub request_id: String,
    pub layer: Option<Layer>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub educational_guidance: Option<String>,
    pub correct_pattern: Option<String>,
    /// ISO 8601 UTC timestamp.
    pub timestamp: String,
    pub details: Option<Value>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ValidationResult {
    /// A passing result for `layer`.
    pub fn passed(request_id: &str, layer: Layer, message: impl Into<String>) -> Self {
        Self {
            success: true,
            request_id: request_id.to_string(),
            layer: Some(layer),
            code: None,
            message: Some(message.into()),
            educational_guidance: None,
            correct_pattern: None,
            timestamp: now(),
            details: None,
        }
    }

    /// A failing result built from an error.
    pub fn failed(request_id: &str, error: &ValidationError) -> Self {
        Self {
            success: false,
            request_id: request_id.to_string(),
            layer: Some(error.layer()),
            code: Some(error.code().to_string()),
            message: Some(error.to_string()),
            educational_guidance: None,
            correct_pattern: None,
            timestamp: now(),
            details: Some(error.details()),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
