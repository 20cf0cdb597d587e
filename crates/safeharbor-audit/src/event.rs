//! Audit event types.
//!
//! Events describe what the validator decided about a query without ever
//! containing the query: the text is identified by its SHA-256 hash only, so
//! the audit trail cannot leak PHI that a rejected query may have carried.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Version of the event layout.
pub const EVENT_VERSION: &str = "1.0";

/// Maximum characters of a message or pattern kept in an event.
const MAX_TEXT_LEN: usize = 200;

/// Type of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    /// A query ran through the pipeline.
    QueryValidation,
    /// A query was rejected by one layer.
    ValidationError,
    /// A rejection that indicates an attempt to get around the controls.
    SecurityEvent,
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueryValidation => write!(f, "QUERY_VALIDATION"),
            Self::ValidationError => write!(f, "VALIDATION_ERROR"),
            Self::SecurityEvent => write!(f, "SECURITY_EVENT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Kind of security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecuritySubtype {
    /// Subquery or CTE that could dodge the threshold wrapper.
    CircumventionAttempt,
    /// Instructions hidden in comments or string literals.
    PromptInjection,
}

impl fmt::Display for SecuritySubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircumventionAttempt => write!(f, "CIRCUMVENTION_ATTEMPT"),
            Self::PromptInjection => write!(f, "PROMPT_INJECTION"),
        }
    }
}

/// An audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event layout version.
    pub version: String,

    /// When the event occurred.
    pub timestamp: DateTime<Utc>,

    /// Unique event ID.
    pub event_id: Uuid,

    pub event_type: AuditEventType,

    pub severity: Severity,

    /// SHA-256 of the query text, hex encoded.
    pub query_hash: String,

    /// Request the event belongs to, for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Event-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl AuditEvent {
    /// Create an event with an empty payload.
    pub fn new(event_type: AuditEventType, severity: Severity, query_hash: impl Into<String>) -> Self {
        Self {
            version: EVENT_VERSION.to_string(),
            timestamp: Utc::now(),
            event_id: Uuid::new_v4(),
            event_type,
            severity,
            query_hash: query_hash.into(),
            request_id: None,
            data: Value::Object(Default::default()),
        }
    }

    /// Outcome of a full pipeline run.
    ///
    /// `layers_passed` and `layers_failed` hold layer indices; times are in
    /// milliseconds and rounded to two decimals.
    pub fn query_validation(
        query_hash: impl Into<String>,
        layers_passed: &[u8],
        layers_failed: &[u8],
        total_time_ms: f64,
        layer_times_ms: &BTreeMap<String, f64>,
    ) -> Self {
        let rounded: BTreeMap<&str, f64> = layer_times_ms
            .iter()
            .map(|(k, v)| (k.as_str(), round2(*v)))
            .collect();
        let mut event = Self::new(AuditEventType::QueryValidation, Severity::Info, query_hash);
        event.data = json!({
            "validation_result": if layers_failed.is_empty() { "PASS" } else { "FAIL" },
            "layers_passed": layers_passed,
            "layers_failed": layers_failed,
            "total_time_ms": round2(total_time_ms),
            "layer_times_ms": rounded,
        });
        event
    }

    /// Rejection by one layer.
    pub fn validation_error(
        query_hash: impl Into<String>,
        error_code: &str,
        error_type: &str,
        layer: u8,
        message: &str,
    ) -> Self {
        let mut event = Self::new(AuditEventType::ValidationError, Severity::Warning, query_hash);
        event.data = json!({
            "error_code": error_code,
            "error_type": error_type,
            "layer": layer,
            "message": truncate(message),
        });
        event
    }

    /// A detected circumvention or injection attempt.
    pub fn security_event(
        query_hash: impl Into<String>,
        subtype: SecuritySubtype,
        detection_layer: u8,
        pattern: &str,
        blocked: bool,
    ) -> Self {
        let severity = if blocked {
            Severity::Error
        } else {
            Severity::Warning
        };
        let mut event = Self::new(AuditEventType::SecurityEvent, severity, query_hash);
        event.data = json!({
            "event_subtype": subtype,
            "detection_layer": detection_layer,
            "malicious_pattern": truncate(pattern),
            "blocked": blocked,
        });
        event
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Format the event as a human-readable log line.
    ///
    /// Format: `[timestamp] EVENT_TYPE severity=... hash=... [request=...] data=...`
    pub fn to_log_line(&self) -> String {
        let mut line = format!(
            "[{}] {} severity={} hash={}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.event_type,
            self.severity,
            self.query_hash,
        );
        if let Some(ref request_id) = self.request_id {
            line.push_str(&format!(" request={request_id}"));
        }
        line.push_str(&format!(" data={}", self.data));
        line
    }
}

/// SHA-256 of `query`, hex encoded. The only form in which query text may
/// enter the audit trail.
pub fn hash_query(query: &str) -> String {
    hex::encode(Sha256::digest(query.as_bytes()))
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_TEXT_LEN).collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
