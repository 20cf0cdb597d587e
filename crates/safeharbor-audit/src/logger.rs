//! Audit logger.
//!
//! Wraps an [`AuditSink`] with helpers for the three event types.

use crate::error::AuditError;
use crate::event::{AuditEvent, SecuritySubtype};
use crate::sink::{AuditSink, FileAuditSink, NullAuditSink, TracingAuditSink};
use safeharbor_core::AuditConfig;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The main audit logger.
#[derive(Clone)]
pub struct AuditLogger {
    enabled: bool,
    sink: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::with_sink(Arc::new(TracingAuditSink))
    }
}

impl AuditLogger {
    /// Build a logger from configuration: a JSON Lines file when one is
    /// configured, the `audit` tracing target otherwise.
    pub fn new(config: &AuditConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        match &config.file {
            Some(path) => Self::with_sink(Arc::new(FileAuditSink::new(path))),
            None => Self::default(),
        }
    }

    /// Create a logger with a custom sink.
    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            enabled: true,
            sink,
        }
    }

    /// Create a disabled (no-op) logger.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            sink: Arc::new(NullAuditSink),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record an event.
    pub fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        if !self.enabled {
            return Ok(());
        }

        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            query_hash = %event.query_hash,
            "Audit event"
        );

        self.sink.record(&event)
    }

    /// Record the outcome of a pipeline run.
    pub fn log_validation(
        &self,
        request_id: &str,
        query_hash: &str,
        layers_passed: &[u8],
        layers_failed: &[u8],
        total_time_ms: f64,
        layer_times_ms: &BTreeMap<String, f64>,
    ) -> Result<(), AuditError> {
        let event = AuditEvent::query_validation(
            query_hash,
            layers_passed,
            layers_failed,
            total_time_ms,
            layer_times_ms,
        )
        .with_request_id(request_id);
        self.log(event)
    }

    /// Record a rejection.
    pub fn log_validation_error(
        &self,
        request_id: &str,
        query_hash: &str,
        error_code: &str,
        error_type: &str,
        layer: u8,
        message: &str,
    ) -> Result<(), AuditError> {
        let event = AuditEvent::validation_error(query_hash, error_code, error_type, layer, message)
            .with_request_id(request_id);
        self.log(event)
    }

    /// Record a blocked circumvention or injection attempt.
    pub fn log_security_event(
        &self,
        request_id: &str,
        query_hash: &str,
        subtype: SecuritySubtype,
        detection_layer: u8,
        pattern: &str,
    ) -> Result<(), AuditError> {
        let event =
            AuditEvent::security_event(query_hash, subtype, detection_layer, pattern, true)
                .with_request_id(request_id);
        self.log(event)
    }
}
