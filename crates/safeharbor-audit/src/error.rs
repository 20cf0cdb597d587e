//! Error types for the audit crate.

use thiserror::Error;

/// Errors that can occur while recording audit events.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A sink could not record the event.
    #[error("failed to record audit event: {0}")]
    RecordFailed(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
