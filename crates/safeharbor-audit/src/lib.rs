//! # safeharbor-audit
//!
//! Audit trail for the SafeHarbor query validator.
//!
//! Every validation produces structured events identified by the SHA-256 of
//! the query; the query text itself never reaches a sink.
//!
//! ## Event Types
//!
//! | Event Type | Description |
//! |------------|-------------|
//! | `QUERY_VALIDATION` | Layers passed and failed, timings |
//! | `VALIDATION_ERROR` | Code, error type and layer of a rejection |
//! | `SECURITY_EVENT` | Circumvention (E401/E402) or prompt injection (E7xx) |
//!
//! ## Sinks
//!
//! - [`TracingAuditSink`]: `tracing` events on the `audit` target
//! - [`FileAuditSink`]: JSON Lines file
//! - [`MemoryAuditSink`]: in-memory buffer
//! - [`NullAuditSink`]: discards everything

pub mod error;
pub mod event;
pub mod logger;
pub mod sink;

pub use error::AuditError;
pub use event::{hash_query, AuditEvent, AuditEventType, SecuritySubtype, Severity};
pub use logger::AuditLogger;
pub use sink::{AuditSink, FileAuditSink, MemoryAuditSink, NullAuditSink, TracingAuditSink};
