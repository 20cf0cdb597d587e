//! SafeHarbor Validation Layers
//!
//! Each layer is an independent validator that either passes a query with a
//! [`ValidationResult`] or rejects it with a [`ValidationError`]:
//!
//! | layer | validator | rejects |
//! |-------|-----------|---------|
//! | 0 | [`validate_ascii_input`] | non-ASCII and control characters |
//! | 1 | [`SchemaValidator`] | unknown tables and columns |
//! | 2 | [`PhiValidator`] | `SELECT *` and PHI columns |
//! | 3 | [`AggregationValidator`] | missing patient count, ungrouped queries |
//! | 4 | [`Enforcer`] | subqueries and CTEs; wraps the query with the threshold |
//! | 7 | [`PromptInjectionDetector`] | instructions hidden in comments and strings |
//! | 8 | [`OutputValidator`] | unsafe or under-threshold result rows |
//!
//! Validators hold only read-only configuration and are safe to share
//! between threads. Ordering and fail-fast behavior live in the runtime
//! crate.

pub mod aggregation;
pub mod ascii;
pub mod enforcement;
pub mod error;
pub mod output;
pub mod phi;
pub mod prompt_injection;
pub mod result;
pub mod schema;
pub mod text;

pub use aggregation::{AggregationValidator, PATIENT_COUNT_ALIAS};
pub use ascii::{is_allowed_char, validate_ascii_input};
pub use enforcement::{unwrap, Enforcer};
pub use error::{Layer, ValidationError};
pub use output::{OutputValidator, OutputWarning};
pub use phi::PhiValidator;
pub use prompt_injection::{PromptInjectionDetector, TextOrigin};
pub use result::ValidationResult;
pub use schema::SchemaValidator;
