//! # safeharbor-runtime
//!
//! The validation pipeline. A [`Pipeline`] runs a query through every layer
//! in order, stops at the first rejection, and returns a
//! [`ValidationOutcome`] carrying either the wrapped query or the error.
//!
//! ```no_run
//! use safeharbor_runtime::Pipeline;
//!
//! let pipeline = Pipeline::builder().build().unwrap();
//! let outcome = pipeline.validate(
//!     "SELECT gender_concept_id, COUNT(DISTINCT person_id) AS Count_Patients \
//!      FROM person GROUP BY gender_concept_id",
//!     None,
//! );
//! assert!(outcome.is_valid());
//! ```

pub mod guidance;
pub mod outcome;
pub mod pipeline;

pub use guidance::{BuiltinGuidance, Guidance, GuidanceLookup};
pub use outcome::{OutcomeError, OutcomeStatus, ValidationOutcome};
pub use pipeline::{generate_request_id, Pipeline, PipelineBuilder};

/// Recover the inner query from a wrapped one.
pub use safeharbor_policy::unwrap;
