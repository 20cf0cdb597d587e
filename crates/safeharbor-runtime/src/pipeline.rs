//! The validation pipeline.
//!
//! Layers run in a fixed order and the first rejection ends the run:
//!
//! ```text
//! ASCII (0) -> schema (1, optional) -> PHI (2) -> aggregation (3)
//!     -> enforcement (4) -> prompt injection (7, optional) -> wrap
//! ```
//!
//! Result sets returned by the database are checked separately by
//! [`Pipeline::validate_output`] (layer 8).

use crate::guidance::GuidanceLookup;
use crate::outcome::{OutcomeError, OutcomeStatus, ValidationOutcome};
use safeharbor_audit::{hash_query, AuditLogger, SecuritySubtype};
use safeharbor_core::{ConfigError, PhiCatalog, PromptPatterns, SchemaCatalog, ValidatorConfig};
use safeharbor_policy::{
    validate_ascii_input, AggregationValidator, Enforcer, Layer, OutputValidator, PhiValidator,
    PromptInjectionDetector, SchemaValidator, ValidationError, ValidationResult,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// A fresh request id: `req-` followed by 12 hex digits.
pub fn generate_request_id() -> String {
    let hex: String = Uuid::new_v4().simple().to_string().chars().take(12).collect();
    format!("req-{hex}")
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Bookkeeping for one run: which layers passed, which failed, and how long
/// each took.
#[derive(Debug, Default)]
struct LayerRun {
    passed: Vec<u8>,
    failed: Vec<u8>,
    times_ms: BTreeMap<String, f64>,
}

impl LayerRun {
    fn layer(
        &mut self,
        layer: Layer,
        check: impl FnOnce() -> Result<ValidationResult, ValidationError>,
    ) -> Result<(), ValidationError> {
        let start = Instant::now();
        let result = check();
        self.times_ms
            .insert(layer.timing_key().to_string(), elapsed_ms(start));
        match result {
            Ok(_) => {
                self.passed.push(layer.index());
                Ok(())
            }
            Err(err) => {
                tracing::debug!(layer = %layer, code = err.code(), "Layer rejected query");
                self.failed.push(layer.index());
                Err(err)
            }
        }
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: ValidatorConfig,
    schema: Option<Arc<SchemaCatalog>>,
    phi: Option<Arc<PhiCatalog>>,
    prompt_patterns: Option<PromptPatterns>,
    audit: Option<AuditLogger>,
    guidance: Option<Arc<dyn GuidanceLookup>>,
}

impl PipelineBuilder {
    /// A builder with `config` applied and every catalog it references
    /// loaded.
    pub fn from_config(config: ValidatorConfig) -> Result<Self, ValidationError> {
        let mut builder = Self::default();

        if config.schema.enabled {
            let catalog = config
                .load_schema()
                .map_err(|e| config_error(config.schema.file.as_deref(), e))?;
            builder = builder.schema_catalog(Arc::new(catalog));
        }

        let phi = config
            .load_phi()
            .map_err(|e| config_error(config.phi.file.as_deref(), e))?;
        let patterns = config
            .load_prompt_patterns()
            .map_err(|e| config_error(config.prompt_injection.file.as_deref(), e))?;

        Ok(builder
            .phi_catalog(Arc::new(phi))
            .prompt_patterns(patterns)
            .config(config))
    }

    pub fn config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Catalog for the schema layer. The layer only runs when the
    /// configuration enables it.
    pub fn schema_catalog(mut self, catalog: Arc<SchemaCatalog>) -> Self {
        self.schema = Some(catalog);
        self
    }

    pub fn phi_catalog(mut self, catalog: Arc<PhiCatalog>) -> Self {
        self.phi = Some(catalog);
        self
    }

    pub fn prompt_patterns(mut self, patterns: PromptPatterns) -> Self {
        self.prompt_patterns = Some(patterns);
        self
    }

    pub fn audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn guidance(mut self, guidance: Arc<dyn GuidanceLookup>) -> Self {
        self.guidance = Some(guidance);
        self
    }

    /// Build the pipeline. Fails only when the prompt patterns do not compile.
    pub fn build(self) -> Result<Pipeline, ValidationError> {
        let config = self.config;
        let depth = config.max_nesting_depth;

        let schema = match self.schema {
            Some(catalog) if config.schema.enabled => Some(
                SchemaValidator::new(catalog)
                    .with_max_depth(depth)
                    .with_verbose_errors(config.verbose_errors),
            ),
            _ => None,
        };

        let phi = PhiValidator::new(self.phi.unwrap_or_default()).with_max_depth(depth);

        let prompt_injection = if config.prompt_injection.enabled {
            let patterns = self.prompt_patterns.unwrap_or_default();
            Some(PromptInjectionDetector::new(&patterns)?.with_max_depth(depth))
        } else {
            None
        };

        Ok(Pipeline {
            schema,
            phi,
            aggregation: AggregationValidator::new().with_max_depth(depth),
            enforcer: Enforcer::new(config.min_patient_count).with_max_depth(depth),
            prompt_injection,
            output: OutputValidator::new(config.min_patient_count, config.output.max_rows),
            audit: self.audit.unwrap_or_else(|| AuditLogger::new(&config.audit)),
            guidance: self.guidance,
            config,
        })
    }
}

/// Runs queries through every validation layer.
///
/// A pipeline holds only read-only state and can be shared between threads.
pub struct Pipeline {
    config: ValidatorConfig,
    schema: Option<SchemaValidator>,
    phi: PhiValidator,
    aggregation: AggregationValidator,
    enforcer: Enforcer,
    prompt_injection: Option<PromptInjectionDetector>,
    output: OutputValidator,
    audit: AuditLogger,
    guidance: Option<Arc<dyn GuidanceLookup>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Build a pipeline from configuration, loading every referenced file.
    pub fn from_config(config: ValidatorConfig) -> Result<Self, ValidationError> {
        PipelineBuilder::from_config(config)?.build()
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// The threshold applied by the wrapper.
    pub fn min_patient_count(&self) -> u64 {
        self.enforcer.min_patient_count()
    }

    /// Validate `query`. A request id is generated when none is given.
    pub fn validate(&self, query: &str, request_id: Option<&str>) -> ValidationOutcome {
        let request_id = request_id.map_or_else(generate_request_id, str::to_string);
        let query_hash = hash_query(query);
        let started = Instant::now();

        let mut run = LayerRun::default();
        let verdict = self.run_layers(query, &request_id, &mut run);
        let validation_time_ms = elapsed_ms(started);

        let (status, wrapped_query, error) = match verdict {
            Ok(wrapped) => (OutcomeStatus::Valid, Some(wrapped), None),
            Err(err) => {
                let status = if err.is_system() {
                    OutcomeStatus::Error
                } else {
                    OutcomeStatus::Invalid
                };
                self.audit_rejection(&request_id, &query_hash, &err, &run);
                (status, None, Some(self.outcome_error(&err)))
            }
        };

        if let Err(e) = self.audit.log_validation(
            &request_id,
            &query_hash,
            &run.passed,
            &run.failed,
            validation_time_ms,
            &run.times_ms,
        ) {
            tracing::warn!(error = %e, request_id = %request_id, "Failed to record audit event");
        }

        tracing::info!(
            request_id = %request_id,
            query_hash = %query_hash,
            status = ?status,
            code = error.as_ref().map(|e| e.code.as_str()),
            elapsed_ms = validation_time_ms,
            "Query validated"
        );

        ValidationOutcome {
            status,
            request_id,
            query_hash,
            validation_time_ms,
            layer_times_ms: run.times_ms,
            layers_passed: run.passed,
            layers_failed: run.failed,
            wrapped_query,
            error,
        }
    }

    /// Whether `query` passes every layer. Nothing is audited.
    pub fn is_valid(&self, query: &str) -> bool {
        self.run_layers(query, "req-silent", &mut LayerRun::default())
            .is_ok()
    }

    /// Check rows returned by executing a wrapped query (layer 8).
    pub fn validate_output(
        &self,
        rows: &[Map<String, Value>],
        request_id: &str,
    ) -> Result<ValidationResult, ValidationError> {
        self.output.validate(rows, request_id).inspect_err(|err| {
            // No query text here; key the event by request.
            let hash = hash_query(&format!("result-set:{request_id}"));
            if let Err(e) = self.audit.log_validation_error(
                request_id,
                &hash,
                err.code(),
                err.kind(),
                Layer::AsciiOutput.index(),
                &err.to_string(),
            ) {
                tracing::warn!(error = %e, "Failed to record audit event");
            }
        })
    }

    /// Wrap an already validated query with the threshold filter.
    pub fn wrap(&self, query: &str) -> String {
        self.enforcer.wrap(query)
    }

    fn run_layers(
        &self,
        query: &str,
        request_id: &str,
        run: &mut LayerRun,
    ) -> Result<String, ValidationError> {
        run.layer(Layer::AsciiInput, || validate_ascii_input(query, request_id))?;

        if let Some(schema) = &self.schema {
            run.layer(Layer::Schema, || schema.validate(query, request_id))?;
        }

        run.layer(Layer::Phi, || self.phi.validate(query, request_id))?;
        run.layer(Layer::Aggregation, || {
            self.aggregation.validate(query, request_id)
        })?;
        run.layer(Layer::Enforcement, || {
            self.enforcer.check_circumvention(query, request_id)
        })?;

        if let Some(detector) = &self.prompt_injection {
            run.layer(Layer::PromptInjection, || detector.validate(query, request_id))?;
        }

        Ok(self.enforcer.wrap(query))
    }

    fn outcome_error(&self, err: &ValidationError) -> OutcomeError {
        let mut outcome_error = OutcomeError::from(err);
        if let Some(guidance) = self.guidance.as_ref().and_then(|g| g.guidance(err.code())) {
            outcome_error.educational_guidance = Some(guidance.educational_guidance);
            outcome_error.correct_pattern = guidance.correct_pattern;
        }
        outcome_error
    }

    fn audit_rejection(
        &self,
        request_id: &str,
        query_hash: &str,
        err: &ValidationError,
        run: &LayerRun,
    ) {
        let layer = run.failed.last().copied().unwrap_or_else(|| err.layer().index());

        let mut recorded = self.audit.log_validation_error(
            request_id,
            query_hash,
            err.code(),
            err.kind(),
            layer,
            &err.to_string(),
        );

        if err.is_security_event() {
            let subtype = match err.layer() {
                Layer::Enforcement => SecuritySubtype::CircumventionAttempt,
                _ => SecuritySubtype::PromptInjection,
            };
            recorded = recorded.and_then(|()| {
                self.audit
                    .log_security_event(request_id, query_hash, subtype, layer, err.kind())
            });
        }

        if let Err(e) = recorded {
            tracing::warn!(error = %e, request_id = %request_id, "Failed to record audit event");
        }
    }
}

fn config_error(path: Option<&Path>, err: ConfigError) -> ValidationError {
    let file = path.map_or_else(|| "<config>".to_string(), |p| p.display().to_string());
    ValidationError::configuration(file, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_shape() {
        let id = generate_request_id();
        assert!(id.starts_with("req-"));
        assert_eq!(id.len(), 16);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_request_id());
    }

    #[test]
    fn test_layer_run_records_pass_and_fail() {
        let mut run = LayerRun::default();
        run.layer(Layer::AsciiInput, || {
            Ok(ValidationResult::passed("r", Layer::AsciiInput, "ok"))
        })
        .unwrap();
        run.layer(Layer::Phi, || Err(ValidationError::SelectStar))
            .unwrap_err();
        assert_eq!(run.passed, vec![0]);
        assert_eq!(run.failed, vec![2]);
        assert!(run.times_ms.contains_key("layer_0_ascii"));
        assert!(run.times_ms.contains_key("layer_2_phi"));
    }

    #[test]
    fn test_pipeline_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pipeline>();
    }
}
