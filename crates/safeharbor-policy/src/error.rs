//! Validation error taxonomy.
//!
//! Every rejection carries a stable code (`E` plus three digits), the layer
//! that owns the code, a human-readable message and structured details.
//! Codes are grouped by layer:
//!
//! | range | layer |
//! |-------|-------|
//! | E001-E003 | ASCII input |
//! | E101-E103 | schema |
//! | E201-E204 | PHI |
//! | E301-E305 | aggregation |
//! | E401-E402 | enforcement |
//! | E701-E704 | prompt injection |
//! | E801-E802 | system (configuration, parsing) |
//! | E803-E805 | ASCII output |

use safeharbor_core::ConfigError;
use safeharbor_sql::SqlError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Maximum characters of offending text quoted in a prompt-injection message.
const PREVIEW_LEN: usize = 100;

/// A validation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    AsciiInput,
    Schema,
    Phi,
    Aggregation,
    Enforcement,
    PromptInjection,
    AsciiOutput,
    System,
}

impl Layer {
    /// Numeric position of the layer in the pipeline.
    pub fn index(&self) -> u8 {
        match self {
            Layer::AsciiInput => 0,
            Layer::Schema => 1,
            Layer::Phi => 2,
            Layer::Aggregation => 3,
            Layer::Enforcement => 4,
            Layer::PromptInjection => 7,
            Layer::AsciiOutput | Layer::System => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::AsciiInput => "ascii_input",
            Layer::Schema => "schema",
            Layer::Phi => "phi",
            Layer::Aggregation => "aggregation",
            Layer::Enforcement => "enforcement",
            Layer::PromptInjection => "prompt_injection",
            Layer::AsciiOutput => "ascii_output",
            Layer::System => "system",
        }
    }

    /// Key under which the layer's elapsed time is reported.
    pub fn timing_key(&self) -> &'static str {
        match self {
            Layer::AsciiInput => "layer_0_ascii",
            Layer::Schema => "layer_1_schema",
            Layer::Phi => "layer_2_phi",
            Layer::Aggregation => "layer_3_aggregation",
            Layer::Enforcement => "layer_4_enforcement",
            Layer::PromptInjection => "layer_7_prompt_injection",
            Layer::AsciiOutput => "layer_8_ascii_output",
            Layer::System => "system",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_LEN {
        let cut: String = text.chars().take(PREVIEW_LEN).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// A rejected query or result set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    // =========================================================================
    // LAYER 0: ASCII INPUT
    // =========================================================================
    #[error("Non-ASCII character detected at position {position}: '{character}' (U+{code_point:04X})")]
    NonAsciiCharacter {
        position: usize,
        character: char,
        code_point: u32,
    },

    #[error(
        "Invalid control character at position {position}: U+{code_point:04X}. Only newline (\\n), carriage return (\\r), and tab (\\t) are allowed."
    )]
    InvalidControlCharacter { position: usize, code_point: u32 },

    #[error("Query is empty or contains only whitespace")]
    EmptyQuery,

    // =========================================================================
    // LAYER 1: SCHEMA
    // =========================================================================
    #[error("Table '{table_name}' not found in {schema} schema")]
    UnknownTable {
        table_name: String,
        schema: String,
        candidates: Vec<String>,
    },

    #[error("Column '{column_name}' not found in table '{table_name}' ({schema})")]
    UnknownColumn {
        column_name: String,
        table_name: String,
        schema: String,
        candidates: Vec<String>,
    },

    #[error("Schema is not loaded; cannot validate table and column references")]
    SchemaNotLoaded,

    // =========================================================================
    // LAYER 2: PHI
    // =========================================================================
    #[error("Direct PHI identifier '{column_name}' ({identifier_type}) detected in {clause} clause")]
    DirectPhiIdentifier {
        column_name: String,
        identifier_type: String,
        clause: String,
    },

    #[error(
        "Prohibited geographic identifier '{column_name}' detected in {clause} clause. Only state-level or larger geographic divisions are allowed."
    )]
    GeographicPhi { column_name: String, clause: String },

    #[error(
        "Prohibited date element '{column_name}' detected in {clause} clause. Only year is allowed; month and day must be excluded."
    )]
    DatePhi { column_name: String, clause: String },

    #[error("SELECT * is prohibited. You must explicitly list allowed columns.")]
    SelectStar,

    // =========================================================================
    // LAYER 3: AGGREGATION
    // =========================================================================
    #[error(
        "GROUP BY clause is required for all queries except global aggregates. You must group by at least one non-PHI dimension."
    )]
    MissingGroupBy,

    #[error(
        "Required patient count column missing. You must include: COUNT(DISTINCT person_id) AS Count_Patients"
    )]
    MissingPatientCount,

    #[error(
        "Invalid patient count syntax: '{found_syntax}'. Required syntax: COUNT(DISTINCT person_id) AS Count_Patients"
    )]
    InvalidPatientCountSyntax { found_syntax: String },

    #[error(
        "Aggregate function '{function}' found in {clause} clause. Aggregate functions are only allowed in SELECT clause."
    )]
    AggregateInNonSelect { clause: String, function: String },

    #[error("Invalid column '{column_name}' in GROUP BY clause: {reason}")]
    InvalidGroupByColumn { column_name: String, reason: String },

    // =========================================================================
    // LAYER 4: ENFORCEMENT
    // =========================================================================
    #[error(
        "Subqueries are not allowed. This prevents circumvention of the minimum patient count threshold."
    )]
    SubqueryNotAllowed,

    #[error(
        "Common Table Expressions (WITH clauses) are not allowed. This prevents circumvention of security controls."
    )]
    CteNotAllowed,

    // =========================================================================
    // LAYER 7: PROMPT INJECTION
    // =========================================================================
    #[error(
        "Instruction-like text detected in SQL comment.\n\nDetected pattern: '{pattern}'\nIn comment: {}\n\nSQL comments should only explain query logic, not contain instructions or commands.\n\nPlease remove any instruction-like text from comments.",
        preview(.comment)
    )]
    InstructionInComment { comment: String, pattern: String },

    #[error(
        "Instruction-like text detected in string literal.\n\nDetected pattern: '{pattern}'\nIn string: {}\n\nString literals should contain data values only, not instructions.\n\nPlease remove any instruction-like text from string values.",
        preview(.string)
    )]
    InstructionInString { string: String, pattern: String },

    #[error(
        "Privilege escalation attempt detected.\n\nDetected keyword: '{keyword}'\nIn text: {}\n\nReferences to privileged roles (admin, root, superuser) are not allowed in SQL queries as they may indicate an attempt to bypass security.",
        preview(.text)
    )]
    PrivilegeEscalation { text: String, keyword: String },

    #[error(
        "Encoding or obfuscation detected.\n\nDetected pattern: {pattern}\nIn text: {}\n\nUse of encoding (hex or unicode escapes) in SQL queries is not allowed as it may be used to obfuscate malicious content.\n\nPlease use plain ASCII text only.",
        preview(.text)
    )]
    ObfuscationDetected { text: String, pattern: String },

    // =========================================================================
    // SYSTEM
    // =========================================================================
    #[error("Configuration error in '{config_file}': {reason}")]
    Configuration { config_file: String, reason: String },

    #[error("SQL parsing error: {reason}")]
    Parsing { reason: String },

    // =========================================================================
    // LAYER 8: ASCII OUTPUT
    // =========================================================================
    #[error(
        "Non-ASCII character in result column '{column}' at row {row}: U+{char_code:04X}. Results must contain printable ASCII only."
    )]
    NonAsciiOutput {
        column: String,
        row: usize,
        char_code: u32,
    },

    #[error("Result set has {row_count} rows, exceeding the maximum of {max_rows}")]
    TooManyRows { row_count: usize, max_rows: usize },

    #[error(
        "Result row {row} has Count_Patients = {count}, below the minimum of {threshold}"
    )]
    PatientCountBelowThreshold {
        row: usize,
        count: u64,
        threshold: u64,
    },
}

impl ValidationError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NonAsciiCharacter { .. } => "E001",
            Self::InvalidControlCharacter { .. } => "E002",
            Self::EmptyQuery => "E003",
            Self::UnknownTable { .. } => "E101",
            Self::UnknownColumn { .. } => "E102",
            Self::SchemaNotLoaded => "E103",
            Self::DirectPhiIdentifier { .. } => "E201",
            Self::GeographicPhi { .. } => "E202",
            Self::DatePhi { .. } => "E203",
            Self::SelectStar => "E204",
            Self::MissingGroupBy => "E301",
            Self::MissingPatientCount => "E302",
            Self::InvalidPatientCountSyntax { .. } => "E303",
            Self::AggregateInNonSelect { .. } => "E304",
            Self::InvalidGroupByColumn { .. } => "E305",
            Self::SubqueryNotAllowed => "E401",
            Self::CteNotAllowed => "E402",
            Self::InstructionInComment { .. } => "E701",
            Self::InstructionInString { .. } => "E702",
            Self::PrivilegeEscalation { .. } => "E703",
            Self::ObfuscationDetected { .. } => "E704",
            Self::Configuration { .. } => "E801",
            Self::Parsing { .. } => "E802",
            Self::NonAsciiOutput { .. } => "E803",
            Self::TooManyRows { .. } => "E804",
            Self::PatientCountBelowThreshold { .. } => "E805",
        }
    }

    /// Variant name, used as the error type in audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NonAsciiCharacter { .. } => "NonAsciiCharacter",
            Self::InvalidControlCharacter { .. } => "InvalidControlCharacter",
            Self::EmptyQuery => "EmptyQuery",
            Self::UnknownTable { .. } => "UnknownTable",
            Self::UnknownColumn { .. } => "UnknownColumn",
            Self::SchemaNotLoaded => "SchemaNotLoaded",
            Self::DirectPhiIdentifier { .. } => "DirectPhiIdentifier",
            Self::GeographicPhi { .. } => "GeographicPhi",
            Self::DatePhi { .. } => "DatePhi",
            Self::SelectStar => "SelectStar",
            Self::MissingGroupBy => "MissingGroupBy",
            Self::MissingPatientCount => "MissingPatientCount",
            Self::InvalidPatientCountSyntax { .. } => "InvalidPatientCountSyntax",
            Self::AggregateInNonSelect { .. } => "AggregateInNonSelect",
            Self::InvalidGroupByColumn { .. } => "InvalidGroupByColumn",
            Self::SubqueryNotAllowed => "SubqueryNotAllowed",
            Self::CteNotAllowed => "CteNotAllowed",
            Self::InstructionInComment { .. } => "InstructionInComment",
            Self::InstructionInString { .. } => "InstructionInString",
            Self::PrivilegeEscalation { .. } => "PrivilegeEscalation",
            Self::ObfuscationDetected { .. } => "ObfuscationDetected",
            Self::Configuration { .. } => "Configuration",
            Self::Parsing { .. } => "Parsing",
            Self::NonAsciiOutput { .. } => "NonAsciiOutput",
            Self::TooManyRows { .. } => "TooManyRows",
            Self::PatientCountBelowThreshold { .. } => "PatientCountBelowThreshold",
        }
    }

    /// Layer that owns this error code.
    pub fn layer(&self) -> Layer {
        match self {
            Self::NonAsciiCharacter { .. }
            | Self::InvalidControlCharacter { .. }
            | Self::EmptyQuery => Layer::AsciiInput,
            Self::UnknownTable { .. } | Self::UnknownColumn { .. } | Self::SchemaNotLoaded => {
                Layer::Schema
            }
            Self::DirectPhiIdentifier { .. }
            | Self::GeographicPhi { .. }
            | Self::DatePhi { .. }
            | Self::SelectStar => Layer::Phi,
            Self::MissingGroupBy
            | Self::MissingPatientCount
            | Self::InvalidPatientCountSyntax { .. }
            | Self::AggregateInNonSelect { .. }
            | Self::InvalidGroupByColumn { .. } => Layer::Aggregation,
            Self::SubqueryNotAllowed | Self::CteNotAllowed => Layer::Enforcement,
            Self::InstructionInComment { .. }
            | Self::InstructionInString { .. }
            | Self::PrivilegeEscalation { .. }
            | Self::ObfuscationDetected { .. } => Layer::PromptInjection,
            Self::Configuration { .. } | Self::Parsing { .. } => Layer::System,
            Self::NonAsciiOutput { .. }
            | Self::TooManyRows { .. }
            | Self::PatientCountBelowThreshold { .. } => Layer::AsciiOutput,
        }
    }

    /// Whether this is a fault of the validator rather than of the query.
    pub fn is_system(&self) -> bool {
        self.layer() == Layer::System
    }

    /// Whether this error indicates an attempt to get around the controls.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self.layer(),
            Layer::Enforcement | Layer::PromptInjection
        )
    }

    /// Structured context for the error.
    pub fn details(&self) -> Value {
        match self {
            Self::NonAsciiCharacter {
                position,
                character,
                code_point,
            } => json!({
                "position": position,
                "character": character.to_string(),
                "code_point": code_point,
            }),
            Self::InvalidControlCharacter {
                position,
                code_point,
            } => json!({ "position": position, "code_point": code_point }),
            Self::UnknownTable {
                table_name,
                schema,
                candidates,
            } => {
                let mut details = json!({ "table_name": table_name, "schema": schema });
                if !candidates.is_empty() {
                    details["valid_tables"] = json!(candidates);
                }
                details
            }
            Self::UnknownColumn {
                column_name,
                table_name,
                schema,
                candidates,
            } => {
                let mut details = json!({
                    "column_name": column_name,
                    "table_name": table_name,
                    "schema": schema,
                });
                if !candidates.is_empty() {
                    details["valid_columns"] = json!(candidates);
                }
                details
            }
            Self::DirectPhiIdentifier {
                column_name,
                identifier_type,
                clause,
            } => json!({
                "column_name": column_name,
                "identifier_type": identifier_type,
                "clause": clause,
            }),
            Self::GeographicPhi {
                column_name,
                clause,
            }
            | Self::DatePhi {
                column_name,
                clause,
            } => json!({ "column_name": column_name, "clause": clause }),
            Self::InvalidPatientCountSyntax { found_syntax } => {
                json!({ "found_syntax": found_syntax })
            }
            Self::AggregateInNonSelect { clause, function } => {
                json!({ "clause": clause, "function": function })
            }
            Self::InvalidGroupByColumn {
                column_name,
                reason,
            } => json!({ "column_name": column_name, "reason": reason }),
            Self::InstructionInComment { comment, pattern } => {
                json!({ "comment": preview(comment), "pattern": pattern })
            }
            Self::InstructionInString { string, pattern } => {
                json!({ "string": preview(string), "pattern": pattern })
            }
            Self::PrivilegeEscalation { text, keyword } => {
                json!({ "text": preview(text), "keyword": keyword })
            }
            Self::ObfuscationDetected { text, pattern } => {
                json!({ "text": preview(text), "pattern": pattern })
            }
            Self::Configuration {
                config_file,
                reason,
            } => json!({ "config_file": config_file, "reason": reason }),
            Self::Parsing { reason } => json!({ "reason": reason }),
            Self::NonAsciiOutput {
                column,
                row,
                char_code,
            } => json!({ "column": column, "row": row, "char_code": char_code }),
            Self::TooManyRows {
                row_count,
                max_rows,
            } => json!({ "row_count": row_count, "max_rows": max_rows }),
            Self::PatientCountBelowThreshold {
                row,
                count,
                threshold,
            } => json!({ "row": row, "count": count, "threshold": threshold }),
            Self::EmptyQuery
            | Self::SchemaNotLoaded
            | Self::SelectStar
            | Self::MissingGroupBy
            | Self::MissingPatientCount
            | Self::SubqueryNotAllowed
            | Self::CteNotAllowed => json!({}),
        }
    }

    pub fn configuration(config_file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            config_file: config_file.into(),
            reason: reason.into(),
        }
    }
}

impl From<SqlError> for ValidationError {
    fn from(err: SqlError) -> Self {
        Self::Parsing {
            reason: err.to_string(),
        }
    }
}

impl From<ConfigError> for ValidationError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration {
            config_file: "<config>".to_string(),
            reason: err.to_string(),
        }
    }
}
