//! Custom error types for the ETL pipeline.
//!
//! The taxonomy separates deterministic data failures (schema validation,
//! integrity) from environmental failures (storage, I/O), so an external
//! orchestrator can decide what is worth retrying.

use thiserror::Error;

use crate::types::ValidationReport;

/// The main error type for the ETL pipeline.
#[derive(Error, Debug)]
pub enum EtlError {
    /// A fatal schema-validation check failed at a stage boundary.
    #[error("schema validation failed in {stage}: {}", .report.failed_checks.join("; "))]
    SchemaValidation {
        stage: String,
        report: ValidationReport,
    },

    /// Data violates an integrity rule that validation alone does not cover.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Failure connecting to, reading from, or writing to the store.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// DataFrame computation failed.
    #[error("dataframe error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// IO error wrapper (artifact files, directories).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration provided.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EtlError {
    /// Whether retrying the stage with the same input could succeed.
    ///
    /// Validation and integrity failures are deterministic: the same bad
    /// input reproduces the same failure, so the orchestrator should not
    /// retry them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }

    /// Stable code for the error class, for logs and reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SchemaValidation { .. } => "SCHEMA_VALIDATION",
            Self::Integrity(_) => "INTEGRITY",
            Self::Storage(_) => "STORAGE",
            Self::Polars(_) => "DATAFRAME",
            Self::Io(_) => "IO",
            Self::Config(_) => "CONFIG",
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, EtlError>;
