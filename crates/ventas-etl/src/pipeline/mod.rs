//! Stage sequencing for a full pipeline run.
//!
//! This runner only composes the three stages in-process for the CLI. It is
//! not the orchestrator: retries, timeouts, scheduling, and single-active-run
//! enforcement live outside. Each stage's result is classified into a
//! [`StageOutcome`] so callers can pattern-match instead of propagating, with
//! [`StageOutcome::into_result`] as the thin raise-based adapter at the
//! boundary.

use tracing::{error, info};

use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::extract::Extractor;
use crate::load::Loader;
use crate::store::SalesStore;
use crate::transform::Transformer;
use crate::types::PipelineRunReport;

/// Tagged result of one stage.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Success(T),
    /// Deterministic data failure: retrying the same input reproduces it.
    ValidationFailed(EtlError),
    /// Environmental failure: the orchestrator may retry.
    StorageFailed(EtlError),
}

impl<T> StageOutcome<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err @ (EtlError::SchemaValidation { .. } | EtlError::Integrity(_))) => {
                Self::ValidationFailed(err)
            }
            Err(err) => Self::StorageFailed(err),
        }
    }

    /// Raise-based adapter for callers that prefer `?` over matching.
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Success(value) => Ok(value),
            Self::ValidationFailed(err) | Self::StorageFailed(err) => Err(err),
        }
    }
}

/// In-process composition of extract, transform, and load.
pub struct EtlPipeline {
    config: EtlConfig,
}

impl EtlPipeline {
    pub fn new(config: EtlConfig) -> Self {
        Self { config }
    }

    /// Run the three stages in order, each consuming the previous stage's
    /// artifact.
    pub fn run(&self) -> Result<PipelineRunReport> {
        self.config.validate()?;
        let mut store = SalesStore::open(&self.config.db_path)?;

        info!("pipeline run starting");
        let extraction = Self::check(
            "extract",
            StageOutcome::from_result(Extractor::new(self.config.clone()).run(&store)),
        )?;
        let transformation = Self::check(
            "transform",
            StageOutcome::from_result(Transformer::new(self.config.clone()).run()),
        )?;
        let load = Self::check(
            "load",
            StageOutcome::from_result(Loader::new(self.config.clone()).run(&mut store)),
        )?;

        info!("pipeline run complete");
        Ok(PipelineRunReport {
            extraction: extraction.summary,
            transformation: transformation.summary,
            load,
        })
    }

    fn check<T>(stage: &str, outcome: StageOutcome<T>) -> Result<T> {
        match &outcome {
            StageOutcome::Success(_) => info!("{stage} stage succeeded"),
            StageOutcome::ValidationFailed(err) => {
                error!("{stage} stage rejected its input: {err}");
            }
            StageOutcome::StorageFailed(err) => {
                error!(
                    "{stage} stage failed (retryable: {}): {err}",
                    err.is_retryable()
                );
            }
        }
        outcome.into_result()
    }
}
