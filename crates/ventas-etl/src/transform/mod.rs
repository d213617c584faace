//! Transform stage: clean once, then derive and aggregate independently.
//!
//! The stage consumes the extraction artifact and produces two artifacts:
//! the full-detail derived batch (audit/debug only) and the aggregated
//! rollup, which is the hand-off to the load stage.

pub mod aggregate;
pub mod derive;

pub use aggregate::Aggregator;
pub use derive::Deriver;

use polars::prelude::*;
use std::path::PathBuf;
use tracing::info;

use crate::artifact;
use crate::clean::DataCleaner;
use crate::config::EtlConfig;
use crate::error::Result;
use crate::types::TransformSummary;

/// Artifact paths and summary returned by the transform stage.
#[derive(Debug)]
pub struct TransformOutput {
    /// The rollup consumed by the load stage.
    pub aggregated_path: PathBuf,
    /// Full-detail derived batch, kept for audit only.
    pub full_detail_path: PathBuf,
    pub summary: TransformSummary,
}

pub struct Transformer {
    config: EtlConfig,
}

impl Transformer {
    pub fn new(config: EtlConfig) -> Self {
        Self { config }
    }

    /// Run the stage against the extraction artifact on disk.
    pub fn run(&self) -> Result<TransformOutput> {
        let df = artifact::read_csv(&self.config.extracted_path())?;
        self.transform(df)
    }

    /// Clean the batch, then feed the cleaned result to the deriver and the
    /// aggregator. The two consumers are independent; neither sees the
    /// other's output.
    pub fn transform(&self, df: DataFrame) -> Result<TransformOutput> {
        info!("transform stage starting: {} rows", df.height());
        let original_records = df.height();

        let cleaner = DataCleaner::new(self.config.iqr_multiplier);
        let (cleaned, cleaning) = cleaner.clean(df)?;

        let mut derived = Deriver::derive(&cleaned)?;
        let full_detail_path = self.config.full_detail_path();
        artifact::write_csv(&full_detail_path, &mut derived)?;

        let mut aggregated = Aggregator::aggregate(&cleaned)?;
        let aggregated_path = self.config.aggregated_path();
        artifact::write_csv(&aggregated_path, &mut aggregated)?;

        let total_sales: f64 = cleaned
            .column("total_venta")?
            .as_materialized_series()
            .f64()?
            .into_iter()
            .flatten()
            .sum();
        let summary = TransformSummary {
            original_records,
            cleaned_records: cleaned.height(),
            aggregated_records: aggregated.height(),
            reduction_percentage: if original_records == 0 {
                0.0
            } else {
                (original_records - aggregated.height()) as f64 / original_records as f64 * 100.0
            },
            total_sales,
            cleaning,
            transformation_timestamp: chrono::Utc::now().to_rfc3339(),
        };

        info!(
            "transform stage complete: {} -> {} cleaned -> {} aggregated",
            summary.original_records, summary.cleaned_records, summary.aggregated_records
        );
        Ok(TransformOutput {
            aggregated_path,
            full_detail_path,
            summary,
        })
    }
}
