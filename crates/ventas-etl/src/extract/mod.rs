//! Extract stage: read the source table, validate it, and checkpoint it to
//! a CSV artifact.
//!
//! Validation failures abort before anything touches disk; no partial
//! artifact is ever written.

use chrono::Utc;
use polars::prelude::*;
use std::path::PathBuf;
use tracing::info;

use crate::artifact;
use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::store::SalesStore;
use crate::types::ExtractionSummary;
use crate::utils;
use crate::validate::{BatchProfile, SchemaValidator};

/// Artifact path and summary returned by the extract stage.
#[derive(Debug)]
pub struct ExtractOutput {
    pub artifact_path: PathBuf,
    pub summary: ExtractionSummary,
}

pub struct Extractor {
    config: EtlConfig,
}

impl Extractor {
    pub fn new(config: EtlConfig) -> Self {
        Self { config }
    }

    /// Read the full source table, validate, and persist the checkpoint.
    pub fn run(&self, store: &SalesStore) -> Result<ExtractOutput> {
        info!("extract stage starting: table {}", self.config.source_table);
        let mut df = store.fetch_table(
            &self.config.source_table,
            self.config.since.as_deref(),
            self.config.row_limit,
        )?;
        info!("extracted {} rows, {} columns", df.height(), df.width());

        let report = SchemaValidator::validate(&df, &BatchProfile::source())?;
        if !report.passed {
            return Err(EtlError::SchemaValidation {
                stage: "extract".to_string(),
                report,
            });
        }

        let artifact_path = self.config.extracted_path();
        artifact::write_csv(&artifact_path, &mut df)?;

        let summary = summarize(&df)?;
        info!(
            "extraction summary: {} records, {} columns, dates {} to {}, total sales {:.2}, {} nulls",
            summary.total_records,
            summary.total_columns,
            summary.date_min.as_deref().unwrap_or("-"),
            summary.date_max.as_deref().unwrap_or("-"),
            summary.total_sales,
            summary.null_values
        );

        Ok(ExtractOutput {
            artifact_path,
            summary,
        })
    }
}

fn summarize(df: &DataFrame) -> Result<ExtractionSummary> {
    let fechas = df
        .column("fecha")?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let mut dates: Vec<chrono::NaiveDate> = fechas
        .str()?
        .into_iter()
        .flatten()
        .filter_map(utils::parse_date)
        .collect();
    dates.sort();

    let total_sales: f64 = df
        .column("total_venta")?
        .as_materialized_series()
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .flatten()
        .sum();

    let null_values = df
        .get_columns()
        .iter()
        .map(|column| column.null_count())
        .sum();

    Ok(ExtractionSummary {
        total_records: df.height(),
        total_columns: df.width(),
        date_min: dates.first().map(|d| d.format(utils::DATE_FORMAT).to_string()),
        date_max: dates.last().map(|d| d.format(utils::DATE_FORMAT).to_string()),
        total_sales,
        null_values,
        extraction_timestamp: Utc::now().to_rfc3339(),
    })
}
