//! Configuration for the ETL pipeline.
//!
//! Every stage receives an explicit [`EtlConfig`] at construction; there is
//! no ambient global lookup. The builder validates on `build()`.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{EtlError, Result};

/// Fixed artifact file names; the directory is the configurable part.
pub const EXTRACTED_FILENAME: &str = "extracted_data.csv";
pub const AGGREGATED_FILENAME: &str = "transformed_data.csv";
pub const FULL_DETAIL_FILENAME: &str = "transformed_data_full.csv";

/// Configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Path to the SQLite database holding source and target tables.
    pub db_path: PathBuf,

    /// Table the extractor reads, owned by the source system.
    pub source_table: String,

    /// Table the loader replaces.
    pub target_table: String,

    /// Directory where stage artifacts (CSV files) are written.
    pub output_dir: PathBuf,

    /// Optional lower bound on `fecha` for extraction (inclusive).
    /// Supported but unused by the default run.
    pub since: Option<String>,

    /// Optional row limit for extraction. Supported but unused by the
    /// default run.
    pub row_limit: Option<usize>,

    /// Multiplier applied to the IQR when fencing `total_venta` outliers.
    /// Wider than the conventional 1.5 so legitimate high-value sales
    /// survive.
    pub iqr_multiplier: f64,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/database.db"),
            source_table: "sales_data".to_string(),
            target_table: "sales_transformed".to_string(),
            output_dir: PathBuf::from("data/output"),
            since: None,
            row_limit: None,
            iqr_multiplier: 3.0,
        }
    }
}

impl EtlConfig {
    pub fn builder() -> EtlConfigBuilder {
        EtlConfigBuilder::default()
    }

    /// Build a configuration from environment variables, falling back to
    /// defaults: `DB_PATH`, `DB_TABLE_SOURCE`, `DB_TABLE_TARGET`,
    /// `DATA_OUTPUT_PATH`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: env::var("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            source_table: env::var("DB_TABLE_SOURCE").unwrap_or(defaults.source_table),
            target_table: env::var("DB_TABLE_TARGET").unwrap_or(defaults.target_table),
            output_dir: env::var("DATA_OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            ..defaults
        }
    }

    pub fn extracted_path(&self) -> PathBuf {
        self.output_dir.join(EXTRACTED_FILENAME)
    }

    pub fn aggregated_path(&self) -> PathBuf {
        self.output_dir.join(AGGREGATED_FILENAME)
    }

    pub fn full_detail_path(&self) -> PathBuf {
        self.output_dir.join(FULL_DETAIL_FILENAME)
    }

    /// Check invariants the stages rely on.
    pub fn validate(&self) -> Result<()> {
        if self.source_table.trim().is_empty() {
            return Err(EtlError::Config("source table name is empty".to_string()));
        }
        if self.target_table.trim().is_empty() {
            return Err(EtlError::Config("target table name is empty".to_string()));
        }
        if !self.iqr_multiplier.is_finite() || self.iqr_multiplier <= 0.0 {
            return Err(EtlError::Config(format!(
                "IQR multiplier must be positive, got {}",
                self.iqr_multiplier
            )));
        }
        Ok(())
    }
}

/// Fluent builder for [`EtlConfig`].
#[derive(Debug, Default)]
pub struct EtlConfigBuilder {
    config: EtlConfig,
}

impl EtlConfigBuilder {
    pub fn db_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.db_path = path.as_ref().to_path_buf();
        self
    }

    pub fn source_table(mut self, table: impl Into<String>) -> Self {
        self.config.source_table = table.into();
        self
    }

    pub fn target_table(mut self, table: impl Into<String>) -> Self {
        self.config.target_table = table.into();
        self
    }

    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.output_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn since(mut self, date: impl Into<String>) -> Self {
        self.config.since = Some(date.into());
        self
    }

    pub fn row_limit(mut self, limit: usize) -> Self {
        self.config.row_limit = Some(limit);
        self
    }

    pub fn iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.config.iqr_multiplier = multiplier;
        self
    }

    pub fn build(self) -> Result<EtlConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = EtlConfig::builder().build().unwrap();
        assert_eq!(config.source_table, "sales_data");
        assert_eq!(config.target_table, "sales_transformed");
        assert_eq!(config.iqr_multiplier, 3.0);
        assert!(config.since.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = EtlConfig::builder()
            .db_path("/tmp/etl.db")
            .source_table("ventas")
            .target_table("ventas_agg")
            .output_dir("/tmp/out")
            .since("2024-01-01")
            .row_limit(500)
            .iqr_multiplier(1.5)
            .build()
            .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/etl.db"));
        assert_eq!(config.since.as_deref(), Some("2024-01-01"));
        assert_eq!(config.row_limit, Some(500));
        assert_eq!(config.aggregated_path(), PathBuf::from("/tmp/out/transformed_data.csv"));
    }

    #[test]
    fn test_builder_rejects_bad_multiplier() {
        assert!(EtlConfig::builder().iqr_multiplier(0.0).build().is_err());
        assert!(EtlConfig::builder().iqr_multiplier(-2.0).build().is_err());
    }

    #[test]
    fn test_builder_rejects_empty_table() {
        assert!(EtlConfig::builder().source_table("  ").build().is_err());
    }
}
