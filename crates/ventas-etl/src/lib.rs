//! Batch ETL pipeline for sales data.
//!
//! # Overview
//!
//! Three stages turn raw transactional records into validated, aggregated
//! rollups in a queryable SQLite table, exchanging CSV artifacts on disk:
//!
//! - **Extract**: read the full source table, gate it through the schema
//!   validator, checkpoint it to `extracted_data.csv`.
//! - **Transform**: clean (dedup, null handling, positivity filters, a wide
//!   IQR outlier fence, text normalization), derive per-row metrics into a
//!   full-detail audit artifact, and independently aggregate by
//!   (fecha, producto, categoria, region).
//! - **Load**: validate the rollup, back up the existing target table,
//!   replace its contents wholesale, rebuild the secondary indexes, and
//!   report statistics.
//!
//! The pipeline is single-threaded and stage-sequential; each stage either
//! returns its artifact/statistics or an [`EtlError`]. Retries, timeouts,
//! and scheduling belong to an external orchestrator —
//! [`EtlError::is_retryable`] tells it which failures are worth retrying.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ventas_etl::{EtlConfig, EtlPipeline};
//!
//! let config = EtlConfig::builder()
//!     .db_path("data/database.db")
//!     .source_table("sales_data")
//!     .target_table("sales_transformed")
//!     .output_dir("data/output")
//!     .build()?;
//!
//! let report = EtlPipeline::new(config).run()?;
//! println!("loaded {} rollup rows", report.load.total_records);
//! ```
//!
//! Stages can also run individually (each consumes the previous stage's
//! artifact from disk), which is how the CLI subcommands map onto them.

pub mod artifact;
pub mod clean;
pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod store;
pub mod transform;
pub mod types;
pub mod utils;
pub mod validate;

// Re-exports for convenient access
pub use clean::DataCleaner;
pub use config::{EtlConfig, EtlConfigBuilder};
pub use error::{EtlError, Result};
pub use extract::{ExtractOutput, Extractor};
pub use load::Loader;
pub use pipeline::{EtlPipeline, StageOutcome};
pub use store::SalesStore;
pub use transform::{Aggregator, Deriver, TransformOutput, Transformer};
pub use types::{
    CleaningReport, ExtractionSummary, LoadStatistics, PipelineRunReport, RankedTotal,
    TransformSummary, ValidationReport,
};
pub use validate::{BatchProfile, SchemaValidator};
