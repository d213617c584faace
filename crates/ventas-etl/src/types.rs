//! Shared report and summary payloads exchanged between stages and surfaced
//! by the CLI. All of them are observability data: none is ever re-ingested.

use serde::{Deserialize, Serialize};

/// Outcome of a schema-validation pass over a batch.
///
/// Produced at the extraction and load boundaries and consumed immediately
/// by the calling stage to decide continue-vs-abort; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Which batch profile was checked ("source" or "target").
    pub profile: String,
    /// True when no fatal check failed.
    pub passed: bool,
    /// Identifiers of failed checks, in check order.
    pub failed_checks: Vec<String>,
    /// Informational findings (null rates) that do not fail the batch.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            passed: true,
            failed_checks: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record a failed check and mark the report as failed.
    pub fn fail(&mut self, check: impl Into<String>) {
        self.failed_checks.push(check.into());
        self.passed = false;
    }
}

/// Summary of an extraction run, logged for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub total_records: usize,
    pub total_columns: usize,
    pub date_min: Option<String>,
    pub date_max: Option<String>,
    pub total_sales: f64,
    pub null_values: usize,
    pub extraction_timestamp: String,
}

/// Per-step removal counters from the cleaning pass.
///
/// Invariant: `initial_rows` equals `final_rows` plus every removal counter
/// (`discounts_filled` is a fill, not a removal).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleaningReport {
    pub initial_rows: usize,
    pub duplicates_removed: usize,
    pub discounts_filled: usize,
    pub nulls_removed: usize,
    pub invalid_quantity_removed: usize,
    pub invalid_price_removed: usize,
    pub outliers_removed: usize,
    pub final_rows: usize,
}

impl CleaningReport {
    pub fn rows_removed(&self) -> usize {
        self.initial_rows - self.final_rows
    }

    pub fn removed_percentage(&self) -> f64 {
        if self.initial_rows == 0 {
            0.0
        } else {
            self.rows_removed() as f64 / self.initial_rows as f64 * 100.0
        }
    }
}

/// Summary of the transform stage (cleaning + aggregation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSummary {
    pub original_records: usize,
    pub cleaned_records: usize,
    pub aggregated_records: usize,
    pub reduction_percentage: f64,
    pub total_sales: f64,
    pub cleaning: CleaningReport,
    pub transformation_timestamp: String,
}

/// One entry of a top-N ranking by summed sales.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedTotal {
    pub name: String,
    pub total: f64,
}

/// Statistics computed from the committed target table after a load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadStatistics {
    pub total_records: i64,
    pub total_sales: f64,
    pub date_min: Option<String>,
    pub date_max: Option<String>,
    pub top_products: Vec<RankedTotal>,
    pub top_regions: Vec<RankedTotal>,
    pub load_timestamp: String,
}

/// Combined payload of a full pipeline run, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunReport {
    pub extraction: ExtractionSummary,
    pub transformation: TransformSummary,
    pub load: LoadStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_fail_flips_passed() {
        let mut report = ValidationReport::new("source");
        assert!(report.passed);
        report.fail("empty_batch");
        assert!(!report.passed);
        assert_eq!(report.failed_checks, vec!["empty_batch".to_string()]);
    }

    #[test]
    fn test_cleaning_report_percentage() {
        let report = CleaningReport {
            initial_rows: 10,
            final_rows: 7,
            duplicates_removed: 1,
            nulls_removed: 1,
            invalid_quantity_removed: 1,
            ..Default::default()
        };
        assert_eq!(report.rows_removed(), 3);
        assert!((report.removed_percentage() - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_cleaning_report_percentage() {
        let report = CleaningReport::default();
        assert_eq!(report.removed_percentage(), 0.0);
    }
}
