//! Reusable schema-validation gate.
//!
//! The same validator guards both pipeline boundaries: the extractor checks
//! the raw source batch, the loader checks the aggregated batch. A
//! [`BatchProfile`] names what each boundary expects; the validator runs
//! every check and reports all failures at once instead of stopping at the
//! first, so a failed run surfaces the full picture.

use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::ValidationReport;
use crate::utils;

/// What a batch must look like at one pipeline boundary.
#[derive(Debug, Clone)]
pub struct BatchProfile {
    pub name: &'static str,
    pub required_columns: &'static [&'static str],
    /// Columns where any null fails the report outright.
    pub critical_columns: &'static [&'static str],
    /// Columns that must be numeric or coercible to numeric.
    pub numeric_columns: &'static [&'static str],
    pub date_column: Option<&'static str>,
}

impl BatchProfile {
    /// Expectations on the raw source batch at extraction time.
    pub fn source() -> Self {
        Self {
            name: "source",
            required_columns: &[
                "id",
                "fecha",
                "producto",
                "cantidad",
                "precio_unitario",
                "total_venta",
            ],
            critical_columns: &[],
            numeric_columns: &["cantidad", "precio_unitario", "total_venta"],
            date_column: Some("fecha"),
        }
    }

    /// Expectations on the aggregated batch before it is loaded.
    pub fn target() -> Self {
        Self {
            name: "target",
            required_columns: &[
                "fecha",
                "producto",
                "categoria",
                "region",
                "cantidad_total",
                "precio_promedio",
                "total_venta",
                "num_transacciones",
            ],
            critical_columns: &["fecha", "producto", "total_venta"],
            numeric_columns: &[
                "cantidad_total",
                "precio_promedio",
                "descuento_promedio",
                "total_venta",
                "num_transacciones",
            ],
            date_column: Some("fecha"),
        }
    }
}

/// Schema gate over a tabular batch. Pure: never mutates the input.
pub struct SchemaValidator;

impl SchemaValidator {
    /// Run every check of the profile against the batch.
    ///
    /// Checks that reference a column missing from the batch are skipped;
    /// the missing column itself is already reported by check 2.
    pub fn validate(df: &DataFrame, profile: &BatchProfile) -> Result<ValidationReport> {
        let mut report = ValidationReport::new(profile.name);
        let columns: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let has_column = |name: &str| columns.iter().any(|c| c == name);

        // 1. Non-empty batch
        if df.height() == 0 {
            report.fail("empty_batch");
        }

        // 2. Required columns present
        let missing: Vec<&str> = profile
            .required_columns
            .iter()
            .copied()
            .filter(|col| !has_column(col))
            .collect();
        if !missing.is_empty() {
            report.fail(format!("missing_columns [{}]", missing.join(", ")));
        }

        // 3. Date column parseable on every non-null row
        if let Some(date_col) = profile.date_column
            && has_column(date_col)
            && df.height() > 0
        {
            Self::check_dates(df, date_col, &mut report)?;
        }

        // 4. Numeric columns numeric or coercible
        for col_name in profile.numeric_columns {
            if has_column(col_name) && df.height() > 0 {
                Self::check_numeric(df, col_name, &mut report)?;
            }
        }

        // 5. Null rates: informational, fatal only on critical columns
        for column in df.get_columns() {
            let nulls = column.null_count();
            if nulls == 0 {
                continue;
            }
            let name = column.name().to_string();
            let pct = nulls as f64 / df.height() as f64 * 100.0;
            if profile.critical_columns.contains(&name.as_str()) {
                report.fail(format!("critical_nulls {name} ({nulls} rows)"));
            } else {
                report
                    .warnings
                    .push(format!("{name}: {nulls} null values ({pct:.2}%)"));
            }
        }

        if report.passed {
            info!("{} batch passed schema validation", profile.name);
        } else {
            warn!(
                "{} batch failed schema validation: {}",
                profile.name,
                report.failed_checks.join("; ")
            );
        }
        Ok(report)
    }

    fn check_dates(df: &DataFrame, date_col: &str, report: &mut ValidationReport) -> Result<()> {
        let series = df.column(date_col)?.as_materialized_series();
        match series.dtype() {
            DataType::String => {
                let unparseable = series
                    .str()?
                    .into_iter()
                    .flatten()
                    .filter(|value| utils::parse_date(value).is_none())
                    .count();
                if unparseable > 0 {
                    report.fail(format!("unparseable_dates {date_col} ({unparseable} rows)"));
                } else {
                    debug!("all {date_col} values parse as dates");
                }
            }
            DataType::Date | DataType::Datetime(_, _) => {
                debug!("{date_col} already has a temporal dtype");
            }
            other => {
                report.fail(format!("unparseable_dates {date_col} (dtype {other})"));
            }
        }
        Ok(())
    }

    fn check_numeric(df: &DataFrame, col_name: &str, report: &mut ValidationReport) -> Result<()> {
        let series = df.column(col_name)?.as_materialized_series();
        if utils::is_numeric_dtype(series.dtype()) {
            return Ok(());
        }
        // Non-strict cast: values that fail to coerce become nulls, which
        // we count against the nulls already present.
        match series.cast(&DataType::Float64) {
            Ok(cast) => {
                let failures = cast.null_count().saturating_sub(series.null_count());
                if failures > 0 {
                    report.fail(format!("non_numeric_values {col_name} ({failures} rows)"));
                } else {
                    debug!("coerced {col_name} to numeric");
                }
            }
            Err(_) => {
                report.fail(format!(
                    "non_numeric_values {col_name} (dtype {})",
                    series.dtype()
                ));
            }
        }
        Ok(())
    }
}
