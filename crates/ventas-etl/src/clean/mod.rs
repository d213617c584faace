//! Data cleaning for raw sales batches.
//!
//! The steps run in a fixed order because later statistics depend on
//! earlier filtering: the IQR fence is computed over the batch as it stands
//! after duplicates, nulls, and non-positive quantities/prices are gone.
//! Cleaning is pure computation: no I/O, no retries, no external failure
//! modes.

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::Result;
use crate::types::CleaningReport;
use crate::utils;

/// Text columns trimmed and title-cased in the final step.
const TEXT_COLUMNS: [&str; 3] = ["producto", "categoria", "region"];

/// A row missing any of these is dropped.
const CRITICAL_COLUMNS: [&str; 4] = ["fecha", "producto", "cantidad", "precio_unitario"];

/// Cleaner for raw sales batches.
pub struct DataCleaner {
    iqr_multiplier: f64,
}

impl DataCleaner {
    pub fn new(iqr_multiplier: f64) -> Self {
        Self { iqr_multiplier }
    }

    /// Clean a raw batch. Output row order is not guaranteed to match the
    /// input. The report's counters satisfy: initial = final + duplicates +
    /// nulls + invalid quantity + invalid price + outliers.
    pub fn clean(&self, df: DataFrame) -> Result<(DataFrame, CleaningReport)> {
        let mut report = CleaningReport {
            initial_rows: df.height(),
            ..Default::default()
        };
        info!("cleaning batch of {} rows", report.initial_rows);

        // 1. Normalize fecha to canonical ISO strings. Upstream validation
        // gates unparseable batches; any stray failure becomes a null and
        // falls to the critical-null filter below.
        let mut df = normalize_dates(df)?;

        // 2. Drop exact full-row duplicates
        let before = df.height();
        df = df.unique::<&str, &str>(None, UniqueKeepStrategy::First, None)?;
        report.duplicates_removed = before - df.height();
        if report.duplicates_removed > 0 {
            debug!("removed {} duplicate rows", report.duplicates_removed);
        }

        // 3. Coerce numeric dtypes, then default missing descuento to 0
        df = coerce_numeric_types(df)?;
        df = self.fill_discounts(df, &mut report)?;

        // 4. Drop rows with nulls in critical columns
        let before = df.height();
        let mut keep = BooleanChunked::from_slice("keep".into(), &vec![true; df.height()]);
        for name in CRITICAL_COLUMNS {
            let is_null = df.column(name)?.as_materialized_series().is_null();
            keep = &keep & &(!&is_null);
        }
        df = df.filter(&keep)?;
        report.nulls_removed = before - df.height();
        if report.nulls_removed > 0 {
            debug!(
                "removed {} rows with nulls in critical columns",
                report.nulls_removed
            );
        }

        // 5. Drop non-positive quantities
        let before = df.height();
        let mask = df.column("cantidad")?.as_materialized_series().i64()?.gt(0);
        df = df.filter(&mask)?;
        report.invalid_quantity_removed = before - df.height();
        if report.invalid_quantity_removed > 0 {
            debug!(
                "removed {} rows with cantidad <= 0",
                report.invalid_quantity_removed
            );
        }

        // 6. Drop non-positive prices
        let before = df.height();
        let mask = df
            .column("precio_unitario")?
            .as_materialized_series()
            .f64()?
            .gt(0.0);
        df = df.filter(&mask)?;
        report.invalid_price_removed = before - df.height();
        if report.invalid_price_removed > 0 {
            debug!(
                "removed {} rows with precio_unitario <= 0",
                report.invalid_price_removed
            );
        }

        // 7. IQR outlier fence on total_venta, over the batch as filtered
        // so far
        df = self.remove_outliers(df, &mut report)?;

        // 8. Trim and title-case text columns
        df = normalize_text(df)?;

        report.final_rows = df.height();
        info!(
            "cleaning done: {} -> {} rows ({} removed, {:.2}%)",
            report.initial_rows,
            report.final_rows,
            report.rows_removed(),
            report.removed_percentage()
        );
        Ok((df, report))
    }

    fn fill_discounts(&self, mut df: DataFrame, report: &mut CleaningReport) -> Result<DataFrame> {
        let has_descuento = df
            .get_column_names()
            .iter()
            .any(|name| name.as_str() == "descuento");
        if has_descuento {
            let descuento = df
                .column("descuento")?
                .as_materialized_series()
                .cast(&DataType::Float64)?;
            report.discounts_filled = descuento.null_count();
            let filled: Float64Chunked = descuento
                .f64()?
                .into_iter()
                .map(|opt| Some(opt.unwrap_or(0.0)))
                .collect();
            df.replace("descuento", filled.with_name("descuento".into()).into_series())?;
            if report.discounts_filled > 0 {
                debug!("filled {} null descuento values with 0", report.discounts_filled);
            }
        } else {
            // The cleaned batch must always carry the field
            df.with_column(Series::new("descuento".into(), vec![0.0f64; df.height()]))?;
            debug!("descuento column absent, added as zeros");
        }
        Ok(df)
    }

    fn remove_outliers(&self, df: DataFrame, report: &mut CleaningReport) -> Result<DataFrame> {
        let total = df.column("total_venta")?.as_materialized_series().f64()?;
        let mut values: Vec<f64> = total.into_iter().flatten().collect();
        if values.is_empty() {
            return Ok(df);
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let q1 = utils::quantile_lower(&values, 0.25).unwrap_or(0.0);
        let q3 = utils::quantile_lower(&values, 0.75).unwrap_or(0.0);
        let iqr = q3 - q1;
        let lower = q1 - self.iqr_multiplier * iqr;
        let upper = q3 + self.iqr_multiplier * iqr;

        // Null totals are kept: the fence only rejects measured values
        let mut mask_values = Vec::with_capacity(total.len());
        for opt in total.into_iter() {
            mask_values.push(opt.is_none_or(|v| v >= lower && v <= upper));
        }
        let mask = BooleanChunked::from_slice("mask".into(), &mask_values);

        let before = df.height();
        let filtered = df.filter(&mask)?;
        report.outliers_removed = before - filtered.height();
        if report.outliers_removed > 0 {
            debug!(
                "removed {} total_venta outliers outside [{:.2}, {:.2}]",
                report.outliers_removed, lower, upper
            );
        }
        Ok(filtered)
    }
}

/// Re-render the `fecha` column as canonical ISO date strings. Values that
/// fail to parse become nulls. Shared with the load stage's preparation.
pub(crate) fn normalize_dates(mut df: DataFrame) -> Result<DataFrame> {
    let as_string = df
        .column("fecha")?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let normalized: StringChunked = as_string
        .str()?
        .into_iter()
        .map(|opt| opt.and_then(utils::normalize_date))
        .collect();
    df.replace("fecha", normalized.with_name("fecha".into()).into_series())?;
    Ok(df)
}

fn coerce_numeric_types(mut df: DataFrame) -> Result<DataFrame> {
    // cantidad passes through Float64 so values serialized as "3.0" still
    // land on Int64
    let cantidad = df
        .column("cantidad")?
        .as_materialized_series()
        .cast(&DataType::Float64)?
        .cast(&DataType::Int64)?;
    df.replace("cantidad", cantidad)?;

    for name in ["precio_unitario", "total_venta"] {
        let column = df
            .column(name)?
            .as_materialized_series()
            .cast(&DataType::Float64)?;
        df.replace(name, column)?;
    }
    Ok(df)
}

fn normalize_text(mut df: DataFrame) -> Result<DataFrame> {
    for name in TEXT_COLUMNS {
        let present = df
            .get_column_names()
            .iter()
            .any(|column| column.as_str() == name);
        if !present {
            continue;
        }
        let series = df.column(name)?.as_materialized_series();
        if series.dtype() != &DataType::String {
            continue;
        }
        let normalized: StringChunked = series
            .str()?
            .into_iter()
            .map(|opt| opt.map(|value| utils::title_case(value.trim())))
            .collect();
        df.replace(name, normalized.with_name(name.into()).into_series())?;
    }
    Ok(df)
}
