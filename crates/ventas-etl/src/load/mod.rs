//! Load stage: validate the rollup, back up the target, replace it, and
//! report statistics.
//!
//! The backup is best-effort: losing a backup is logged and tolerated,
//! losing the load is not. Duplicate grouping keys are a warning, never a
//! silent fix.

use chrono::Utc;
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::artifact;
use crate::clean;
use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::store::SalesStore;
use crate::types::LoadStatistics;
use crate::validate::{BatchProfile, SchemaValidator};

/// Numeric columns checked for negative values before the write.
const NUMERIC_COLUMNS: [&str; 5] = [
    "cantidad_total",
    "precio_promedio",
    "descuento_promedio",
    "total_venta",
    "num_transacciones",
];

/// Columns that sometimes leak out of tabular round-trips as row indexes.
const INDEX_LIKE_COLUMNS: [&str; 3] = ["", "index", "Unnamed: 0"];

pub struct Loader {
    config: EtlConfig,
}

impl Loader {
    pub fn new(config: EtlConfig) -> Self {
        Self { config }
    }

    /// Run the stage against the aggregated artifact on disk.
    pub fn run(&self, store: &mut SalesStore) -> Result<LoadStatistics> {
        let df = artifact::read_csv(&self.config.aggregated_path())?;
        self.load(df, store)
    }

    /// Validate and write the aggregated batch into the target table.
    ///
    /// Whole-table replace: rerunning the same batch leaves the target
    /// content-identical, though every rerun still produces a fresh backup.
    pub fn load(&self, df: DataFrame, store: &mut SalesStore) -> Result<LoadStatistics> {
        info!(
            "load stage starting: {} rows into {}",
            df.height(),
            self.config.target_table
        );

        let report = SchemaValidator::validate(&df, &BatchProfile::target())?;
        if !report.passed {
            return Err(EtlError::SchemaValidation {
                stage: "load".to_string(),
                report,
            });
        }
        check_non_negative(&df)?;
        warn_duplicate_keys(&df)?;

        let prepared = prepare_for_load(df)?;

        let now = Utc::now();
        if store.table_exists(&self.config.target_table)? {
            let stamp = now.format("%Y%m%d_%H%M%S").to_string();
            // The load outranks the backup: a failed backup is logged and
            // the load continues.
            match store.backup_table(&self.config.target_table, &stamp) {
                Ok(backup) => info!("existing target backed up as {backup}"),
                Err(err) => warn!("could not back up {}: {err}", self.config.target_table),
            }
        } else {
            info!(
                "target table {} does not exist, no backup needed",
                self.config.target_table
            );
        }

        let written =
            store.replace_table(&self.config.target_table, &prepared, &now.to_rfc3339())?;
        info!("{written} records loaded into {}", self.config.target_table);

        if let Err(err) = store.create_indexes(&self.config.target_table) {
            warn!("index creation failed: {err}");
        }

        let stats = store.load_statistics(&self.config.target_table)?;
        info!(
            "load statistics: {} records, total sales {:.2}, dates {} to {}",
            stats.total_records,
            stats.total_sales,
            stats.date_min.as_deref().unwrap_or("-"),
            stats.date_max.as_deref().unwrap_or("-"),
        );
        Ok(stats)
    }
}

fn check_non_negative(df: &DataFrame) -> Result<()> {
    for name in NUMERIC_COLUMNS {
        let Ok(column) = df.column(name) else {
            continue;
        };
        let cast = column.as_materialized_series().cast(&DataType::Float64)?;
        if let Some(min) = cast.f64()?.min()
            && min < 0.0
        {
            return Err(EtlError::Integrity(format!(
                "negative values found in '{name}' (min {min})"
            )));
        }
    }
    Ok(())
}

fn warn_duplicate_keys(df: &DataFrame) -> Result<()> {
    let key_columns: Vec<Series> = ["fecha", "producto", "categoria", "region"]
        .iter()
        .map(|name| {
            df.column(name)?
                .as_materialized_series()
                .cast(&DataType::String)
        })
        .collect::<PolarsResult<_>>()?;
    let keys: Vec<&StringChunked> = key_columns
        .iter()
        .map(|series| series.str())
        .collect::<PolarsResult<_>>()?;

    let mut seen = HashSet::new();
    let mut duplicates = 0usize;
    for i in 0..df.height() {
        let key = (
            keys[0].get(i).unwrap_or("").to_string(),
            keys[1].get(i).unwrap_or("").to_string(),
            keys[2].get(i).unwrap_or("").to_string(),
            keys[3].get(i).unwrap_or("").to_string(),
        );
        if !seen.insert(key) {
            duplicates += 1;
        }
    }
    if duplicates > 0 {
        warn!("{duplicates} rows duplicated on (fecha, producto, categoria, region); loading anyway");
    }
    Ok(())
}

/// Normalize dates, coerce dtypes, drop stray index columns, and sort by
/// fecha. Sorting stabilizes diffs between runs; correctness does not
/// depend on it.
fn prepare_for_load(df: DataFrame) -> Result<DataFrame> {
    let mut df = df;
    for name in INDEX_LIKE_COLUMNS {
        let present = df
            .get_column_names()
            .iter()
            .any(|column| column.as_str() == name);
        if present {
            df = df.drop(name)?;
        }
    }

    df = clean::normalize_dates(df)?;

    for name in ["producto", "categoria", "region"] {
        let column = df
            .column(name)?
            .as_materialized_series()
            .cast(&DataType::String)?;
        df.replace(name, column)?;
    }
    for name in ["cantidad_total", "num_transacciones"] {
        let column = df
            .column(name)?
            .as_materialized_series()
            .cast(&DataType::Float64)?
            .cast(&DataType::Int64)?;
        df.replace(name, column)?;
    }
    for name in ["precio_promedio", "descuento_promedio", "total_venta"] {
        let Ok(column) = df.column(name) else {
            continue;
        };
        let cast = column.as_materialized_series().cast(&DataType::Float64)?;
        df.replace(name, cast)?;
    }

    Ok(df.sort(["fecha"], SortMultipleOptions::default())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregated_df() -> DataFrame {
        df![
            "fecha" => ["2024-01-02", "2024-01-01"],
            "producto" => ["Laptop", "Mouse"],
            "categoria" => ["Tecnologia", "Accesorios"],
            "region" => ["Norte", "Sur"],
            "cantidad_total" => [3i64, 5],
            "precio_promedio" => [950.0, 25.0],
            "descuento_promedio" => [0.05, 0.0],
            "total_venta" => [2620.0, 125.0],
            "num_transacciones" => [2i64, 1],
        ]
        .unwrap()
    }

    fn loader() -> Loader {
        Loader::new(EtlConfig::builder().build().unwrap())
    }

    // ==================== validation gates ====================

    #[test]
    fn test_load_rejects_empty_batch() {
        let mut store = SalesStore::open_in_memory().unwrap();
        let err = loader()
            .load(aggregated_df().head(Some(0)), &mut store)
            .unwrap_err();
        assert!(matches!(err, EtlError::SchemaValidation { .. }));
        assert!(!store.table_exists("sales_transformed").unwrap());
    }

    #[test]
    fn test_load_rejects_missing_column() {
        let mut store = SalesStore::open_in_memory().unwrap();
        let df = aggregated_df().drop("producto").unwrap();
        let err = loader().load(df, &mut store).unwrap_err();
        assert!(matches!(err, EtlError::SchemaValidation { .. }));
        assert!(!store.table_exists("sales_transformed").unwrap());
    }

    #[test]
    fn test_load_rejects_negative_values() {
        let mut store = SalesStore::open_in_memory().unwrap();
        let mut df = aggregated_df();
        df.replace(
            "cantidad_total",
            Series::new("cantidad_total".into(), [-5i64, 5].as_ref()),
        )
        .unwrap();
        let err = loader().load(df, &mut store).unwrap_err();
        assert!(matches!(err, EtlError::Integrity(_)));
        assert!(!store.table_exists("sales_transformed").unwrap());
    }

    #[test]
    fn test_duplicate_keys_warn_but_load() {
        let mut store = SalesStore::open_in_memory().unwrap();
        let df = df![
            "fecha" => ["2024-01-01", "2024-01-01"],
            "producto" => ["Laptop", "Laptop"],
            "categoria" => ["Tec", "Tec"],
            "region" => ["Norte", "Norte"],
            "cantidad_total" => [1i64, 2],
            "precio_promedio" => [10.0, 10.0],
            "descuento_promedio" => [0.0, 0.0],
            "total_venta" => [10.0, 20.0],
            "num_transacciones" => [1i64, 1],
        ]
        .unwrap();
        let stats = loader().load(df, &mut store).unwrap();
        assert_eq!(stats.total_records, 2);
    }

    // ==================== write protocol ====================

    #[test]
    fn test_replace_is_idempotent() {
        let mut store = SalesStore::open_in_memory().unwrap();
        let the_loader = loader();

        let first = the_loader.load(aggregated_df(), &mut store).unwrap();
        let second = the_loader.load(aggregated_df(), &mut store).unwrap();

        assert_eq!(first.total_records, 2);
        assert_eq!(second.total_records, 2);
        assert!((first.total_sales - second.total_sales).abs() < 1e-9);
        assert_eq!(first.date_min, second.date_min);
        assert_eq!(first.top_products[0].name, second.top_products[0].name);
    }

    #[test]
    fn test_backup_taken_before_replace() {
        let mut store = SalesStore::open_in_memory().unwrap();
        let the_loader = loader();

        the_loader.load(aggregated_df(), &mut store).unwrap();
        // second load finds an existing target and must back it up
        the_loader.load(aggregated_df(), &mut store).unwrap();

        let backups = store
            .fetch_table("sqlite_master", None, None)
            .map(|df| {
                df.column("name")
                    .unwrap()
                    .as_materialized_series()
                    .str()
                    .unwrap()
                    .into_iter()
                    .flatten()
                    .filter(|name| name.starts_with("sales_transformed_backup_"))
                    .count()
            })
            .unwrap();
        assert_eq!(backups, 1);
    }

    #[test]
    fn test_prepared_rows_sorted_by_fecha() {
        let mut store = SalesStore::open_in_memory().unwrap();
        let stats = loader().load(aggregated_df(), &mut store).unwrap();
        assert_eq!(stats.date_min.as_deref(), Some("2024-01-01"));

        // insertion order follows the fecha sort
        let table = store.fetch_table("sales_transformed", None, None).unwrap();
        let first_fecha = table
            .column("fecha")
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .get(0)
            .map(str::to_string);
        assert_eq!(first_fecha.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn test_index_like_columns_dropped() {
        let mut store = SalesStore::open_in_memory().unwrap();
        let mut df = aggregated_df();
        df.with_column(Series::new("index".into(), [0i64, 1].as_ref()))
            .unwrap();
        loader().load(df, &mut store).unwrap();

        let table = store.fetch_table("sales_transformed", None, None).unwrap();
        assert!(table.column("index").is_err());
    }
}
