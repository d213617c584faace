//! Per-row derived metrics over a cleaned batch.
//!
//! The output is a full-detail audit artifact: every cleaned row survives,
//! widened with calendar parts, revenue metrics, and categorical flags. It
//! is never loaded into the target store.

use chrono::Datelike;
use polars::prelude::*;
use tracing::debug;

use crate::error::Result;
use crate::utils;

/// Cost assumed at 60% of gross revenue when estimating margin.
const MARGIN_COST_RATIO: f64 = 0.6;

/// Bucket a sale by its total value.
fn sale_bucket(total: f64) -> &'static str {
    if total < 100.0 {
        "Small"
    } else if total < 500.0 {
        "Medium"
    } else if total < 1000.0 {
        "Large"
    } else {
        "Premium"
    }
}

pub struct Deriver;

impl Deriver {
    /// Append the derived columns to a cleaned batch. No row reduction.
    ///
    /// Expects the Cleaner's invariants: `fecha` as canonical ISO strings,
    /// `cantidad` Int64, money columns Float64.
    pub fn derive(df: &DataFrame) -> Result<DataFrame> {
        let height = df.height();
        let fecha = df.column("fecha")?.as_materialized_series().str()?;
        let cantidad = df.column("cantidad")?.as_materialized_series().i64()?;
        let precio = df
            .column("precio_unitario")?
            .as_materialized_series()
            .f64()?;
        let descuento = df.column("descuento")?.as_materialized_series().f64()?;
        let total = df.column("total_venta")?.as_materialized_series().f64()?;

        let totals: Vec<f64> = total.into_iter().flatten().collect();
        let median = utils::median(&totals).unwrap_or(0.0);

        let mut years: Vec<Option<i32>> = Vec::with_capacity(height);
        let mut months: Vec<Option<i32>> = Vec::with_capacity(height);
        let mut days: Vec<Option<i32>> = Vec::with_capacity(height);
        let mut weekdays: Vec<Option<i32>> = Vec::with_capacity(height);
        let mut weekday_names: Vec<Option<String>> = Vec::with_capacity(height);
        let mut quarters: Vec<Option<i32>> = Vec::with_capacity(height);
        let mut gross_revenues: Vec<Option<f64>> = Vec::with_capacity(height);
        let mut discount_amounts: Vec<Option<f64>> = Vec::with_capacity(height);
        let mut margins: Vec<Option<f64>> = Vec::with_capacity(height);
        let mut sale_buckets: Vec<Option<&'static str>> = Vec::with_capacity(height);
        let mut has_discounts: Vec<Option<bool>> = Vec::with_capacity(height);
        let mut above_medians: Vec<Option<bool>> = Vec::with_capacity(height);

        for i in 0..height {
            let date = fecha.get(i).and_then(utils::parse_date);
            years.push(date.map(|d| d.year()));
            months.push(date.map(|d| d.month() as i32));
            days.push(date.map(|d| d.day() as i32));
            // weekday 0 = Monday
            weekdays.push(date.map(|d| d.weekday().num_days_from_monday() as i32));
            weekday_names.push(date.map(|d| d.format("%A").to_string()));
            quarters.push(date.map(|d| (d.month0() / 3 + 1) as i32));

            let quantity = cantidad.get(i).map(|v| v as f64);
            let gross = quantity.zip(precio.get(i)).map(|(q, p)| q * p);
            gross_revenues.push(gross);
            discount_amounts.push(gross.zip(descuento.get(i)).map(|(g, d)| g * d));
            margins.push(
                total
                    .get(i)
                    .zip(gross)
                    .map(|(t, g)| t - MARGIN_COST_RATIO * g),
            );
            sale_buckets.push(total.get(i).map(sale_bucket));
            has_discounts.push(descuento.get(i).map(|d| d > 0.0));
            above_medians.push(total.get(i).map(|t| t > median));
        }

        let mut derived = df.clone();
        derived.with_column(Series::new("year".into(), years))?;
        derived.with_column(Series::new("month".into(), months))?;
        derived.with_column(Series::new("day".into(), days))?;
        derived.with_column(Series::new("weekday".into(), weekdays))?;
        derived.with_column(Series::new("weekday_name".into(), weekday_names))?;
        derived.with_column(Series::new("quarter".into(), quarters))?;
        derived.with_column(Series::new("gross_revenue".into(), gross_revenues))?;
        derived.with_column(Series::new("discount_amount".into(), discount_amounts))?;
        derived.with_column(Series::new("margin".into(), margins))?;
        derived.with_column(Series::new("sale_bucket".into(), sale_buckets))?;
        derived.with_column(Series::new("has_discount".into(), has_discounts))?;
        derived.with_column(Series::new("above_median".into(), above_medians))?;

        debug!(
            "derived {} columns over {} rows",
            derived.width() - df.width(),
            height
        );
        Ok(derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaned_df() -> DataFrame {
        df![
            "id" => [1i64, 2, 3],
            "fecha" => ["2024-01-01", "2024-05-15", "2024-11-30"],
            "producto" => ["Laptop", "Mouse", "Teclado"],
            "categoria" => ["Tecnologia", "Accesorios", "Accesorios"],
            "region" => ["Norte", "Sur", "Norte"],
            "cantidad" => [2i64, 4, 1],
            "precio_unitario" => [1000.0, 25.0, 75.0],
            "descuento" => [0.1, 0.0, 0.2],
            "total_venta" => [1800.0, 100.0, 60.0],
        ]
        .unwrap()
    }

    fn f64_at(df: &DataFrame, name: &str, idx: usize) -> f64 {
        df.column(name)
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .get(idx)
            .unwrap()
    }

    fn i32_at(df: &DataFrame, name: &str, idx: usize) -> i32 {
        df.column(name)
            .unwrap()
            .as_materialized_series()
            .i32()
            .unwrap()
            .get(idx)
            .unwrap()
    }

    #[test]
    fn test_no_row_reduction_and_new_columns() {
        let derived = Deriver::derive(&cleaned_df()).unwrap();
        assert_eq!(derived.height(), 3);
        assert_eq!(derived.width(), 9 + 12);
    }

    #[test]
    fn test_calendar_parts() {
        let derived = Deriver::derive(&cleaned_df()).unwrap();
        // 2024-01-01 was a Monday
        assert_eq!(i32_at(&derived, "year", 0), 2024);
        assert_eq!(i32_at(&derived, "month", 0), 1);
        assert_eq!(i32_at(&derived, "day", 0), 1);
        assert_eq!(i32_at(&derived, "weekday", 0), 0);
        assert_eq!(i32_at(&derived, "quarter", 0), 1);
        let name = derived
            .column("weekday_name")
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .get(0)
            .map(str::to_string);
        assert_eq!(name.as_deref(), Some("Monday"));

        // 2024-05-15 falls in Q2, 2024-11-30 in Q4
        assert_eq!(i32_at(&derived, "quarter", 1), 2);
        assert_eq!(i32_at(&derived, "quarter", 2), 4);
    }

    #[test]
    fn test_revenue_metrics() {
        let derived = Deriver::derive(&cleaned_df()).unwrap();
        // row 0: 2 x 1000 = 2000 gross, 10% discount = 200,
        // margin = 1800 - 0.6 * 2000 = 600
        assert!((f64_at(&derived, "gross_revenue", 0) - 2000.0).abs() < 1e-9);
        assert!((f64_at(&derived, "discount_amount", 0) - 200.0).abs() < 1e-9);
        assert!((f64_at(&derived, "margin", 0) - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_buckets_and_flags() {
        let derived = Deriver::derive(&cleaned_df()).unwrap();
        let buckets: Vec<Option<String>> = derived
            .column("sale_bucket")
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .into_iter()
            .map(|opt| opt.map(str::to_string))
            .collect();
        assert_eq!(buckets[0].as_deref(), Some("Premium"));
        assert_eq!(buckets[1].as_deref(), Some("Medium"));
        assert_eq!(buckets[2].as_deref(), Some("Small"));

        let has_discount = derived
            .column("has_discount")
            .unwrap()
            .as_materialized_series()
            .bool()
            .unwrap()
            .into_iter()
            .collect::<Vec<_>>();
        assert_eq!(has_discount, vec![Some(true), Some(false), Some(true)]);

        // median of {1800, 100, 60} is 100; only 1800 is strictly above
        let above = derived
            .column("above_median")
            .unwrap()
            .as_materialized_series()
            .bool()
            .unwrap()
            .into_iter()
            .collect::<Vec<_>>();
        assert_eq!(above, vec![Some(true), Some(false), Some(false)]);
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(sale_bucket(99.99), "Small");
        assert_eq!(sale_bucket(100.0), "Medium");
        assert_eq!(sale_bucket(499.99), "Medium");
        assert_eq!(sale_bucket(500.0), "Large");
        assert_eq!(sale_bucket(999.99), "Large");
        assert_eq!(sale_bucket(1000.0), "Premium");
    }
}
