//! Grouped rollup of the cleaned batch.
//!
//! Grouping is exact-match on (fecha, producto, categoria, region) after
//! the Cleaner's normalization. The fold is order-independent (sums and
//! means), the `BTreeMap` makes the output order deterministic, and
//! rounding happens once after the reduction, never per row.

use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::info;

use crate::error::Result;
use crate::utils;

#[derive(Default)]
struct GroupAccum {
    cantidad: i64,
    precio_sum: f64,
    precio_count: usize,
    descuento_sum: f64,
    descuento_count: usize,
    total_sum: f64,
    rows: i64,
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

pub struct Aggregator;

impl Aggregator {
    /// Roll the cleaned batch up by (fecha, producto, categoria, region).
    ///
    /// A null categoria or region groups under the empty string: rows are
    /// never silently dropped from the rollup, which keeps the total_venta
    /// sums of the cleaned and aggregated batches equal.
    pub fn aggregate(df: &DataFrame) -> Result<DataFrame> {
        let fecha = df.column("fecha")?.as_materialized_series().str()?;
        let producto = df.column("producto")?.as_materialized_series().str()?;
        let categoria = df.column("categoria")?.as_materialized_series().str()?;
        let region = df.column("region")?.as_materialized_series().str()?;
        let cantidad = df.column("cantidad")?.as_materialized_series().i64()?;
        let precio = df
            .column("precio_unitario")?
            .as_materialized_series()
            .f64()?;
        let descuento = df.column("descuento")?.as_materialized_series().f64()?;
        let total = df.column("total_venta")?.as_materialized_series().f64()?;

        let mut groups: BTreeMap<(String, String, String, String), GroupAccum> = BTreeMap::new();
        for i in 0..df.height() {
            let key = (
                fecha.get(i).unwrap_or("").to_string(),
                producto.get(i).unwrap_or("").to_string(),
                categoria.get(i).unwrap_or("").to_string(),
                region.get(i).unwrap_or("").to_string(),
            );
            let entry = groups.entry(key).or_default();
            if let Some(quantity) = cantidad.get(i) {
                entry.cantidad += quantity;
            }
            if let Some(price) = precio.get(i) {
                entry.precio_sum += price;
                entry.precio_count += 1;
            }
            if let Some(discount) = descuento.get(i) {
                entry.descuento_sum += discount;
                entry.descuento_count += 1;
            }
            if let Some(sale) = total.get(i) {
                entry.total_sum += sale;
            }
            entry.rows += 1;
        }

        let mut fechas = Vec::with_capacity(groups.len());
        let mut productos = Vec::with_capacity(groups.len());
        let mut categorias = Vec::with_capacity(groups.len());
        let mut regiones = Vec::with_capacity(groups.len());
        let mut cantidades: Vec<i64> = Vec::with_capacity(groups.len());
        let mut precios: Vec<f64> = Vec::with_capacity(groups.len());
        let mut descuentos: Vec<f64> = Vec::with_capacity(groups.len());
        let mut totales: Vec<f64> = Vec::with_capacity(groups.len());
        let mut transacciones: Vec<i64> = Vec::with_capacity(groups.len());

        for ((f, p, c, r), accum) in &groups {
            fechas.push(f.clone());
            productos.push(p.clone());
            categorias.push(c.clone());
            regiones.push(r.clone());
            cantidades.push(accum.cantidad);
            precios.push(utils::round_to(mean(accum.precio_sum, accum.precio_count), 2));
            descuentos.push(utils::round_to(
                mean(accum.descuento_sum, accum.descuento_count),
                4,
            ));
            totales.push(utils::round_to(accum.total_sum, 2));
            transacciones.push(accum.rows);
        }

        let aggregated = df![
            "fecha" => fechas,
            "producto" => productos,
            "categoria" => categorias,
            "region" => regiones,
            "cantidad_total" => cantidades,
            "precio_promedio" => precios,
            "descuento_promedio" => descuentos,
            "total_venta" => totales,
            "num_transacciones" => transacciones,
        ]?;

        info!(
            "aggregated {} rows into {} groups ({:.2}% reduction)",
            df.height(),
            aggregated.height(),
            if df.height() == 0 {
                0.0
            } else {
                (1.0 - aggregated.height() as f64 / df.height() as f64) * 100.0
            }
        );
        Ok(aggregated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaned_df() -> DataFrame {
        // rows 0 and 1 share the full grouping key
        df![
            "id" => [1i64, 2, 3],
            "fecha" => ["2024-01-01", "2024-01-01", "2024-01-02"],
            "producto" => ["Laptop", "Laptop", "Mouse"],
            "categoria" => ["Tecnologia", "Tecnologia", "Accesorios"],
            "region" => ["Norte", "Norte", "Sur"],
            "cantidad" => [1i64, 2, 4],
            "precio_unitario" => [1000.0, 900.0, 25.0],
            "descuento" => [0.0, 0.1, 0.05],
            "total_venta" => [1000.0, 1620.0, 95.0],
        ]
        .unwrap()
    }

    fn f64_col(df: &DataFrame, name: &str) -> Vec<f64> {
        df.column(name)
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect()
    }

    fn i64_col(df: &DataFrame, name: &str) -> Vec<i64> {
        df.column(name)
            .unwrap()
            .as_materialized_series()
            .i64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect()
    }

    #[test]
    fn test_shared_key_collapses_into_one_group() {
        let aggregated = Aggregator::aggregate(&cleaned_df()).unwrap();
        assert_eq!(aggregated.height(), 2);

        // BTreeMap order: 2024-01-01/Laptop first
        assert_eq!(i64_col(&aggregated, "num_transacciones"), vec![2, 1]);
        assert_eq!(i64_col(&aggregated, "cantidad_total"), vec![3, 4]);
        let precios = f64_col(&aggregated, "precio_promedio");
        assert!((precios[0] - 950.0).abs() < 1e-9);
        let descuentos = f64_col(&aggregated, "descuento_promedio");
        assert!((descuentos[0] - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_sum_preservation() {
        let cleaned = cleaned_df();
        let aggregated = Aggregator::aggregate(&cleaned).unwrap();

        let cleaned_sum: f64 = f64_col(&cleaned, "total_venta").iter().sum();
        let aggregated_sum: f64 = f64_col(&aggregated, "total_venta").iter().sum();
        let tolerance = 0.01 * aggregated.height() as f64;
        assert!((cleaned_sum - aggregated_sum).abs() <= tolerance);
    }

    #[test]
    fn test_rounding_applied_after_reduction() {
        let df = df![
            "id" => [1i64, 2, 3],
            "fecha" => ["2024-01-01", "2024-01-01", "2024-01-01"],
            "producto" => ["Laptop", "Laptop", "Laptop"],
            "categoria" => ["Tec", "Tec", "Tec"],
            "region" => ["Norte", "Norte", "Norte"],
            "cantidad" => [1i64, 1, 1],
            "precio_unitario" => [10.0, 10.0, 11.0],
            "descuento" => [0.1, 0.1, 0.2],
            "total_venta" => [10.111, 10.111, 10.111],
        ]
        .unwrap();
        let aggregated = Aggregator::aggregate(&df).unwrap();
        assert_eq!(aggregated.height(), 1);

        // mean(10, 10, 11) = 10.333... -> 10.33
        assert!((f64_col(&aggregated, "precio_promedio")[0] - 10.33).abs() < 1e-9);
        // mean(0.1, 0.1, 0.2) = 0.13333... -> 0.1333
        assert!((f64_col(&aggregated, "descuento_promedio")[0] - 0.1333).abs() < 1e-9);
        // sum rounded once: 30.333 -> 30.33, not 3 x 10.11
        assert!((f64_col(&aggregated, "total_venta")[0] - 30.33).abs() < 1e-9);
    }

    #[test]
    fn test_null_key_fields_group_under_empty_string() {
        let df = df![
            "id" => [1i64, 2],
            "fecha" => ["2024-01-01", "2024-01-01"],
            "producto" => ["Laptop", "Laptop"],
            "categoria" => [None::<&str>, None::<&str>],
            "region" => ["Norte", "Norte"],
            "cantidad" => [1i64, 1],
            "precio_unitario" => [10.0, 10.0],
            "descuento" => [0.0, 0.0],
            "total_venta" => [10.0, 10.0],
        ]
        .unwrap();
        let aggregated = Aggregator::aggregate(&df).unwrap();
        assert_eq!(aggregated.height(), 1);
        assert_eq!(i64_col(&aggregated, "num_transacciones"), vec![2]);
        // no row was lost to the null key
        assert!((f64_col(&aggregated, "total_venta")[0] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_batch_aggregates_to_empty() {
        let df = cleaned_df().head(Some(0));
        let aggregated = Aggregator::aggregate(&df).unwrap();
        assert_eq!(aggregated.height(), 0);
        assert_eq!(aggregated.width(), 9);
    }
}
