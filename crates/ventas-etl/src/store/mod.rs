//! SQLite-backed store for source reads, target writes, backups, and
//! statistics.
//!
//! All SQL lives here. Raw source reads surface every column as a
//! string-typed series: type coercibility is the schema validator's job, so
//! a junk value in a numeric column must become a reported check failure,
//! never a crash inside the store.

use chrono::Utc;
use polars::prelude::*;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, params};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{EtlError, Result};
use crate::types::{LoadStatistics, RankedTotal};

/// Connection wrapper owning every query the pipeline issues.
pub struct SalesStore {
    conn: Connection,
}

impl SalesStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("store opened at {}", path.display());
        Ok(Self { conn })
    }

    /// In-memory store, used by tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Run a batch of semicolon-separated statements.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Read a whole table into a DataFrame of string-typed columns.
    ///
    /// `since` adds an inclusive lower bound on `fecha`; `limit` caps the
    /// row count. Both are pass-through filters for partial runs and are
    /// unused by the default pipeline.
    pub fn fetch_table(
        &self,
        table: &str,
        since: Option<&str>,
        limit: Option<usize>,
    ) -> Result<DataFrame> {
        ensure_identifier(table)?;
        let mut query = format!("SELECT * FROM {table}");
        if since.is_some() {
            query.push_str(" WHERE fecha >= ?1");
        }
        if let Some(n) = limit {
            query.push_str(&format!(" LIMIT {n}"));
        }
        debug!("running query: {query}");

        let mut stmt = self.conn.prepare(&query)?;
        let column_names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let mut buffers: Vec<Vec<Option<String>>> = vec![Vec::new(); column_names.len()];

        let mut rows = match since {
            Some(bound) => stmt.query(params![bound])?,
            None => stmt.query([])?,
        };
        while let Some(row) = rows.next()? {
            for (idx, buffer) in buffers.iter_mut().enumerate() {
                buffer.push(value_to_string(row.get_ref(idx)?));
            }
        }

        let columns: Vec<Column> = column_names
            .iter()
            .zip(buffers)
            .map(|(name, values)| Series::new(name.as_str().into(), values).into_column())
            .collect();
        Ok(DataFrame::new(columns)?)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
        Ok(stmt.exists(params![table])?)
    }

    pub fn count_rows(&self, table: &str) -> Result<i64> {
        ensure_identifier(table)?;
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    /// Copy `table` verbatim into `<table>_backup_<stamp>` and return the
    /// backup's name. Backups are append-only; nothing here prunes them.
    pub fn backup_table(&self, table: &str, stamp: &str) -> Result<String> {
        ensure_identifier(table)?;
        let backup = format!("{table}_backup_{stamp}");
        ensure_identifier(&backup)?;
        self.conn.execute(
            &format!("CREATE TABLE {backup} AS SELECT * FROM {table}"),
            [],
        )?;
        info!("backup created: {backup}");
        Ok(backup)
    }

    /// Replace the target table's full contents with the prepared batch.
    ///
    /// Drop, create, and all inserts run inside one transaction, so a
    /// concurrent reader never observes a half-written table. The store
    /// assigns the surrogate key and stamps every row with `loaded_at`.
    pub fn replace_table(
        &mut self,
        table: &str,
        df: &DataFrame,
        loaded_at: &str,
    ) -> Result<usize> {
        ensure_identifier(table)?;

        let fecha = df.column("fecha")?.as_materialized_series().str()?;
        let producto = df.column("producto")?.as_materialized_series().str()?;
        let categoria = df.column("categoria")?.as_materialized_series().str()?;
        let region = df.column("region")?.as_materialized_series().str()?;
        let cantidad_total = df.column("cantidad_total")?.as_materialized_series().i64()?;
        let precio_promedio = df
            .column("precio_promedio")?
            .as_materialized_series()
            .f64()?;
        let descuento_promedio = match df.column("descuento_promedio") {
            Ok(column) => Some(column.as_materialized_series().f64()?),
            Err(_) => None,
        };
        let total_venta = df.column("total_venta")?.as_materialized_series().f64()?;
        let num_transacciones = df
            .column("num_transacciones")?
            .as_materialized_series()
            .i64()?;

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
             CREATE TABLE {table} (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 fecha TEXT NOT NULL,
                 producto TEXT NOT NULL,
                 categoria TEXT,
                 region TEXT,
                 cantidad_total INTEGER,
                 precio_promedio REAL,
                 descuento_promedio REAL,
                 total_venta REAL NOT NULL,
                 num_transacciones INTEGER,
                 loaded_at TEXT NOT NULL
             );"
        ))?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {table} (fecha, producto, categoria, region, cantidad_total, \
                 precio_promedio, descuento_promedio, total_venta, num_transacciones, loaded_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ))?;
            for i in 0..df.height() {
                insert.execute(params![
                    fecha.get(i),
                    producto.get(i),
                    categoria.get(i),
                    region.get(i),
                    cantidad_total.get(i),
                    precio_promedio.get(i),
                    descuento_promedio.and_then(|ca| ca.get(i)),
                    total_venta.get(i),
                    num_transacciones.get(i),
                    loaded_at,
                ])?;
            }
        }
        tx.commit()?;

        let total = self.count_rows(table)?;
        info!("{total} records in {table} after replace");
        Ok(df.height())
    }

    /// Create the secondary indexes used by downstream queries.
    pub fn create_indexes(&self, table: &str) -> Result<()> {
        ensure_identifier(table)?;
        for column in ["fecha", "producto", "categoria", "region"] {
            self.conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column})"
                ),
                [],
            )?;
        }
        debug!("indexes ready on {table}");
        Ok(())
    }

    /// Compute summary statistics from the committed target table.
    pub fn load_statistics(&self, table: &str) -> Result<LoadStatistics> {
        ensure_identifier(table)?;
        let (total_records, total_sales, date_min, date_max) = self.conn.query_row(
            &format!("SELECT COUNT(*), SUM(total_venta), MIN(fecha), MAX(fecha) FROM {table}"),
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )?;

        Ok(LoadStatistics {
            total_records,
            total_sales: total_sales.unwrap_or(0.0),
            date_min,
            date_max,
            top_products: self.top_totals(table, "producto")?,
            top_regions: self.top_totals(table, "region")?,
            load_timestamp: Utc::now().to_rfc3339(),
        })
    }

    fn top_totals(&self, table: &str, column: &str) -> Result<Vec<RankedTotal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {column}, SUM(total_venta) AS total FROM {table} \
             GROUP BY {column} ORDER BY total DESC LIMIT 5"
        ))?;
        let mut rows = stmt.query([])?;
        let mut totals = Vec::new();
        while let Some(row) = rows.next()? {
            let name: Option<String> = row.get(0)?;
            let total: Option<f64> = row.get(1)?;
            totals.push(RankedTotal {
                name: name.unwrap_or_default(),
                total: total.unwrap_or(0.0),
            });
        }
        Ok(totals)
    }
}

/// SQLite identifiers cannot be bound as parameters, so anything
/// interpolated into SQL must pass this gate first.
fn ensure_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(EtlError::Config(format!(
            "invalid table identifier: {name:?}"
        )))
    }
}

fn value_to_string(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(r) => Some(r.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        // Blobs have no tabular meaning here; treat them as missing.
        ValueRef::Blob(_) => None,
    }
}
