//! CSV artifact exchange between stages.
//!
//! Each stage fully materializes its output file before the next stage
//! starts; the artifact on disk is the only hand-off between them.

use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::info;

use crate::error::Result;

/// Read a stage artifact written by the previous stage.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    info!(
        "artifact loaded from {}: {} rows, {} columns",
        path.display(),
        df.height(),
        df.width()
    );
    Ok(df)
}

/// Write a stage artifact, creating the parent directory if needed.
pub fn write_csv(path: &Path, df: &mut DataFrame) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)?;

    let size_kb = std::fs::metadata(path)?.len() as f64 / 1024.0;
    info!("artifact written to {} ({size_kb:.2} KB)", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("artifact.csv");

        let mut df = df![
            "fecha" => ["2024-01-01", "2024-01-02"],
            "total_venta" => [100.5, 200.0],
        ]
        .unwrap();
        write_csv(&path, &mut df).unwrap();

        let loaded = read_csv(&path).unwrap();
        assert_eq!(loaded.height(), 2);
        assert_eq!(loaded.width(), 2);
        let totals = loaded
            .column("total_venta")
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .sum::<f64>();
        assert!((totals - 300.5).abs() < 1e-9);
    }

    #[test]
    fn test_read_missing_file_errors() {
        assert!(read_csv(Path::new("/nonexistent/etl/artifact.csv")).is_err());
    }
}
