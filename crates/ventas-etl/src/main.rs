//! CLI entry point for the sales ETL pipeline.

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use tracing::info;

use ventas_etl::{
    EtlConfig, EtlPipeline, Extractor, Loader, PipelineRunReport, SalesStore, Transformer,
};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Batch ETL pipeline for sales data",
    long_about = "Extracts raw sales records from SQLite, cleans and aggregates them, and\n\
                  loads the rollup back into a target table with backup and indexes.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  DB_PATH            SQLite database path (default: data/database.db)\n  \
                  DB_TABLE_SOURCE    source table (default: sales_data)\n  \
                  DB_TABLE_TARGET    target table (default: sales_transformed)\n  \
                  DATA_OUTPUT_PATH   artifact directory (default: data/output)\n\n\
                  EXAMPLES:\n  \
                  # Full run\n  \
                  ventas-etl run\n\n  \
                  # Stages individually, sharing artifacts on disk\n  \
                  ventas-etl extract && ventas-etl transform && ventas-etl load\n\n  \
                  # Machine-readable report\n  \
                  ventas-etl run --json | jq .load.total_records"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to the SQLite database
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Source table read by the extractor
    #[arg(long)]
    source_table: Option<String>,

    /// Target table replaced by the loader
    #[arg(long)]
    target_table: Option<String>,

    /// Directory for stage artifacts
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Inclusive lower bound on fecha (YYYY-MM-DD) for extraction
    #[arg(long)]
    since: Option<String>,

    /// Maximum number of rows to extract
    #[arg(long)]
    limit: Option<usize>,

    /// Multiplier for the IQR outlier fence
    #[arg(long, default_value = "3.0")]
    iqr_multiplier: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only warnings and errors)
    #[arg(short, long)]
    quiet: bool,

    /// Print the final report as JSON to stdout (disables logging)
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run extract, transform, and load in sequence
    Run,
    /// Extract and validate the source table into a CSV artifact
    Extract,
    /// Clean, derive, and aggregate the extraction artifact
    Transform,
    /// Validate and load the aggregated artifact into the target table
    Load,
}

/// Initialize the tracing subscriber.
///
/// When `json_output` is true, logging stays off entirely so stdout only
/// carries the JSON report.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<EtlConfig> {
    let env_config = EtlConfig::from_env();
    let mut builder = EtlConfig::builder()
        .db_path(args.db_path.as_ref().unwrap_or(&env_config.db_path))
        .source_table(
            args.source_table
                .clone()
                .unwrap_or(env_config.source_table),
        )
        .target_table(
            args.target_table
                .clone()
                .unwrap_or(env_config.target_table),
        )
        .output_dir(args.output.as_ref().unwrap_or(&env_config.output_dir))
        .iqr_multiplier(args.iqr_multiplier);
    if let Some(ref since) = args.since {
        builder = builder.since(since.clone());
    }
    if let Some(limit) = args.limit {
        builder = builder.row_limit(limit);
    }
    builder.build().map_err(|err| anyhow!(err))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.quiet, args.json);
    dotenv().ok();

    let config = build_config(&args)?;

    match args.command {
        Command::Run => {
            let report = EtlPipeline::new(config).run()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_run_report(&report);
            }
        }
        Command::Extract => {
            let store = SalesStore::open(&config.db_path)?;
            let output = Extractor::new(config).run(&store)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&output.summary)?);
            } else {
                println!("Extracted {} records to {}", output.summary.total_records, output.artifact_path.display());
            }
        }
        Command::Transform => {
            let output = Transformer::new(config).run()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&output.summary)?);
            } else {
                println!(
                    "Transformed {} records into {} rollup rows ({})",
                    output.summary.original_records,
                    output.summary.aggregated_records,
                    output.aggregated_path.display()
                );
            }
        }
        Command::Load => {
            let mut store = SalesStore::open(&config.db_path)?;
            let table = config.target_table.clone();
            let stats = Loader::new(config).run(&mut store)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Loaded {} records into {table}", stats.total_records);
            }
        }
    }

    info!("done");
    Ok(())
}

/// Human-readable banner for a full run; the default unless --json is set.
fn print_run_report(report: &PipelineRunReport) {
    println!();
    println!("{}", "=".repeat(80));
    println!("ETL PIPELINE COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!("Extraction:");
    println!("  Records: {}", report.extraction.total_records);
    println!(
        "  Dates: {} to {}",
        report.extraction.date_min.as_deref().unwrap_or("-"),
        report.extraction.date_max.as_deref().unwrap_or("-")
    );
    println!("  Null values: {}", report.extraction.null_values);
    println!();

    let cleaning = &report.transformation.cleaning;
    println!("Cleaning:");
    println!(
        "  Rows: {} -> {} ({} removed, {:.2}%)",
        cleaning.initial_rows,
        cleaning.final_rows,
        cleaning.rows_removed(),
        cleaning.removed_percentage()
    );
    println!("  Duplicates removed: {}", cleaning.duplicates_removed);
    println!("  Null rows removed: {}", cleaning.nulls_removed);
    println!(
        "  Invalid quantity/price removed: {}/{}",
        cleaning.invalid_quantity_removed, cleaning.invalid_price_removed
    );
    println!("  Outliers removed: {}", cleaning.outliers_removed);
    println!("  Discounts defaulted: {}", cleaning.discounts_filled);
    println!();

    println!("Aggregation:");
    println!(
        "  {} cleaned rows -> {} rollup rows ({:.2}% reduction)",
        report.transformation.cleaned_records,
        report.transformation.aggregated_records,
        report.transformation.reduction_percentage
    );
    println!();

    println!("Load:");
    println!("  Records: {}", report.load.total_records);
    println!("  Total sales: ${:.2}", report.load.total_sales);
    println!(
        "  Dates: {} to {}",
        report.load.date_min.as_deref().unwrap_or("-"),
        report.load.date_max.as_deref().unwrap_or("-")
    );
    if !report.load.top_products.is_empty() {
        println!("  Top products:");
        for (rank, product) in report.load.top_products.iter().enumerate() {
            println!("    {}. {}: ${:.2}", rank + 1, product.name, product.total);
        }
    }
    if !report.load.top_regions.is_empty() {
        println!("  Top regions:");
        for (rank, region) in report.load.top_regions.iter().enumerate() {
            println!("    {}. {}: ${:.2}", rank + 1, region.name, region.total);
        }
    }
    println!("{}", "=".repeat(80));
}
