//! NDVI pipeline CLI.
//!
//! Computes the mean NDVI over a bounding box for a date or date range and
//! prints the report as JSON on stdout. Logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use modis_common::{BoundingBox, DateSpec};
use ndvi_pipeline::{LocatorStrategy, NdviPipeline, PipelineConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "ndvi-pipeline")]
#[command(about = "Mean MODIS NDVI over a bounding box")]
struct Args {
    /// YAML configuration file (defaults to MOD13Q1 v061 settings)
    #[arg(short, long, env = "NDVI_CONFIG")]
    config: Option<PathBuf>,

    /// Bounding box as min_lon,min_lat,max_lon,max_lat
    #[arg(long, allow_hyphen_values = true)]
    bbox: String,

    /// Date (YYYY-MM-DD) or inclusive range (YYYY-MM-DD/YYYY-MM-DD)
    #[arg(long)]
    date: String,

    /// Granule locator: search or template
    #[arg(long)]
    strategy: Option<LocatorStrategy>,

    /// Directory for downloaded granules
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Earthdata bearer token
    #[arg(long, env = "EARTHDATA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Maximum granules processed at once
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Fail when no valid pixel covers the box
    #[arg(long)]
    require_value: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let bbox = BoundingBox::from_param(&args.bbox).context("Invalid --bbox")?;
    let dates = DateSpec::parse(&args.date).context("Invalid --date")?;

    let config = load_config(&args)?;
    let reader = config
        .pipeline
        .reader
        .build()
        .context("No granule reader available")?;
    let pipeline = NdviPipeline::from_config(&config, reader).context("Failed to build pipeline")?;

    info!(bbox = %bbox.to_param(), date = %args.date, "Starting NDVI query");

    let report = pipeline
        .compute_mean_ndvi(&bbox, &dates)
        .await
        .context("NDVI query failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.require_value {
        report.require_value().context("No NDVI value for the requested area")?;
    }

    Ok(())
}

/// File (or defaults) with command-line overrides applied.
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(strategy) = args.strategy {
        config.locator.strategy = strategy;
    }
    if let Some(dir) = &args.output_dir {
        config.download.client.output_dir = dir.clone();
    }
    if let Some(token) = args.token.as_deref().filter(|t| !t.trim().is_empty()) {
        config.download.client.token = Some(token.to_string());
    }
    if let Some(max) = args.max_concurrent {
        config.pipeline.max_concurrent = max;
    }

    config.validate().context("Invalid configuration after command-line overrides")?;
    Ok(config)
}
