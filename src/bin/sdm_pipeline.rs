//! Spatial Durbin pipeline CLI

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use spatial_price::pipeline::{Pipeline, PipelineConfig};
use spatial_price::report::ReportWriter;

#[derive(Parser)]
#[command(name = "sdm_pipeline")]
#[command(about = "Spatial Durbin estimation of regional food prices")]
#[command(version)]
struct Cli {
    /// Run configuration (JSON with input paths and options)
    #[arg(short, long)]
    config: PathBuf,

    /// Directory for the CSV tables. Defaults to `output`.
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Override the commodity named in the configuration.
    #[arg(long)]
    commodity: Option<String>,

    /// Log filter when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = PipelineConfig::from_path(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(commodity) = cli.commodity {
        config.options.commodity = commodity;
    }

    let pipeline = Pipeline::from_config(&config).context("invalid configuration")?;
    let report = pipeline
        .run(&config.inputs)
        .with_context(|| format!("pipeline failed for {}", config.options.commodity))?;

    let writer = ReportWriter::new(&cli.output)?;
    let files = writer.write_all(&report)?;

    let model = &report.model;
    println!(
        "{}: {} fit on {} locations x {} periods, rho = {:.4} (p = {:.4}), pseudo R2 = {:.4}",
        report.commodity,
        model.method(),
        model.n_locations(),
        model.n_periods(),
        model.rho(),
        model.rho_p_value(),
        model.pseudo_r_squared(),
    );
    if let Some(lm) = &report.lm_tests {
        println!("LM recommendation: {}", lm.recommendation);
    }
    println!("{} tables written to {}", files.len(), writer.dir().display());
    Ok(())
}
