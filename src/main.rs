//! Telematics Proof Submitter
//!
//! Reads a telematics CSV, proves each reading against the speed-threshold
//! circuit and submits commitment and proof to the insurance oracle contract.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use telematics_prover::config::Config;
use telematics_prover::input_builder::ProofInputBuilder;
use telematics_prover::{ingest, risk, SubmissionCoordinator};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "prover.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prove and submit every reading in a CSV file
    Run {
        #[arg(default_value = "telematics.csv")]
        csv: PathBuf,
    },

    /// Print reading count, average speed and risk bands without proving
    Summary {
        #[arg(default_value = "telematics.csv")]
        csv: PathBuf,
    },

    /// Print the circuit input for one reading
    InspectInput {
        csv: PathBuf,

        #[arg(short, long, default_value_t = 0)]
        index: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load config file {}: {}. Using environment variables.", args.config, e);
            Config::from_env().context("Failed to load configuration from environment variables")?
        }
    };

    match args.command {
        Command::Run { csv } => run(&config, &csv).await,
        Command::Summary { csv } => summary(&csv),
        Command::InspectInput { csv, index } => inspect_input(&config, &csv, index),
    }
}

async fn run(config: &Config, csv: &Path) -> Result<()> {
    let readings = ingest::read_readings(csv)?;
    let mut coordinator = SubmissionCoordinator::from_config(config)?;

    info!(
        "Submitting to {} as {} ({})",
        config.contract_address, config.signer_address, config.proof_system
    );

    match coordinator.process_batch(&readings).await {
        Ok(report) => {
            info!("Batch complete: {}/{} readings submitted", report.submitted(), report.total);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!(
                "Fully submitted {} of {} readings; failed at index {} (timestamp {}, {})",
                e.report.submitted(),
                readings.len(),
                e.index,
                e.timestamp,
                format_timestamp(e.timestamp)
            );
            println!("{}", serde_json::to_string_pretty(&e.report)?);
            Err(e.into())
        }
    }
}

fn summary(csv: &Path) -> Result<()> {
    let readings = ingest::read_readings(csv)?;

    let mut bands = [0usize; 3];
    for reading in &readings {
        match risk::score(reading) {
            100 => bands[0] += 1,
            90 => bands[1] += 1,
            _ => bands[2] += 1,
        }
    }

    println!("Readings: {}", readings.len());
    match ingest::average_speed(&readings) {
        Some(avg) => println!("Average speed: {:.2} km/h", avg),
        None => println!("Average speed: n/a"),
    }
    if let (Some(first), Some(last)) = (readings.first(), readings.last()) {
        println!(
            "Span: {} .. {}",
            format_timestamp(first.timestamp),
            format_timestamp(last.timestamp)
        );
    }
    println!("Risk 100: {}  Risk 90: {}  Risk 80: {}", bands[0], bands[1], bands[2]);

    Ok(())
}

fn inspect_input(config: &Config, csv: &Path, index: usize) -> Result<()> {
    let readings = ingest::read_readings(csv)?;
    let reading = readings
        .get(index)
        .with_context(|| format!("No reading at index {} ({} loaded)", index, readings.len()))?;

    let builder = ProofInputBuilder::new(config.speed_limit_fixed)?;
    let input = builder.build(reading)?;
    println!("{}", serde_json::to_string_pretty(&input)?);

    Ok(())
}

fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "out of range".to_string())
}
