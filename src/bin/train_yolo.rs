//! YOLOv8 fracture detector training
//!
//! Runs the Ultralytics trainer on the HBFMID dataset and exports the best
//! weights to ONNX for `predict_yolo`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use fracture_ml::detection::{train_yolo_model, DetectorTrainConfig, TrainOutcome};
use fracture_ml::utils::logging::{init_logging, LogConfig};

#[derive(Parser, Debug)]
#[command(name = "train_yolo")]
#[command(version)]
#[command(about = "Train a YOLOv8 bone fracture detector", long_about = None)]
struct Cli {
    /// JSON file with training arguments; missing keys use the defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dataset YAML
    #[arg(long)]
    data: Option<PathBuf>,

    /// Number of training epochs
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    let mut config = match &cli.config {
        Some(path) => DetectorTrainConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DetectorTrainConfig::default(),
    };
    if let Some(data) = cli.data {
        config.data = data;
    }
    if let Some(epochs) = cli.epochs {
        config.epochs = epochs;
    }

    match train_yolo_model(&config) {
        TrainOutcome::Completed(summary) => {
            tracing::info!("Run directory: {}", summary.run_dir.display());
        }
        TrainOutcome::DatasetMissing(_) | TrainOutcome::Failed(_) => {}
    }

    Ok(())
}
