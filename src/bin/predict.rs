//! Console fracture prediction
//!
//! Prints the predicted class with its confidence and saves a chart of the
//! class probabilities next to a copy of the input image.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use fracture_ml::backend::{default_device, DefaultBackend};
use fracture_ml::inference::predict_fracture;
use fracture_ml::inference::predictor::DEFAULT_OUTPUT_DIR;
use fracture_ml::model::config::DEFAULT_MODEL_PATH;
use fracture_ml::model::ResNetArch;
use fracture_ml::utils::logging::{init_logging, LogConfig};

/// Classify an X-ray as fractured or not fractured
#[derive(Parser, Debug)]
#[command(name = "predict")]
#[command(version)]
#[command(about = "Predict whether an X-ray shows a fracture", long_about = None)]
struct Cli {
    /// Path to the X-ray image
    image_path: PathBuf,

    /// Path to the trained checkpoint
    #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
    model: PathBuf,

    /// Architecture the checkpoint was trained with
    #[arg(long, default_value = "resnet50")]
    arch: ResNetArch,

    /// Directory for the prediction chart
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

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

    let device = default_device();
    let report = predict_fracture::<DefaultBackend>(
        &cli.image_path,
        &cli.model,
        cli.arch,
        &cli.output_dir,
        &device,
    )?;

    let label = if report.result.predicted_index == 0 {
        report.result.prediction.red().bold()
    } else {
        report.result.prediction.green().bold()
    };
    println!("{} {}", "Result:".cyan(), label);

    Ok(())
}
