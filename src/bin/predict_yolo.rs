//! JSON fracture detection for the web backend
//!
//! Writes exactly one JSON object to stdout, including on failure.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use fracture_ml::detection::config::DEFAULT_DETECTOR_MODEL;
use fracture_ml::detection::{predict_fracture_yolo, DetectorPredictConfig};
use fracture_ml::utils::logging::{init_logging, LogConfig};

#[derive(Parser, Debug)]
#[command(name = "predict_yolo")]
#[command(version)]
#[command(about = "Detect fractures in an X-ray and print the result as JSON", long_about = None)]
struct Cli {
    /// Path to the X-ray image
    image_path: PathBuf,

    /// Exported ONNX detector
    #[arg(short, long, default_value = DEFAULT_DETECTOR_MODEL)]
    model: PathBuf,

    /// Minimum class confidence
    #[arg(long, default_value = "0.25")]
    conf: f32,

    /// IoU threshold for non-maximum suppression
    #[arg(long, default_value = "0.45")]
    iou: f32,

    /// Log debug output to stderr
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose().on_stderr()
    } else {
        LogConfig::quiet()
    };
    let _ = init_logging(&log_config);

    let config = DetectorPredictConfig {
        conf_threshold: cli.conf,
        iou_threshold: cli.iou,
        ..Default::default()
    };
    let response = predict_fracture_yolo(&cli.image_path, &cli.model, &config);
    println!("{}", serde_json::to_string(&response)?);

    Ok(())
}
