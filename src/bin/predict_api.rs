//! JSON fracture prediction for the web backend
//!
//! Writes exactly one JSON object to stdout. Errors are reported inside the
//! object, so the process exits successfully whenever arguments parse.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use fracture_ml::backend::{default_device, DefaultBackend};
use fracture_ml::inference::predict_fracture_json;
use fracture_ml::model::config::DEFAULT_MODEL_PATH;
use fracture_ml::model::ResNetArch;
use fracture_ml::utils::logging::{init_logging, LogConfig};

#[derive(Parser, Debug)]
#[command(name = "predict_api")]
#[command(version)]
#[command(about = "Classify an X-ray and print the result as JSON", long_about = None)]
struct Cli {
    /// Path to the X-ray image
    image_path: PathBuf,

    /// Path to the trained checkpoint
    #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
    model: PathBuf,

    /// Architecture the checkpoint was trained with
    #[arg(long, default_value = "resnet50")]
    arch: ResNetArch,

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

    let device = default_device();
    let response =
        predict_fracture_json::<DefaultBackend>(&cli.image_path, &cli.model, cli.arch, &device);
    println!("{}", serde_json::to_string(&response)?);

    Ok(())
}
