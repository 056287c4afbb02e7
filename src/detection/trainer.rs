//! YOLOv8 detector training through the Ultralytics CLI
//!
//! Training itself runs in the `yolo` subprocess. This module prepares the
//! command line, reports validation metrics from `results.csv` and exports
//! the best weights to ONNX for [`crate::detection::YoloDetector`].

use std::path::{Path, PathBuf};
use std::error::Error as _;
use std::time::Instant;

use colored::Colorize;
use tracing::{error, info, warn};

use crate::backend::backend_name;
use crate::detection::config::DetectorTrainConfig;
use crate::utils::error::{FractureError, Result};
use crate::utils::process::ToolCommand;
use crate::utils::{format_duration, format_metric};

/// Ultralytics command line entry point
pub const YOLO_PROGRAM: &str = "yolo";

/// Validation metrics from the last epoch of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationMetrics {
    pub map50: Option<f64>,
    pub map50_95: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
}

impl ValidationMetrics {
    pub fn print(&self) {
        println!("\n{}", "Validation Metrics:".cyan().bold());
        println!("  mAP50:     {}", format_metric(self.map50));
        println!("  mAP50-95:  {}", format_metric(self.map50_95));
        println!("  Precision: {}", format_metric(self.precision));
        println!("  Recall:    {}", format_metric(self.recall));
    }
}

/// Artifacts of a finished run
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub run_dir: PathBuf,
    pub best_weights: PathBuf,
    pub last_weights: PathBuf,
    pub onnx_model: Option<PathBuf>,
    pub metrics: ValidationMetrics,
}

/// Result of [`train_yolo_model`]
#[derive(Debug, Clone)]
pub enum TrainOutcome {
    Completed(TrainSummary),
    DatasetMissing(PathBuf),
    Failed(String),
}

impl TrainOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TrainOutcome::Completed(_))
    }
}

/// Read metrics from the last row of an Ultralytics `results.csv`
///
/// Ultralytics pads the header names with spaces, so headers are trimmed.
/// A missing file or column yields `None` for that metric.
pub fn read_results_csv(path: &Path) -> ValidationMetrics {
    let mut reader = match csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
    {
        Ok(reader) => reader,
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            return ValidationMetrics::default();
        }
    };

    let headers = match reader.headers() {
        Ok(h) => h.clone(),
        Err(_) => return ValidationMetrics::default(),
    };
    let last = match reader.records().filter_map(|r| r.ok()).last() {
        Some(record) => record,
        None => return ValidationMetrics::default(),
    };

    let column = |name: &str| -> Option<f64> {
        let idx = headers.iter().position(|h| h == name)?;
        last.get(idx)?.parse().ok()
    };

    ValidationMetrics {
        map50: column("metrics/mAP50(B)"),
        map50_95: column("metrics/mAP50-95(B)"),
        precision: column("metrics/precision(B)"),
        recall: column("metrics/recall(B)"),
    }
}

pub fn train_command(config: &DetectorTrainConfig) -> ToolCommand {
    ToolCommand::new(YOLO_PROGRAM)
        .args(["detect", "train"])
        .args(config.to_args())
}

pub fn export_command(weights: &Path) -> ToolCommand {
    ToolCommand::new(YOLO_PROGRAM).args([
        "export".to_string(),
        format!("model={}", weights.display()),
        "format=onnx".to_string(),
        "dynamic=True".to_string(),
        "simplify=True".to_string(),
    ])
}

fn print_system_info() {
    println!("{}", "System Information".cyan().bold());
    println!("  Started:  {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("  Backend:  {}", backend_name());

    match ToolCommand::new(YOLO_PROGRAM).arg("version").output() {
        Ok(version) => println!("  Ultralytics: {}", version),
        Err(e) => println!("  Ultralytics: {} ({})", "not available".yellow(), e),
    }

    let gpu = ToolCommand::new("nvidia-smi")
        .args(["--query-gpu=name,memory.total", "--format=csv,noheader"])
        .output();
    match gpu {
        Ok(line) if !line.is_empty() => println!("  GPU:      {}", line),
        _ => println!("  GPU:      none detected, training will run on CPU"),
    }
}

fn print_config(config: &DetectorTrainConfig) {
    println!("\n{}", "Training Configuration".cyan().bold());
    for arg in config.to_args() {
        if let Some((key, value)) = arg.split_once('=') {
            println!("  {:<16} {}", key, value);
        }
    }
}

fn print_next_steps(summary: &TrainSummary) {
    println!("\n{}", "Next steps:".cyan().bold());
    let model = summary
        .onnx_model
        .clone()
        .unwrap_or_else(|| summary.best_weights.with_extension("onnx"));
    println!("  1. Review training curves in {}", summary.run_dir.display());
    println!(
        "  2. Run detection: predict_yolo <image_path> --model {}",
        model.display()
    );
    println!("  3. Point the web backend at the exported ONNX model");
}

fn run_training(config: &DetectorTrainConfig) -> Result<TrainSummary> {
    let start = Instant::now();
    println!("\n{}", "Starting training...".green().bold());
    train_command(config).run()?;
    println!(
        "\n{} in {}",
        "Training completed".green().bold(),
        format_duration(start.elapsed().as_secs_f64())
    );

    let run_dir = config.run_dir();
    let best_weights = config.best_weights();
    let last_weights = config.last_weights();
    println!("  Best weights: {}", best_weights.display());
    println!("  Last weights: {}", last_weights.display());
    println!("  Results saved to: {}", run_dir.display());

    let metrics = read_results_csv(&run_dir.join("results.csv"));
    metrics.print();

    println!("\n{}", "Exporting best model to ONNX...".cyan());
    let onnx_model = match export_command(&best_weights).run() {
        Ok(()) => {
            let onnx = best_weights.with_extension("onnx");
            println!("  ONNX model: {}", onnx.display());
            Some(onnx)
        }
        Err(e) => {
            warn!("ONNX export failed: {}", e);
            println!("  {} ONNX export failed: {}", "Warning:".yellow(), e);
            None
        }
    };

    Ok(TrainSummary {
        run_dir,
        best_weights,
        last_weights,
        onnx_model,
        metrics,
    })
}

fn error_kind(e: &FractureError) -> &'static str {
    match e {
        FractureError::ExternalCommand { .. } => "ExternalCommand",
        FractureError::Io(_) => "Io",
        FractureError::PathNotFound(_) => "PathNotFound",
        FractureError::Config(_) => "Config",
        _ => "Other",
    }
}

/// Train a YOLOv8 detector and export it to ONNX
///
/// Failures are printed and logged, never propagated.
pub fn train_yolo_model(config: &DetectorTrainConfig) -> TrainOutcome {
    print_system_info();

    if !config.data.exists() {
        println!(
            "\n{} Dataset not found at {}",
            "Error:".red().bold(),
            config.data.display()
        );
        return TrainOutcome::DatasetMissing(config.data.clone());
    }

    print_config(config);
    info!("Training {} on {}", config.model, config.data.display());

    match run_training(config) {
        Ok(summary) => {
            print_next_steps(&summary);
            TrainOutcome::Completed(summary)
        }
        Err(e) => {
            println!("\n{} {}", "Training failed:".red().bold(), error_kind(&e));
            println!("  {}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                println!("  caused by: {}", cause);
                source = cause.source();
            }
            error!("Detector training failed: {}", e);
            TrainOutcome::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_results_csv_uses_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "                  epoch,   metrics/precision(B),      metrics/recall(B),       metrics/mAP50(B),    metrics/mAP50-95(B)"
        )
        .unwrap();
        writeln!(file, "1, 0.1, 0.2, 0.3, 0.1").unwrap();
        writeln!(file, "2, 0.61, 0.52, 0.55, 0.31").unwrap();
        drop(file);

        let metrics = read_results_csv(&path);
        assert_eq!(metrics.precision, Some(0.61));
        assert_eq!(metrics.recall, Some(0.52));
        assert_eq!(metrics.map50, Some(0.55));
        assert_eq!(metrics.map50_95, Some(0.31));
    }

    #[test]
    fn test_read_results_csv_missing() {
        let metrics = read_results_csv(Path::new("/nonexistent/results.csv"));
        assert_eq!(metrics, ValidationMetrics::default());
        assert_eq!(format_metric(metrics.map50), "N/A");
    }

    #[test]
    fn test_missing_dataset_returns_early() {
        let config = DetectorTrainConfig {
            data: PathBuf::from("/nonexistent/data.yaml"),
            ..Default::default()
        };
        match train_yolo_model(&config) {
            TrainOutcome::DatasetMissing(path) => assert_eq!(path, config.data),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_commands() {
        let config = DetectorTrainConfig::default();
        let train = train_command(&config);
        assert_eq!(&train.args[..2], &["detect", "train"]);
        assert!(train.args.contains(&"epochs=100".to_string()));

        let export = export_command(Path::new("runs/best.pt"));
        assert_eq!(
            export.display(),
            "yolo export model=runs/best.pt format=onnx dynamic=True simplify=True"
        );
    }
}
