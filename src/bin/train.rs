//! Bone fracture classifier trainer
//!
//! Downloads the dataset from Kaggle when the data directory is empty, then
//! trains ResNet-50 (ResNet-18 with `--simulate`) and keeps the checkpoint
//! with the lowest validation loss.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::info;

use fracture_ml::backend::{backend_name, default_device, TrainingBackend};
use fracture_ml::dataset::download_dataset_if_needed;
use fracture_ml::model::{ClassifierTrainConfig, ResNetArch};
use fracture_ml::training::train_model;
use fracture_ml::utils::format_duration;
use fracture_ml::utils::logging::{init_logging, LogConfig};

/// Train the bone fracture classifier
#[derive(Parser, Debug)]
#[command(name = "train")]
#[command(version)]
#[command(about = "Train the fractured / not fractured X-ray classifier", long_about = None)]
struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dataset directory (train/val/test or class folders)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Where to save the best checkpoint
    #[arg(short, long)]
    model_save_path: Option<PathBuf>,

    /// Number of training epochs
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Batch size for training
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Learning rate
    #[arg(short, long)]
    learning_rate: Option<f64>,

    /// Quick run: ResNet-18, one epoch, 10/5/5 samples
    #[arg(long, default_value = "false")]
    simulate: bool,

    /// Architecture for full runs (resnet18 or resnet50)
    #[arg(long)]
    arch: Option<ResNetArch>,

    /// ImageNet backbone checkpoint to start from
    #[arg(long)]
    pretrained: Option<PathBuf>,

    /// Save epoch and loss metadata with the weights
    #[arg(long, default_value = "false")]
    wrapped_checkpoint: bool,

    /// Kaggle dataset slug to download when the data directory is empty
    #[arg(long)]
    kaggle_dataset: Option<String>,

    /// Directory containing kaggle.json
    #[arg(long)]
    kaggle_config_dir: Option<PathBuf>,

    /// Write the training report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<(ClassifierTrainConfig, Option<PathBuf>)> {
        let mut config = match &self.config {
            Some(path) => ClassifierTrainConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ClassifierTrainConfig::default(),
        };

        if let Some(v) = self.data_dir {
            config.data_dir = v;
        }
        if let Some(v) = self.model_save_path {
            config.model_save_path = v;
        }
        if let Some(v) = self.epochs {
            config.epochs = v;
        }
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.learning_rate {
            config.learning_rate = v;
        }
        if let Some(v) = self.arch {
            config.arch = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.kaggle_dataset {
            config.kaggle_dataset = v;
        }
        if self.pretrained.is_some() {
            config.pretrained_backbone = self.pretrained;
        }
        if self.kaggle_config_dir.is_some() {
            config.kaggle_config_dir = self.kaggle_config_dir;
        }
        config.simulate |= self.simulate;
        config.wrapped_checkpoint |= self.wrapped_checkpoint;

        Ok((config, self.report))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    let (config, report_path) = cli.into_config()?;

    println!("{}", "Bone Fracture Classifier Training".green().bold());
    println!("  Backend:    {}", backend_name());
    println!("  Data:       {}", config.data_dir.display());
    println!("  Checkpoint: {}", config.model_save_path.display());
    println!("  Arch:       {}", config.effective_arch());
    println!("  Epochs:     {}", config.effective_epochs());
    println!("  Batch size: {}", config.batch_size);
    println!();

    download_dataset_if_needed(
        &config.data_dir,
        &config.kaggle_dataset,
        config.kaggle_config_dir.as_deref(),
    )?;

    let device = default_device();
    let start = std::time::Instant::now();
    let (_model, report) = train_model::<TrainingBackend>(&config, &device)?;
    info!(
        "Training finished in {}",
        format_duration(start.elapsed().as_secs_f64())
    );

    println!(
        "\n{} {:.2}%",
        "Training complete! Final test accuracy:".green().bold(),
        report.test_accuracy
    );
    println!("Model saved to {}", report.checkpoint_path.display());

    if let Some(path) = report_path {
        report.save(&path)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}
