//! Training Configuration Module
//!
//! Hyperparameters and paths for the classifier trainer. Defaults reproduce
//! the stock training run: 5 epochs, batch 32, Adam at 1e-4, and a plateau
//! scheduler halving the rate after 2 stagnant epochs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::resnet::ResNetArch;
use crate::dataset::download::DEFAULT_KAGGLE_DATASET;
use crate::dataset::split::SimulationLimits;
use crate::utils::error::Result;

/// Default location of the trained classifier
pub const DEFAULT_MODEL_PATH: &str = "./pretrained_models/bone_fracture_model.mpk";

/// Configuration for the classifier trainer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierTrainConfig {
    /// Dataset root (pre-split `train/val/test` or pooled class folders)
    pub data_dir: PathBuf,

    /// Where the best checkpoint is written
    pub model_save_path: PathBuf,

    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,

    /// Epochs without improvement before the learning rate is reduced
    pub plateau_patience: usize,
    /// Multiplicative learning rate reduction
    pub plateau_factor: f64,

    /// Quick smoke run: ResNet-18, one epoch, tiny splits
    pub simulate: bool,
    pub simulation_limits: SimulationLimits,

    /// Seed for the split and the per-epoch shuffle
    pub seed: u64,

    /// Square input resolution
    pub image_size: usize,

    /// Architecture for full runs; simulation always uses ResNet-18
    pub arch: ResNetArch,

    /// Optional 1000-class ImageNet backbone to start from
    pub pretrained_backbone: Option<PathBuf>,

    /// Store epoch/loss metadata next to the weights
    pub wrapped_checkpoint: bool,

    /// Kaggle dataset slug used when `data_dir` is empty
    pub kaggle_dataset: String,

    /// Directory containing `kaggle.json`
    pub kaggle_config_dir: Option<PathBuf>,
}

impl Default for ClassifierTrainConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/bone_fracture"),
            model_save_path: PathBuf::from(DEFAULT_MODEL_PATH),
            epochs: 5,
            batch_size: 32,
            learning_rate: 1e-4,
            plateau_patience: 2,
            plateau_factor: 0.5,
            simulate: false,
            simulation_limits: SimulationLimits::default(),
            seed: 42,
            image_size: 224,
            arch: ResNetArch::ResNet50,
            pretrained_backbone: None,
            wrapped_checkpoint: false,
            kaggle_dataset: DEFAULT_KAGGLE_DATASET.to_string(),
            kaggle_config_dir: None,
        }
    }
}

impl ClassifierTrainConfig {
    /// Architecture actually trained, accounting for simulation mode
    pub fn effective_arch(&self) -> ResNetArch {
        if self.simulate {
            ResNetArch::ResNet18
        } else {
            self.arch
        }
    }

    /// Epoch count actually run, accounting for simulation mode
    pub fn effective_epochs(&self) -> usize {
        if self.simulate {
            self.simulation_limits.epochs
        } else {
            self.epochs
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClassifierTrainConfig::default();
        assert_eq!(config.epochs, 5);
        assert_eq!(config.batch_size, 32);
        assert!((config.learning_rate - 1e-4).abs() < 1e-12);
        assert_eq!(config.effective_arch(), ResNetArch::ResNet50);
    }

    #[test]
    fn test_simulation_overrides() {
        let config = ClassifierTrainConfig {
            simulate: true,
            ..Default::default()
        };
        assert_eq!(config.effective_arch(), ResNetArch::ResNet18);
        assert_eq!(config.effective_epochs(), 1);
    }

    #[test]
    fn test_json_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        let config = ClassifierTrainConfig {
            epochs: 9,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ClassifierTrainConfig::load(&path).unwrap().epochs, 9);
    }
}
