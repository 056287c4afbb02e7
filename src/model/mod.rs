//! Model module for the fracture classifier
//!
//! This module provides:
//! - ResNet-18 / ResNet-50 built with Burn
//! - Checkpoint save/load in raw and wrapped layouts
//! - Trainer configuration

pub mod checkpoint;
pub mod config;
pub mod resnet;

// Re-export main types for convenience
pub use checkpoint::{load_checkpoint, load_pretrained_backbone, save_checkpoint, CheckpointFormat, CheckpointMeta};
pub use config::ClassifierTrainConfig;
pub use resnet::{ResNet, ResNetArch, ResNetConfig};

/// Output labels of the classifier, in label-index order
pub const CLASS_NAMES: [&str; 2] = ["fractured", "not fractured"];

/// Number of classifier outputs
pub const NUM_CLASSES: usize = CLASS_NAMES.len();

/// Class names as owned strings
pub fn class_names() -> Vec<String> {
    CLASS_NAMES.iter().map(|s| s.to_string()).collect()
}
