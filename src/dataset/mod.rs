//! Dataset module for X-ray image handling
//!
//! This module provides functionality for:
//! - Scanning class-folder image datasets
//! - Train / validation / test splitting (pre-split or pooled 70/15/15)
//! - Training-time augmentation
//! - Lazy sample decoding and the Burn `Batcher`
//! - Fetching the dataset from Kaggle

pub mod augmentation;
pub mod burn_dataset;
pub mod download;
pub mod loader;
pub mod split;

// Re-export main types for convenience
pub use augmentation::Augmenter;
pub use burn_dataset::{load_image, FractureBatch, FractureBatcher, FractureDataset, FractureItem};
pub use download::download_dataset_if_needed;
pub use loader::{DatasetStats, ImageFolder, ImageSample};
pub use split::{resolve_data_root, DatasetSplits, SimulationLimits, SplitLayout};
