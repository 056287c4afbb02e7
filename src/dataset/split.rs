//! Train / validation / test splits
//!
//! Two layouts are understood:
//! 1. **Pre-split**: `<data_dir>/train`, `<data_dir>/val` and `<data_dir>/test`,
//!    each a class-folder tree.
//! 2. **Pooled**: `<data_dir>/<class>/...`, partitioned here into
//!    70% train, 15% validation and the remainder as test.
//!
//! The pooled partition is deterministic for a given seed. Archives that
//! unzip into a chain of single wrapper folders are followed down to the
//! directory that actually holds the splits.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::loader::{DatasetStats, ImageFolder, ImageSample};
use crate::utils::error::Result;

/// Fraction of the pooled dataset used for training
pub const TRAIN_FRACTION: f64 = 0.7;
/// Fraction of the pooled dataset used for validation
pub const VAL_FRACTION: f64 = 0.15;

/// Caps applied in simulation mode for a quick smoke run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationLimits {
    pub train: usize,
    pub val: usize,
    pub test: usize,
    pub epochs: usize,
}

impl Default for SimulationLimits {
    fn default() -> Self {
        Self {
            train: 10,
            val: 5,
            test: 5,
            epochs: 1,
        }
    }
}

/// How the splits were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitLayout {
    PreSplit,
    Pooled,
}

/// The three disjoint sample collections used by the trainer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSplits {
    pub train: Vec<ImageSample>,
    pub val: Vec<ImageSample>,
    pub test: Vec<ImageSample>,
    /// Label index -> class name, taken from the training folder
    pub class_names: Vec<String>,
    pub layout: SplitLayout,
}

impl DatasetSplits {
    /// Build splits from a data directory, detecting its layout
    pub fn from_directory<P: AsRef<Path>>(data_dir: P, seed: u64) -> Result<Self> {
        let data_root = resolve_data_root(data_dir.as_ref());
        let data_dir = data_root.as_path();
        let train_dir = data_dir.join("train");

        if train_dir.is_dir() {
            info!("Using pre-split dataset directories.");
            let train = ImageFolder::open(&train_dir)?;
            let class_names = train.class_names.clone();
            let val = ImageFolder::open(data_dir.join("val"))?.relabel_to(&class_names)?;
            let test = ImageFolder::open(data_dir.join("test"))?.relabel_to(&class_names)?;

            Ok(Self {
                train: train.samples,
                val: val.samples,
                test: test.samples,
                class_names,
                layout: SplitLayout::PreSplit,
            })
        } else {
            info!("No pre-split directories found. Performing automatic split on the full dataset.");
            let folder = ImageFolder::open(data_dir)?;
            Ok(Self::from_pooled(folder, seed))
        }
    }

    /// Shuffle a pooled folder and cut it 70/15/rest
    pub fn from_pooled(folder: ImageFolder, seed: u64) -> Self {
        let mut samples = folder.samples;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        samples.shuffle(&mut rng);

        let (train_size, val_size) = pooled_sizes(samples.len());
        let test = samples.split_off(train_size + val_size);
        let val = samples.split_off(train_size);

        Self {
            train: samples,
            val,
            test,
            class_names: folder.class_names,
            layout: SplitLayout::Pooled,
        }
    }

    /// Truncate each split to the simulation caps
    pub fn limit(mut self, limits: &SimulationLimits) -> Self {
        self.train.truncate(limits.train);
        self.val.truncate(limits.val);
        self.test.truncate(limits.test);
        self
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn total(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    /// No image path appears in more than one split
    pub fn is_disjoint(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.train
            .iter()
            .chain(&self.val)
            .chain(&self.test)
            .all(|s| seen.insert(&s.path))
    }

    pub fn train_stats(&self) -> DatasetStats {
        DatasetStats::from_samples(&self.train, &self.class_names)
    }

    /// Print split sizes to console
    pub fn print_summary(&self) {
        println!("  Class names: {:?}", self.class_names);
        println!("  Training samples: {}", self.train.len());
        println!("  Validation samples: {}", self.val.len());
        println!("  Test samples: {}", self.test.len());
    }
}

/// Train and validation sizes for a pooled dataset of `n` images
///
/// Sizes are truncated; the test split takes whatever is left.
pub fn pooled_sizes(n: usize) -> (usize, usize) {
    let train = (TRAIN_FRACTION * n as f64) as usize;
    let val = (VAL_FRACTION * n as f64) as usize;
    (train, val)
}

fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Follow single-subdirectory wrappers until a `train/` split or several
/// subdirectories show up
pub fn resolve_data_root(data_dir: &Path) -> PathBuf {
    let mut current = data_dir.to_path_buf();
    while !current.join("train").is_dir() {
        match subdirectories(&current).as_slice() {
            // A lone folder of images is a class, not a wrapper
            [only] if !subdirectories(only).is_empty() => current = only.clone(),
            _ => break,
        }
    }
    if current != data_dir {
        info!("Using dataset root {:?}", current);
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pooled(n: usize) -> ImageFolder {
        ImageFolder {
            root_dir: PathBuf::from("/data"),
            samples: (0..n)
                .map(|i| ImageSample {
                    path: PathBuf::from(format!("/data/c{}/{}.png", i % 2, i)),
                    label: i % 2,
                })
                .collect(),
            class_names: vec!["fractured".to_string(), "not fractured".to_string()],
        }
    }

    #[test]
    fn test_pooled_sizes_truncate() {
        assert_eq!(pooled_sizes(100), (70, 15));
        assert_eq!(pooled_sizes(7), (4, 1));
        assert_eq!(pooled_sizes(0), (0, 0));
    }

    #[test]
    fn test_pooled_split_is_disjoint_and_complete() {
        let splits = DatasetSplits::from_pooled(pooled(101), 42);
        assert_eq!(splits.train.len(), 70);
        assert_eq!(splits.val.len(), 15);
        assert_eq!(splits.test.len(), 16);
        assert_eq!(splits.total(), 101);
        assert!(splits.is_disjoint());
        assert_eq!(splits.layout, SplitLayout::Pooled);
    }

    #[test]
    fn test_pooled_split_is_seeded() {
        let a = DatasetSplits::from_pooled(pooled(50), 7);
        let b = DatasetSplits::from_pooled(pooled(50), 7);
        assert_eq!(a.train, b.train);
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn test_resolve_nested_archive_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Bone_Fracture_Binary_Classification").join("inner");
        for split in ["train", "val", "test"] {
            std::fs::create_dir_all(nested.join(split)).unwrap();
        }
        assert_eq!(resolve_data_root(dir.path()), nested);

        let pooled_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(pooled_dir.path().join("fractured")).unwrap();
        std::fs::create_dir_all(pooled_dir.path().join("not fractured")).unwrap();
        assert_eq!(resolve_data_root(pooled_dir.path()), pooled_dir.path());

        let one_class = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(one_class.path().join("fractured")).unwrap();
        assert_eq!(resolve_data_root(one_class.path()), one_class.path());
    }

    #[test]
    fn test_limit_caps_each_split() {
        let splits = DatasetSplits::from_pooled(pooled(200), 1).limit(&SimulationLimits::default());
        assert_eq!(splits.train.len(), 10);
        assert_eq!(splits.val.len(), 5);
        assert_eq!(splits.test.len(), 5);

        let small = DatasetSplits::from_pooled(pooled(4), 1).limit(&SimulationLimits::default());
        assert_eq!(small.total(), 4);
    }
}
