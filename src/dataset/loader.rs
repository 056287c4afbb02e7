//! Class-folder image loader
//!
//! Scans a directory laid out as `root/<class_name>/<image>` and assigns
//! labels by sorted class-directory name.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::error::{FractureError, Result};

/// File extensions accepted as images
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
}

/// Check whether a path has one of the accepted image extensions
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Image dataset labelled by its folder structure
#[derive(Debug, Clone)]
pub struct ImageFolder {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// All samples, grouped by class in sorted order
    pub samples: Vec<ImageSample>,
    /// Label index -> class name
    pub class_names: Vec<String>,
}

impl ImageFolder {
    /// Scan a class-folder directory
    ///
    /// ```text
    /// root_dir/
    /// ├── fractured/
    /// │   ├── 001.jpg
    /// │   └── 002.jpg
    /// └── not fractured/
    ///     └── ...
    /// ```
    pub fn open<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        debug!("Scanning image folder: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(FractureError::PathNotFound(root_dir));
        }

        let mut class_names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    class_names.push(name.to_string());
                }
            }
        }
        class_names.sort();

        if class_names.is_empty() {
            return Err(FractureError::Dataset(format!(
                "No class directories found in {:?}",
                root_dir
            )));
        }

        let mut samples = Vec::new();
        for (label, class_name) in class_names.iter().enumerate() {
            let mut paths: Vec<PathBuf> = WalkDir::new(root_dir.join(class_name))
                .min_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_image_file(e.path()))
                .map(|e| e.into_path())
                .collect();
            paths.sort();

            debug!("Class '{}' (label {}): {} images", class_name, label, paths.len());
            samples.extend(paths.into_iter().map(|path| ImageSample { path, label }));
        }

        info!(
            "Loaded {} images in {} classes from {:?}",
            samples.len(),
            class_names.len(),
            root_dir
        );

        Ok(Self {
            root_dir,
            samples,
            class_names,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Re-label samples against another class list, matching by name
    ///
    /// Used so `val/` and `test/` folders share the label indices of `train/`.
    pub fn relabel_to(mut self, class_names: &[String]) -> Result<Self> {
        let mapping: Vec<usize> = self
            .class_names
            .iter()
            .map(|name| {
                class_names.iter().position(|n| n == name).ok_or_else(|| {
                    FractureError::Dataset(format!(
                        "Class '{}' in {:?} is not present in the training classes",
                        name, self.root_dir
                    ))
                })
            })
            .collect::<Result<_>>()?;

        for sample in &mut self.samples {
            sample.label = mapping[sample.label];
        }
        self.class_names = class_names.to_vec();
        Ok(self)
    }

    /// Per-class statistics
    pub fn stats(&self) -> DatasetStats {
        DatasetStats::from_samples(&self.samples, &self.class_names)
    }
}

/// Statistics about a collection of samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub class_counts: Vec<usize>,
    pub class_names: Vec<String>,
}

impl DatasetStats {
    pub fn from_samples(samples: &[ImageSample], class_names: &[String]) -> Self {
        let mut class_counts = vec![0usize; class_names.len()];
        for sample in samples {
            if let Some(count) = class_counts.get_mut(sample.label) {
                *count += 1;
            }
        }

        Self {
            total_samples: samples.len(),
            class_counts,
            class_names: class_names.to_vec(),
        }
    }

    /// Print statistics to console
    pub fn print(&self) {
        println!("  Total samples: {}", self.total_samples);
        for (idx, name) in self.class_names.iter().enumerate() {
            let count = self.class_counts[idx];
            let bar_len = (count as f32 / self.total_samples.max(1) as f32 * 40.0) as usize;
            println!("    {:2}. {:20} {:6} {}", idx, name, count, "█".repeat(bar_len));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"not really an image").unwrap();
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b.JPG")));
        assert!(is_image_file(Path::new("scan.tiff")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn test_labels_follow_sorted_class_names() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("not fractured/b.png"));
        touch(&dir.path().join("fractured/a.jpg"));
        touch(&dir.path().join("fractured/c.jpg"));
        touch(&dir.path().join("fractured/readme.txt"));

        let folder = ImageFolder::open(dir.path()).unwrap();
        assert_eq!(folder.class_names, vec!["fractured", "not fractured"]);
        assert_eq!(folder.len(), 3);
        assert_eq!(folder.stats().class_counts, vec![2, 1]);
        assert!(folder.samples.iter().all(|s| s.label == 0 || s.path.ends_with("b.png")));
    }

    #[test]
    fn test_missing_directory() {
        let result = ImageFolder::open("/definitely/not/here");
        assert!(matches!(result, Err(FractureError::PathNotFound(_))));
    }

    #[test]
    fn test_relabel_to_training_classes() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("not fractured/x.png"));

        let names = vec!["fractured".to_string(), "not fractured".to_string()];
        let folder = ImageFolder::open(dir.path()).unwrap().relabel_to(&names).unwrap();
        assert_eq!(folder.samples[0].label, 1);

        let unknown = vec!["fractured".to_string()];
        let folder = ImageFolder::open(dir.path()).unwrap();
        assert!(folder.relabel_to(&unknown).is_err());
    }
}
