//! Burn Dataset Integration for X-ray images
//!
//! Lazily decoded sample list and Burn `Batcher` for the classifier
//! training loop. Corrupt images are errors, never silently skipped.

use std::path::{Path, PathBuf};

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use image::ImageReader;
use rand::Rng;

use super::augmentation::{to_chw, Augmenter};
use super::loader::ImageSample;
use crate::utils::error::{FractureError, Result};

/// ImageNet channel means
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decode an image from disk
pub fn load_image(path: &Path) -> Result<image::DynamicImage> {
    ImageReader::open(path)
        .map_err(|e| FractureError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| FractureError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| FractureError::ImageLoad(path.to_path_buf(), e.to_string()))
}

/// A single preprocessed item ready for batching
#[derive(Clone, Debug)]
pub struct FractureItem {
    /// Image data as flattened CHW float array [3 * H * W] in [0, 1]
    pub image: Vec<f32>,
    pub label: usize,
    pub path: PathBuf,
}

impl FractureItem {
    /// Load an image and run it through the transform
    pub fn load<R: Rng + ?Sized>(
        path: &Path,
        label: usize,
        augmenter: &Augmenter,
        rng: &mut R,
    ) -> Result<Self> {
        let img = load_image(path)?;
        let rgb = augmenter.apply(&img, rng);

        Ok(Self {
            image: to_chw(&rgb),
            label,
            path: path.to_path_buf(),
        })
    }
}

/// Lazily loaded dataset over a list of labelled samples
#[derive(Debug, Clone)]
pub struct FractureDataset {
    samples: Vec<ImageSample>,
    augmenter: Augmenter,
}

impl FractureDataset {
    pub fn new(samples: Vec<ImageSample>, augmenter: Augmenter) -> Self {
        Self { samples, augmenter }
    }

    pub fn image_size(&self) -> usize {
        self.augmenter.image_size() as usize
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    /// Load one item, surfacing decode errors
    pub fn load_item<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<FractureItem> {
        let sample = self.samples.get(index).ok_or_else(|| {
            FractureError::Dataset(format!(
                "Index {} out of range for dataset of {} samples",
                index,
                self.samples.len()
            ))
        })?;
        FractureItem::load(&sample.path, sample.label, &self.augmenter, rng)
    }

    /// Load a batch of items by index
    pub fn load_items<R: Rng + ?Sized>(
        &self,
        indices: &[usize],
        rng: &mut R,
    ) -> Result<Vec<FractureItem>> {
        indices.iter().map(|&i| self.load_item(i, rng)).collect()
    }
}

/// A batch of X-ray images for training or evaluation
#[derive(Clone, Debug)]
pub struct FractureBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width], normalised
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher applying ImageNet normalisation
#[derive(Clone, Debug)]
pub struct FractureBatcher {
    image_size: usize,
}

impl FractureBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

/// Normalise a [N, 3, H, W] tensor with ImageNet statistics
pub fn normalize<B: Backend>(images: Tensor<B, 4>, device: &B::Device) -> Tensor<B, 4> {
    let mean = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]), device);
    let std = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]), device);
    (images - mean) / std
}

impl<B: Backend> Batcher<B, FractureItem, FractureBatch<B>> for FractureBatcher {
    fn batch(&self, items: Vec<FractureItem>, device: &B::Device) -> FractureBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );
        let images = normalize(images, device);

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        FractureBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    type TestBackend = NdArray;

    #[test]
    fn test_batcher_shapes_and_normalisation() {
        let device = Default::default();
        let items = vec![
            FractureItem {
                image: vec![0.485; 3 * 4 * 4],
                label: 0,
                path: PathBuf::from("a.png"),
            },
            FractureItem {
                image: vec![1.0; 3 * 4 * 4],
                label: 1,
                path: PathBuf::from("b.png"),
            },
        ];

        let batch: FractureBatch<TestBackend> = FractureBatcher::new(4).batch(items, &device);
        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
        assert_eq!(batch.targets.dims(), [2]);

        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        // Red channel of the first image equals the mean, so it normalises to 0
        assert!(values[0].abs() < 1e-5);
    }

    #[test]
    fn test_corrupt_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\ntruncated").unwrap();

        let dataset = FractureDataset::new(vec![ImageSample { path, label: 0 }], Augmenter::eval(8));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = dataset.load_item(0, &mut rng).unwrap_err();
        assert!(matches!(err, FractureError::ImageLoad(..)));
        assert!(dataset.load_items(&[0], &mut rng).is_err());
        assert!(dataset.load_item(5, &mut rng).is_err());
    }

    #[test]
    fn test_load_item_resizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xray.png");
        image::RgbImage::from_pixel(30, 20, image::Rgb([255, 255, 255]))
            .save(&path)
            .unwrap();

        let dataset = FractureDataset::new(vec![ImageSample { path, label: 1 }], Augmenter::eval(16));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let item = dataset.load_item(0, &mut rng).unwrap();
        assert_eq!(item.image.len(), 3 * 16 * 16);
        assert_eq!(item.label, 1);
    }
}
