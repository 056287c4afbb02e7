//! Image transforms for training and evaluation
//!
//! Training: resize, random horizontal flip (p = 0.5), random rotation in
//! ±10 degrees. Evaluation: resize only. Normalisation happens in the batcher.

use image::{imageops::FilterType, DynamicImage, Rgb, RgbImage};
use rand::Rng;

/// Default input resolution for the classifier
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Maximum absolute rotation applied during training, in degrees
pub const MAX_ROTATION_DEGREES: f32 = 10.0;

/// Resize plus optional random augmentation
#[derive(Debug, Clone, Copy)]
pub struct Augmenter {
    image_size: u32,
    augment: bool,
}

impl Augmenter {
    /// Transform used for the training split
    pub fn train(image_size: u32) -> Self {
        Self {
            image_size,
            augment: true,
        }
    }

    /// Deterministic transform used for validation, test and inference
    pub fn eval(image_size: u32) -> Self {
        Self {
            image_size,
            augment: false,
        }
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn is_augmenting(&self) -> bool {
        self.augment
    }

    /// Apply the transform, returning a square RGB image
    pub fn apply<R: Rng + ?Sized>(&self, img: &DynamicImage, rng: &mut R) -> RgbImage {
        let mut rgb = img
            .resize_exact(self.image_size, self.image_size, FilterType::Triangle)
            .to_rgb8();

        if self.augment {
            if rng.gen_bool(0.5) {
                rgb = image::imageops::flip_horizontal(&rgb);
            }
            let angle = rng.gen_range(-MAX_ROTATION_DEGREES..=MAX_ROTATION_DEGREES);
            rgb = rotate(&rgb, angle);
        }

        rgb
    }
}

/// Rotate about the image centre by `degrees` (counter-clockwise)
///
/// Nearest-neighbour sampling; pixels mapped from outside the source are black.
pub fn rotate(img: &RgbImage, degrees: f32) -> RgbImage {
    if degrees == 0.0 {
        return img.clone();
    }

    let (width, height) = img.dimensions();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;

    RgbImage::from_fn(width, height, |x, y| {
        // Inverse mapping from destination to source
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = (cos * dx - sin * dy + cx).round();
        let sy = (sin * dx + cos * dy + cy).round();

        if sx >= 0.0 && sy >= 0.0 && (sx as u32) < width && (sy as u32) < height {
            *img.get_pixel(sx as u32, sy as u32)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// Convert an RGB image to a CHW float vector scaled to [0, 1]
pub fn to_chw(rgb: &RgbImage) -> Vec<f32> {
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let plane = width * height;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = y as usize * width + x as usize;
        data[idx] = pixel[0] as f32 / 255.0;
        data[plane + idx] = pixel[1] as f32 / 255.0;
        data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_eval_transform_only_resizes() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 30, Rgb([10, 20, 30])));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = Augmenter::eval(224).apply(&img, &mut rng);
        assert_eq!(out.dimensions(), (224, 224));
        assert_eq!(*out.get_pixel(112, 112), Rgb([10, 20, 30]));
    }

    #[test]
    fn test_rotation_keeps_centre_and_blackens_corners() {
        let img = RgbImage::from_pixel(21, 21, Rgb([200, 200, 200]));
        let rotated = rotate(&img, 10.0);
        assert_eq!(*rotated.get_pixel(10, 10), Rgb([200, 200, 200]));
        assert_eq!(*rotated.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(rotate(&img, 0.0), img);
    }

    #[test]
    fn test_to_chw_layout() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(1, 0, Rgb([255, 0, 51]));
        let data = to_chw(&img);
        assert_eq!(data.len(), 6);
        assert_eq!(data[1], 1.0);
        assert_eq!(data[3], 0.0);
        assert!((data[5] - 0.2).abs() < 1e-6);
    }
}
