//! YOLOv8 pre- and post-processing
//!
//! - Letterbox resize to the square network input (gray 114 padding)
//! - Decoding of the `[4 + nc, anchors]` head output
//! - Per-class non-maximum suppression
//! - Mapping boxes back to original image coordinates

use std::collections::BTreeMap;

use image::{imageops::FilterType, DynamicImage, Rgb, RgbImage};
use ndarray::{Array4, ArrayView2};

/// Padding value used by Ultralytics letterboxing
pub const LETTERBOX_FILL: u8 = 114;

/// Class names of the HBFMID detection dataset, in label order
pub const HBFMID_CLASS_NAMES: [&str; 10] = [
    "Comminuted",
    "Greenstick",
    "Healthy",
    "Linear",
    "Oblique Displaced",
    "Oblique",
    "Segmental",
    "Spiral",
    "Transverse Displaced",
    "Transverse",
];

/// Axis-aligned box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxXyxy {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoxXyxy {
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &BoxXyxy) -> f32 {
        let x0 = self.x1.max(other.x1);
        let y0 = self.y1.max(other.y1);
        let x1 = self.x2.min(other.x2);
        let y1 = self.y2.min(other.y2);
        let inter = (x1 - x0).max(0.0) * (y1 - y0).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// A decoded candidate box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    /// Class score in [0, 1]
    pub confidence: f32,
    pub bbox: BoxXyxy,
}

/// Geometry of a letterbox transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_width: u32,
    pub orig_height: u32,
}

impl Letterbox {
    /// Map a box from network input space back onto the original image, clamped
    pub fn restore(&self, b: &BoxXyxy) -> BoxXyxy {
        let w = self.orig_width as f32;
        let h = self.orig_height as f32;
        let map_x = |x: f32| ((x - self.pad_x) / self.scale).clamp(0.0, w);
        let map_y = |y: f32| ((y - self.pad_y) / self.scale).clamp(0.0, h);
        BoxXyxy {
            x1: map_x(b.x1),
            y1: map_y(b.y1),
            x2: map_x(b.x2),
            y2: map_y(b.y2),
        }
    }
}

/// Resize preserving aspect ratio and pad to `size x size`
///
/// Returns the `[1, 3, size, size]` input scaled to [0, 1] and the transform.
pub fn letterbox(image: &DynamicImage, size: u32) -> (Array4<f32>, Letterbox) {
    let (orig_width, orig_height) = (image.width().max(1), image.height().max(1));
    let scale = (size as f32 / orig_width as f32).min(size as f32 / orig_height as f32);
    let new_w = ((orig_width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((orig_height as f32 * scale).round() as u32).clamp(1, size);

    let pad_x = (size - new_w) as f32 / 2.0;
    let pad_y = (size - new_h) as f32 / 2.0;
    let left = (pad_x - 0.1).round().max(0.0) as u32;
    let top = (pad_y - 0.1).round().max(0.0) as u32;

    let resized = image.resize_exact(new_w, new_h, FilterType::Triangle).to_rgb8();
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
    image::imageops::replace(&mut canvas, &resized, left as i64, top as i64);

    let side = size as usize;
    let mut input = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    (
        input,
        Letterbox {
            scale,
            pad_x: left as f32,
            pad_y: top as f32,
            orig_width,
            orig_height,
        },
    )
}

/// Decode the head output (rows: cx, cy, w, h, class scores; columns: anchors)
///
/// Keeps anchors whose best class score reaches `conf_threshold`.
pub fn decode(output: ArrayView2<f32>, conf_threshold: f32) -> Vec<RawDetection> {
    let (rows, anchors) = output.dim();
    if rows <= 4 {
        return Vec::new();
    }

    (0..anchors)
        .filter_map(|a| {
            let (class_id, confidence) = (4..rows)
                .map(|r| (r - 4, output[[r, a]]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

            (confidence >= conf_threshold).then(|| RawDetection {
                class_id,
                confidence,
                bbox: BoxXyxy::from_center(
                    output[[0, a]],
                    output[[1, a]],
                    output[[2, a]],
                    output[[3, a]],
                ),
            })
        })
        .collect()
}

/// Per-class greedy NMS, highest confidence first, capped at `max_detections`
pub fn non_max_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for candidate in detections {
        if keep.len() >= max_detections {
            break;
        }
        let suppressed = keep.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

/// Parse the Ultralytics `names` metadata, e.g. `{0: 'Comminuted', 1: 'Healthy'}`
pub fn parse_class_names(raw: &str) -> Option<Vec<String>> {
    let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut names = BTreeMap::new();

    for entry in body.split(',').filter(|e| !e.trim().is_empty()) {
        let (key, value) = entry.split_once(':')?;
        let id: usize = key.trim().parse().ok()?;
        let name = value.trim().trim_matches(|c| c == '\'' || c == '"');
        names.insert(id, name.to_string());
    }

    if names.is_empty() || names.keys().copied().ne(0..names.len()) {
        return None;
    }
    Some(names.into_values().collect())
}

/// Fallback class list when the model carries no metadata
pub fn default_class_names() -> Vec<String> {
    HBFMID_CLASS_NAMES.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn det(class_id: usize, confidence: f32, x1: f32) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            bbox: BoxXyxy {
                x1,
                y1: 0.0,
                x2: x1 + 10.0,
                y2: 10.0,
            },
        }
    }

    #[test]
    fn test_iou() {
        let a = BoxXyxy { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 };
        let b = BoxXyxy { x1: 5.0, y1: 0.0, x2: 15.0, y2: 10.0 };
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_nms_suppresses_same_class_only() {
        let kept = non_max_suppression(
            vec![det(0, 0.6, 1.0), det(0, 0.9, 0.0), det(1, 0.8, 0.0), det(0, 0.5, 50.0)],
            0.45,
            300,
        );
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, 1);
        assert_eq!(kept[2].bbox.x1, 50.0);
    }

    #[test]
    fn test_nms_caps_detections() {
        let many: Vec<_> = (0..10).map(|i| det(0, 0.5, i as f32 * 100.0)).collect();
        assert_eq!(non_max_suppression(many, 0.45, 4).len(), 4);
    }

    #[test]
    fn test_decode_thresholds_and_argmax() {
        // Two anchors, two classes
        let output = Array2::from_shape_vec(
            (6, 2),
            vec![
                100.0, 200.0, // cx
                100.0, 200.0, // cy
                20.0, 40.0, // w
                10.0, 40.0, // h
                0.1, 0.2, // class 0
                0.7, 0.1, // class 1
            ],
        )
        .unwrap();
        let detections = decode(output.view(), 0.25);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 1);
        assert_eq!(detections[0].bbox, BoxXyxy { x1: 90.0, y1: 95.0, x2: 110.0, y2: 105.0 });
    }

    #[test]
    fn test_letterbox_geometry_and_restore() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([255, 255, 255])));
        let (input, lb) = letterbox(&image, 64);
        assert_eq!(input.shape(), &[1, 3, 64, 64]);
        assert!((lb.scale - 0.32).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 16.0);
        // Padding is gray, content white
        assert!((input[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 1e-6);
        assert!((input[[0, 0, 32, 32]] - 1.0).abs() < 1e-6);

        let restored = lb.restore(&BoxXyxy { x1: -5.0, y1: 16.0, x2: 32.0, y2: 80.0 });
        assert_eq!(restored.x1, 0.0);
        assert_eq!(restored.y1, 0.0);
        assert!((restored.x2 - 100.0).abs() < 1e-3);
        assert_eq!(restored.y2, 100.0);
    }

    #[test]
    fn test_parse_class_names() {
        let names = parse_class_names("{0: 'Comminuted', 1: 'Oblique Displaced'}").unwrap();
        assert_eq!(names, vec!["Comminuted", "Oblique Displaced"]);
        assert!(parse_class_names("not a dict").is_none());
        assert!(parse_class_names("{1: 'gap'}").is_none());
        assert_eq!(default_class_names().len(), 10);
    }
}
