//! YOLOv8 fracture detector running on ONNX Runtime
//!
//! The JSON payload matches what the web front-end consumes: confidences are
//! percentages and an error object keeps the same keys with empty values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use ndarray::{Axis, Ix2};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use serde::{Deserialize, Serialize};

use crate::dataset::load_image;
use crate::detection::config::DetectorPredictConfig;
use crate::detection::postprocess::{
    decode, default_class_names, letterbox, non_max_suppression, parse_class_names, BoxXyxy,
};
use crate::utils::error::{FractureError, Result};

/// Class that marks an image without fracture findings
pub const HEALTHY_CLASS: &str = "Healthy";

/// Bounding box in original image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<BoxXyxy> for BBox {
    fn from(b: BoxXyxy) -> Self {
        Self {
            x1: b.x1,
            y1: b.y1,
            x2: b.x2,
            y2: b.y2,
        }
    }
}

/// One detected finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_name: String,
    /// Percentage in [0, 100]
    pub confidence: f32,
    pub bbox: BBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub width: u32,
    pub height: u32,
}

/// JSON response of the detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub prediction: Option<String>,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_detections: Option<usize>,
    pub detections: Vec<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_summary: Option<BTreeMap<String, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_shape: Option<ImageShape>,
}

impl DetectionResponse {
    /// Summarize detections into the fractured / not fractured verdict
    ///
    /// The primary class is the most confident detection, `Healthy` when
    /// nothing was found.
    pub fn summarize(detections: Vec<Detection>, image_shape: ImageShape) -> Self {
        let best = detections.iter().max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let primary_class = best
            .map(|d| d.class_name.clone())
            .unwrap_or_else(|| HEALTHY_CLASS.to_string());
        let confidence = best.map(|d| d.confidence).unwrap_or(0.0);
        let is_fractured = !detections.is_empty() && primary_class != HEALTHY_CLASS;

        let mut class_summary = BTreeMap::new();
        for d in &detections {
            *class_summary.entry(d.class_name.clone()).or_insert(0) += 1;
        }

        Self {
            error: None,
            prediction: Some(
                if is_fractured {
                    "fractured"
                } else {
                    "not fractured"
                }
                .to_string(),
            ),
            confidence,
            primary_class: Some(primary_class),
            num_detections: Some(detections.len()),
            detections,
            class_summary: Some(class_summary),
            image_shape: Some(image_shape),
        }
    }

    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            prediction: None,
            confidence: 0.0,
            primary_class: None,
            num_detections: None,
            detections: Vec::new(),
            class_summary: None,
            image_shape: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// ONNX Runtime session for an exported YOLOv8 model
pub struct YoloDetector {
    session: Session,
    input_name: String,
    output_name: String,
    class_names: Vec<String>,
    config: DetectorPredictConfig,
}

impl YoloDetector {
    pub fn load(model_path: &Path, config: DetectorPredictConfig) -> Result<Self> {
        if !model_path.exists() {
            return Err(FractureError::PathNotFound(model_path.to_path_buf()));
        }

        tracing::info!("Loading detection model from: {}", model_path.display());
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| FractureError::Detection("model has no inputs".to_string()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| FractureError::Detection("model has no outputs".to_string()))?;

        let class_names = session
            .metadata()
            .ok()
            .and_then(|m| m.custom("names").ok().flatten())
            .and_then(|raw| parse_class_names(&raw))
            .unwrap_or_else(|| {
                tracing::warn!("No class names in model metadata, using HBFMID classes");
                default_class_names()
            });
        tracing::debug!("Detector input '{}', output '{}'", input_name, output_name);

        Ok(Self {
            session,
            input_name,
            output_name,
            class_names,
            config,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Run detection, boxes are returned in original image coordinates
    pub fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let (input, geometry) = letterbox(image, self.config.input_size);
        let input = Tensor::from_array(input)?;

        let prediction = {
            let outputs = self
                .session
                .run(inputs![self.input_name.as_str() => input])?;
            match outputs.get(self.output_name.as_str()) {
                Some(output) => output.try_extract_array::<f32>()?.into_owned(),
                None => {
                    return Err(FractureError::Detection(format!(
                        "output '{}' not found",
                        self.output_name
                    )))
                }
            }
        };

        if prediction.ndim() != 3 || prediction.shape()[0] == 0 {
            return Err(FractureError::Detection(format!(
                "unexpected output shape {:?}",
                prediction.shape()
            )));
        }
        let head = prediction
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|e| FractureError::Detection(e.to_string()))?;

        let candidates = decode(head, self.config.conf_threshold);
        let kept = non_max_suppression(
            candidates,
            self.config.iou_threshold,
            self.config.max_detections,
        );

        Ok(kept
            .into_iter()
            .map(|raw| Detection {
                class_name: self
                    .class_names
                    .get(raw.class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", raw.class_id)),
                confidence: raw.confidence * 100.0,
                bbox: geometry.restore(&raw.bbox).into(),
            })
            .collect())
    }

    /// Detect and summarize a decoded image
    pub fn predict_image(&mut self, image: &DynamicImage) -> Result<DetectionResponse> {
        let shape = ImageShape {
            width: image.width(),
            height: image.height(),
        };
        let detections = self.detect(image)?;
        Ok(DetectionResponse::summarize(detections, shape))
    }

    pub fn predict_path(&mut self, image_path: &Path) -> Result<DetectionResponse> {
        let image = load_image(image_path)?;
        self.predict_image(&image)
    }
}

/// Detect fractures in an image, never failing: errors become an error object
pub fn predict_fracture_yolo(
    image_path: &Path,
    model_path: &Path,
    config: &DetectorPredictConfig,
) -> DetectionResponse {
    if !model_path.exists() {
        return DetectionResponse::from_error(format!(
            "Model file not found at {}",
            model_path.display()
        ));
    }

    // Decode first so unreadable images fail the same way whatever the model
    let result = load_image(image_path).and_then(|image| {
        YoloDetector::load(model_path, *config)?.predict_image(&image)
    });

    match result {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Detection failed: {}", e);
            DetectionResponse::from_error(e.to_string())
        }
    }
}

/// Default location of the exported detector
pub fn default_model_path() -> PathBuf {
    PathBuf::from(crate::detection::config::DEFAULT_DETECTOR_MODEL)
}
