//! Multi-class fracture detection with YOLOv8
//!
//! - `config`: training hyperparameters and inference thresholds
//! - `trainer`: drives the Ultralytics CLI and exports to ONNX
//! - `postprocess`: letterbox, box decoding and NMS
//! - `predictor`: ONNX Runtime inference and the JSON response

pub mod config;
pub mod postprocess;
pub mod predictor;
pub mod trainer;

pub use config::{DetectorPredictConfig, DetectorTrainConfig};
pub use predictor::{
    predict_fracture_yolo, BBox, Detection, DetectionResponse, ImageShape, YoloDetector,
};
pub use trainer::{train_yolo_model, TrainOutcome, TrainSummary, ValidationMetrics};
