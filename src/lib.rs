//! # Fracture ML
//!
//! A Rust library for bone fracture analysis on X-ray images.
//!
//! ## Features
//!
//! - **Binary classification** (`fractured` / `not fractured`) with ResNet-50, built with Burn
//! - **Simulation mode** training a small ResNet-18 on a capped dataset for quick checks
//! - **Multi-class detection** with YOLOv8: training through the Ultralytics CLI,
//!   inference on the exported ONNX model with ONNX Runtime
//! - **JSON predictors** that never fail, for use behind a web backend
//!
//! ## Modules
//!
//! - `dataset`: Class-folder scanning, splitting, augmentation and Kaggle download
//! - `model`: ResNet architecture, checkpoints and trainer configuration
//! - `training`: Classifier training loop and plateau scheduling
//! - `inference`: Classifier prediction (console and JSON)
//! - `detection`: YOLOv8 training wrapper and ONNX detector
//! - `utils`: Logging, metrics, charts and helper functions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fracture_ml::backend::{default_device, DefaultBackend};
//! use fracture_ml::inference::predict_fracture_json;
//! use fracture_ml::model::ResNetArch;
//!
//! let device = default_device();
//! let response = predict_fracture_json::<DefaultBackend>(
//!     "xray.png".as_ref(),
//!     "pretrained_models/bone_fracture_model.mpk".as_ref(),
//!     ResNetArch::ResNet50,
//!     &device,
//! );
//! println!("{}", serde_json::to_string(&response)?);
//! ```

pub mod backend;
pub mod dataset;
pub mod detection;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{DatasetSplits, FractureDataset, ImageFolder};
pub use detection::{predict_fracture_yolo, DetectionResponse, DetectorTrainConfig, YoloDetector};
pub use inference::{predict_fracture, predict_fracture_json, ClassifierPredictor};
pub use model::{ClassifierTrainConfig, ResNet, ResNetArch, CLASS_NAMES, NUM_CLASSES};
pub use training::{train_model, TrainingReport};
pub use utils::error::{FractureError, Result};
pub use utils::metrics::ConfusionMatrix;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
