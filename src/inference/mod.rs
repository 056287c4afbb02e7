//! Inference module for the fracture classifier
//!
//! This module provides:
//! - Loading a trained classifier from either checkpoint layout
//! - Console prediction with a saved confidence chart
//! - JSON prediction with structured errors

pub mod predictor;

// Re-export main types for convenience
pub use predictor::{
    predict_fracture, predict_fracture_json, ClassificationResult, ClassifierPredictor,
    ClassifierResponse, PredictionReport,
};
