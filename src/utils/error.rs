//! Error Handling Module
//!
//! Defines the error type shared by the classifier and detector pipelines.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for fracture classification and detection
#[derive(Error, Debug)]
pub enum FractureError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model construction
    #[error("Model error: {0}")]
    Model(String),

    /// Error reading or writing a checkpoint
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Error during training
    #[error("Training error: {0}")]
    Training(String),

    /// Error during classifier inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// Error during detector inference or post-processing
    #[error("Detection error: {0}")]
    Detection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external tool (kaggle, yolo) failed or could not be started
    #[error("External command `{command}` failed: {message}")]
    ExternalCommand { command: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// ONNX Runtime error
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for FractureError {
    fn from(e: serde_json::Error) -> Self {
        FractureError::Serialization(e.to_string())
    }
}

impl From<image::ImageError> for FractureError {
    fn from(e: image::ImageError) -> Self {
        FractureError::ImageLoad(PathBuf::new(), e.to_string())
    }
}

/// Convenience Result type for this crate
pub type Result<T> = std::result::Result<T, FractureError>;
