//! Training module for the fracture classifier
//!
//! This module provides:
//! - The supervised training loop with Burn
//! - Reduce-on-plateau learning rate scheduling
//! - Epoch history and final test reporting

pub mod scheduler;
pub mod supervised;

// Re-export main types for convenience
pub use scheduler::{PlateauConfig, ReduceLrOnPlateau};
pub use supervised::{evaluate, train_model, EpochMetrics, EvalResult, TrainingReport};
