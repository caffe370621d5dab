//! Inference module: image preprocessing and prediction
//!
//! This module provides:
//! - Decoding and normalization of uploaded images
//! - Single image prediction with disease guidance attached

pub mod predictor;
pub mod preprocess;

// Re-export main types for convenience
pub use predictor::{Prediction, PredictionResult, Predictor};
pub use preprocess::{ImagePreprocessor, NormalizedImage, DEFAULT_IMAGE_SIZE};
