//! # Tomato Leaf Disease Classification
//!
//! A Rust library for classifying tomato leaf diseases with a convolutional
//! network augmented by a Dual Efficient Channel Attention block, running on
//! the Burn framework.
//!
//! ## Modules
//!
//! - `inference`: Image preprocessing and the prediction service
//! - `model`: Model artifact loading, layer registry, Dual ECA and the classifier
//! - `labels`: The 10 class labels in model output order
//! - `knowledge`: Static cause and recommendation text per class
//! - `backend`: Backend selection (NdArray CPU or CUDA)
//! - `utils`: Logging, errors, and helper functions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tomato_leaf::backend::{default_device, DefaultBackend};
//! use tomato_leaf::inference::Predictor;
//!
//! let device = default_device();
//! let predictor = Predictor::<DefaultBackend>::load("model/model.json".as_ref(), &device)?;
//! let result = predictor.predict_bytes(&std::fs::read("leaf.jpg")?)?;
//! println!("{} ({:.2}%)", result.disease, result.confidence);
//! ```

pub mod backend;
pub mod inference;
pub mod knowledge;
pub mod labels;
pub mod model;
pub mod utils;

// Re-export commonly used items for convenience
pub use inference::{ImagePreprocessor, NormalizedImage, Prediction, PredictionResult, Predictor};
pub use knowledge::{DiseaseCatalog, DiseaseInfo};
pub use labels::{CLASS_NAMES, NUM_CLASSES};
pub use model::{ClassifierConfig, LayerRegistry, ModelArtifact, TomatoClassifier};
pub use utils::error::{Result, TomatoLeafError};
