//! Model module: serialized graph loading and the Dual ECA classifier
//!
//! This module provides:
//! - The JSON model artifact format
//! - Built-in Keras-style inference layers and the Dual ECA attention block
//! - A layer registry used to rebuild graphs from artifacts
//! - The loaded classifier with its input/output checks

pub mod artifact;
pub mod classifier;
pub mod config;
pub mod eca;
pub mod layer;
pub mod layers;
pub mod registry;

// Re-export main types for convenience
pub use artifact::{LayerSpec, ModelArtifact, WeightBlob};
pub use classifier::{LayerSummary, TomatoClassifier};
pub use config::ClassifierConfig;
pub use eca::{DualEcaConfig, DualEcaLayer, DUAL_ECA_LAYER};
pub use layer::{Activation, FeatureTensor, Layer};
pub use registry::{default_registry, LayerFactory, LayerRegistry};

/// Default artifact location, relative to the working directory
pub const DEFAULT_MODEL_PATH: &str = "model/model.json";

#[cfg(test)]
pub(crate) mod fixtures {
    use super::artifact::{LayerSpec, ModelArtifact, WeightBlob};
    use super::eca::{DUAL_ECA_LAYER, SIGMOID_KERNEL, TANH_KERNEL};
    use serde_json::json;

    /// DualECA -> global average pool -> Dense(10), for `[size, size, 3]` input
    pub fn tiny_artifact(size: usize) -> ModelArtifact {
        let kernel: Vec<f32> = (0..60).map(|i| ((i % 7) as f32 - 3.0) * 0.1).collect();
        let bias: Vec<f32> = (0..10).map(|i| i as f32 * 0.05).collect();

        ModelArtifact::new("tiny_dual_eca", [size, size, 3])
            .with_layer(
                LayerSpec::new(DUAL_ECA_LAYER, "dual_eca")
                    .with_config(json!({ "k_size": 5 }))
                    .with_weight(
                        SIGMOID_KERNEL,
                        WeightBlob::new(vec![5, 1, 1], vec![0.1, 0.2, 0.4, 0.2, 0.1]),
                    )
                    .with_weight(
                        TANH_KERNEL,
                        WeightBlob::new(vec![5, 1, 1], vec![-0.3, 0.0, 0.8, 0.0, 0.3]),
                    ),
            )
            .with_layer(LayerSpec::new("GlobalAveragePooling2D", "gap"))
            .with_layer(
                LayerSpec::new("Dense", "predictions")
                    .with_config(json!({ "units": 10 }))
                    .with_weight("kernel", WeightBlob::new(vec![6, 10], kernel))
                    .with_weight("bias", WeightBlob::new(vec![10], bias)),
            )
    }
}
