//! Serialized model format
//!
//! A trained network is stored as a JSON document describing a sequential
//! layer stack. Each layer carries its type name (Keras class names), its
//! configuration and its weight tensors in Keras layout:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "name": "tomato_dual_eca",
//!   "input_shape": [128, 128, 3],
//!   "layers": [
//!     { "class_name": "Conv2D", "name": "conv2d",
//!       "config": { "filters": 32, "kernel_size": 3, "padding": "same", "activation": "relu" },
//!       "weights": { "kernel": { "shape": [3, 3, 3, 32], "data": [...] },
//!                    "bias":   { "shape": [32], "data": [...] } } },
//!     { "class_name": "DualECALayer", "name": "dual_eca",
//!       "config": { "k_size": 5 },
//!       "weights": { "conv1d_sigmoid": { "shape": [5, 1, 1], "data": [...] },
//!                    "conv1d_tanh":    { "shape": [5, 1, 1], "data": [...] } } }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::utils::error::{Result, ResultExt, TomatoLeafError};

/// Artifact format understood by this crate
pub const FORMAT_VERSION: u32 = 1;

/// A tensor stored as shape + row-major data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightBlob {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl WeightBlob {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    /// Number of elements implied by the shape
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check that the data length matches the shape
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.num_elements() != self.data.len() {
            return Err(format!(
                "shape {:?} needs {} values but {} were stored",
                self.shape,
                self.num_elements(),
                self.data.len()
            ));
        }
        Ok(())
    }

    /// Build a rank-`D` tensor on `device`
    pub fn to_tensor<B: Backend, const D: usize>(
        &self,
        device: &B::Device,
    ) -> std::result::Result<Tensor<B, D>, String> {
        if self.shape.len() != D {
            return Err(format!(
                "expected a rank-{} tensor, got shape {:?}",
                D, self.shape
            ));
        }
        self.validate()?;
        let data = TensorData::new(self.data.clone(), self.shape.clone());
        Ok(Tensor::from_data(data, device))
    }
}

/// One layer of the serialized graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Layer type, looked up in the registry
    pub class_name: String,
    /// Instance name, used in error messages and summaries
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub weights: BTreeMap<String, WeightBlob>,
}

impl LayerSpec {
    pub fn new(class_name: &str, name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            name: name.to_string(),
            config: serde_json::Value::Null,
            weights: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_weight(mut self, key: &str, blob: WeightBlob) -> Self {
        self.weights.insert(key.to_string(), blob);
        self
    }

    /// Deserialize the layer configuration; a missing config reads as `{}`
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T> {
        let value = match &self.config {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(value)
            .with_context(|| format!("bad config for layer '{}' ({})", self.name, self.class_name))
    }

    /// Look up a weight tensor, failing with a layer-scoped error
    pub fn weight(&self, key: &str) -> Result<&WeightBlob> {
        self.weights.get(key).ok_or_else(|| TomatoLeafError::Weights {
            layer: self.name.clone(),
            reason: format!("missing '{}'", key),
        })
    }

    /// Look up a weight tensor and require an exact shape
    pub fn weight_with_shape(&self, key: &str, shape: &[usize]) -> Result<&WeightBlob> {
        let blob = self.weight(key)?;
        if blob.shape != shape {
            return Err(TomatoLeafError::Weights {
                layer: self.name.clone(),
                reason: format!("'{}' has shape {:?}, expected {:?}", key, blob.shape, shape),
            });
        }
        blob.validate().map_err(|reason| TomatoLeafError::Weights {
            layer: self.name.clone(),
            reason: format!("'{}' {}", key, reason),
        })?;
        Ok(blob)
    }

    /// Load a weight tensor of rank `D` onto `device`
    pub fn tensor<B: Backend, const D: usize>(
        &self,
        key: &str,
        device: &B::Device,
    ) -> Result<Tensor<B, D>> {
        self.weight(key)?
            .to_tensor(device)
            .map_err(|reason| TomatoLeafError::Weights {
                layer: self.name.clone(),
                reason: format!("'{}' {}", key, reason),
            })
    }
}

/// A complete serialized network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub name: String,
    /// Expected input as [height, width, channels]
    pub input_shape: [usize; 3],
    pub layers: Vec<LayerSpec>,
}

impl ModelArtifact {
    pub fn new(name: &str, input_shape: [usize; 3]) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            name: name.to_string(),
            input_shape,
            layers: Vec::new(),
        }
    }

    pub fn with_layer(mut self, layer: LayerSpec) -> Self {
        self.layers.push(layer);
        self
    }

    /// Parse an artifact from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: Self = serde_json::from_str(json)?;
        artifact.check_version()?;
        Ok(artifact)
    }

    /// Load an artifact from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TomatoLeafError::PathNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save the artifact as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn check_version(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(TomatoLeafError::Artifact(format!(
                "unsupported format_version {} (expected {})",
                self.format_version, FORMAT_VERSION
            )));
        }
        if self.layers.is_empty() {
            return Err(TomatoLeafError::Artifact("artifact has no layers".to_string()));
        }
        Ok(())
    }

    /// Distinct layer types used by this artifact
    pub fn layer_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.layers.iter().map(|l| l.class_name.as_str()).collect();
        types.sort_unstable();
        types.dedup();
        types
    }

    /// Total number of stored weight values
    pub fn num_parameters(&self) -> usize {
        self.layers
            .iter()
            .flat_map(|l| l.weights.values())
            .map(|w| w.data.len())
            .sum()
    }
}
