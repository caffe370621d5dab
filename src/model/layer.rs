//! Layer abstraction for the sequential inference graph
//!
//! Feature maps flow through the graph channels-last, `[batch, height, width,
//! channels]`, the same layout the preprocessor produces. Layers that flatten
//! switch to `[batch, features]`.

use burn::tensor::{activation, backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, TomatoLeafError};

/// Activation flowing between layers
#[derive(Debug, Clone)]
pub enum FeatureTensor<B: Backend> {
    /// `[batch, height, width, channels]`
    Spatial(Tensor<B, 4>),
    /// `[batch, features]`
    Flat(Tensor<B, 2>),
}

impl<B: Backend> FeatureTensor<B> {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            FeatureTensor::Spatial(t) => t.dims().to_vec(),
            FeatureTensor::Flat(t) => t.dims().to_vec(),
        }
    }

    /// Size of the last axis
    pub fn channels(&self) -> usize {
        match self {
            FeatureTensor::Spatial(t) => t.dims()[3],
            FeatureTensor::Flat(t) => t.dims()[1],
        }
    }

    /// Unwrap a feature map, or fail naming `layer`
    pub fn into_spatial(self, layer: &str) -> Result<Tensor<B, 4>> {
        match self {
            FeatureTensor::Spatial(t) => Ok(t),
            FeatureTensor::Flat(t) => Err(TomatoLeafError::Shape {
                layer: layer.to_string(),
                reason: format!("expected a 4-D feature map, got {:?}", t.dims()),
            }),
        }
    }

    /// Unwrap a flat tensor, or fail naming `layer`
    pub fn into_flat(self, layer: &str) -> Result<Tensor<B, 2>> {
        match self {
            FeatureTensor::Flat(t) => Ok(t),
            FeatureTensor::Spatial(t) => Err(TomatoLeafError::Shape {
                layer: layer.to_string(),
                reason: format!("expected a 2-D tensor, got {:?}", t.dims()),
            }),
        }
    }
}

/// A computation step rebuilt from a [`LayerSpec`](super::artifact::LayerSpec)
///
/// Layers are immutable after construction and shared across request threads.
pub trait Layer<B: Backend>: Send + Sync {
    /// Instance name from the artifact
    fn name(&self) -> &str;

    /// Layer type name as registered
    fn kind(&self) -> &'static str;

    fn forward(&self, input: FeatureTensor<B>) -> Result<FeatureTensor<B>>;

    /// True when the output is already a softmax distribution
    fn emits_probabilities(&self) -> bool {
        false
    }
}

/// Element-wise activation functions (Keras names)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    /// Softmax over the last axis
    Softmax,
    #[serde(alias = "silu")]
    Swish,
    Gelu,
}

impl Activation {
    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Linear => x,
            Activation::Relu => activation::relu(x),
            Activation::Sigmoid => activation::sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::Softmax => activation::softmax(x, D - 1),
            Activation::Swish => activation::silu(x),
            Activation::Gelu => activation::gelu(x),
        }
    }

    /// Apply to either tensor rank
    pub fn apply_features<B: Backend>(&self, x: FeatureTensor<B>) -> FeatureTensor<B> {
        match x {
            FeatureTensor::Spatial(t) => FeatureTensor::Spatial(self.apply(t)),
            FeatureTensor::Flat(t) => FeatureTensor::Flat(self.apply(t)),
        }
    }
}
