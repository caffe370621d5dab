//! Dual Efficient Channel Attention (Dual ECA)
//!
//! The block squeezes a feature map to one mean per channel, runs two
//! independent bias-free 1-D convolutions and uses the results as gates:
//!
//! ```text
//! x: [B, H, W, C]
//!   -> spatial mean                  [B, C]
//!   -> conv1d(k) + sigmoid           [B, C]  -> x * gate  (scale1)
//!   -> conv1d(k) + tanh              [B, C]  -> x * gate  (scale2)
//!   -> concat(scale1, scale2, axis=C)  [B, H, W, 2C]
//! ```
//!
//! Two kernel layouts load:
//!
//! - `[k, 1, 1]`: the channel axis is the sequence. The kernel slides along
//!   it with "same" padding and each channel gets its own gate.
//! - `[k, C, 1]`: the squeeze is a length-1 sequence of `C` features, as
//!   exported by Keras `Conv1D(filters=1)`. Only the centre tap sees data, so
//!   the gate is one scalar per sample, `Σ_c mean_c · w[k/2, c]`, shared by
//!   every channel.
//!
//! The layer doubles the channel depth; the layers after it in a trained
//! network expect `2C` channels.

use burn::{
    config::Config,
    tensor::{activation, backend::Backend, module::conv1d, ops::ConvOptions, Tensor},
};
use serde::Deserialize;

use super::artifact::LayerSpec;
use super::layer::{FeatureTensor, Layer};
use crate::utils::error::{self, TomatoLeafError};

/// Registry name of the layer, as written in serialized graphs
pub const DUAL_ECA_LAYER: &str = "DualECALayer";

/// Weight key of the sigmoid-path kernel
pub const SIGMOID_KERNEL: &str = "conv1d_sigmoid";

/// Weight key of the tanh-path kernel
pub const TANH_KERNEL: &str = "conv1d_tanh";

/// Configuration for [`DualEcaLayer`]
#[derive(Config, Debug)]
pub struct DualEcaConfig {
    /// Width of the channel convolution
    #[config(default = "5")]
    pub k_size: usize,
}

impl DualEcaConfig {
    pub fn validate(&self) -> error::Result<()> {
        if self.k_size == 0 || self.k_size % 2 == 0 {
            return Err(TomatoLeafError::Config(format!(
                "DualECA k_size must be a positive odd number, got {}",
                self.k_size
            )));
        }
        Ok(())
    }

    /// Build the layer from two flattened Keras Conv1D kernels.
    ///
    /// A kernel of `k` values is read as `[k, 1, 1]`; one of `k * C` values
    /// as `[k, C, 1]`.
    pub fn init<B: Backend>(
        &self,
        name: &str,
        sigmoid_kernel: &[f32],
        tanh_kernel: &[f32],
        device: &B::Device,
    ) -> error::Result<DualEcaLayer<B>> {
        self.validate()?;

        Ok(DualEcaLayer {
            name: name.to_string(),
            gate_sigmoid: self.gate_kernel(name, SIGMOID_KERNEL, sigmoid_kernel, device)?,
            gate_tanh: self.gate_kernel(name, TANH_KERNEL, tanh_kernel, device)?,
        })
    }

    fn gate_kernel<B: Backend>(
        &self,
        name: &str,
        key: &str,
        values: &[f32],
        device: &B::Device,
    ) -> error::Result<GateKernel<B>> {
        let k = self.k_size;
        if values.is_empty() || values.len() % k != 0 {
            return Err(TomatoLeafError::Weights {
                layer: name.to_string(),
                reason: format!(
                    "'{}' has {} values, expected a multiple of k_size = {}",
                    key,
                    values.len(),
                    k
                ),
            });
        }

        let features = values.len() / k;
        if features == 1 {
            // Keras [k, in=1, out=1] and Burn [out=1, in=1, k] share the same
            // element order when both channel counts are 1.
            let kernel = Tensor::<B, 1>::from_floats(values, device).reshape([1, 1, k]);
            return Ok(GateKernel::Sequence {
                kernel,
                padding: (k - 1) / 2,
            });
        }

        // Row `k / 2` of the [k, C] view holds the taps that meet the data
        let centre = k / 2;
        let taps = &values[centre * features..(centre + 1) * features];
        let weights = Tensor::<B, 1>::from_floats(taps, device).reshape([features, 1]);
        Ok(GateKernel::Features { weights, features })
    }
}

/// One attention path's convolution
#[derive(Debug)]
enum GateKernel<B: Backend> {
    /// `[1, 1, k]`, slid along the channel sequence
    Sequence { kernel: Tensor<B, 3>, padding: usize },
    /// `[C, 1]` centre taps of a `[k, C, 1]` kernel
    Features { weights: Tensor<B, 2>, features: usize },
}

impl<B: Backend> GateKernel<B> {
    /// Pre-activation gate, `[B, C]` in and out
    fn apply(&self, squeeze: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, channels] = squeeze.dims();
        match self {
            GateKernel::Sequence { kernel, padding } => conv1d(
                squeeze.reshape([batch, 1, channels]),
                kernel.clone(),
                None,
                ConvOptions::new([1], [*padding], [1], 1),
            )
            .reshape([batch, channels]),
            GateKernel::Features { weights, .. } => {
                squeeze.matmul(weights.clone()).repeat_dim(1, channels)
            }
        }
    }

    fn required_channels(&self) -> Option<usize> {
        match self {
            GateKernel::Sequence { .. } => None,
            GateKernel::Features { features, .. } => Some(*features),
        }
    }
}

/// Dual channel attention: sigmoid-gated and tanh-gated copies, concatenated
#[derive(Debug)]
pub struct DualEcaLayer<B: Backend> {
    name: String,
    gate_sigmoid: GateKernel<B>,
    gate_tanh: GateKernel<B>,
}

impl<B: Backend> DualEcaLayer<B> {
    /// Per-channel gates `(sigmoid, tanh)`, each `[B, C]`
    pub fn attention_gates(&self, x: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [batch, _, _, channels] = x.dims();
        let squeeze = x.mean_dim(1).mean_dim(2).reshape([batch, channels]);

        let gate_sigmoid = activation::sigmoid(self.gate_sigmoid.apply(squeeze.clone()));
        let gate_tanh = self.gate_tanh.apply(squeeze).tanh();
        (gate_sigmoid, gate_tanh)
    }

    /// `[B, H, W, C]` -> `[B, H, W, 2C]`
    pub fn forward_map(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, _, _, channels] = x.dims();
        let (gate_sigmoid, gate_tanh) = self.attention_gates(x.clone());

        let scale_sigmoid = x.clone() * gate_sigmoid.reshape([batch, 1, 1, channels]);
        let scale_tanh = x * gate_tanh.reshape([batch, 1, 1, channels]);

        Tensor::cat(vec![scale_sigmoid, scale_tanh], 3)
    }
}

impl<B: Backend> Layer<B> for DualEcaLayer<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        DUAL_ECA_LAYER
    }

    fn forward(&self, input: FeatureTensor<B>) -> error::Result<FeatureTensor<B>> {
        let x = input.into_spatial(&self.name)?;
        let [_, _, _, channels] = x.dims();
        for gate in [&self.gate_sigmoid, &self.gate_tanh] {
            if let Some(expected) = gate.required_channels() {
                if expected != channels {
                    return Err(TomatoLeafError::Shape {
                        layer: self.name.clone(),
                        reason: format!("kernel expects {} channels, got {}", expected, channels),
                    });
                }
            }
        }
        Ok(FeatureTensor::Spatial(self.forward_map(x)))
    }
}

#[derive(Deserialize)]
struct DualEcaSpec {
    #[serde(default = "default_k_size")]
    k_size: usize,
}

fn default_k_size() -> usize {
    5
}

/// Registry factory for [`DUAL_ECA_LAYER`]
pub fn build_dual_eca<B: Backend>(
    spec: &LayerSpec,
    device: &B::Device,
) -> error::Result<Box<dyn Layer<B>>> {
    let parsed: DualEcaSpec = spec.config_as()?;
    let config = DualEcaConfig::new().with_k_size(parsed.k_size);
    config.validate()?;

    let mut kernels = Vec::with_capacity(2);
    for key in [SIGMOID_KERNEL, TANH_KERNEL] {
        let shape = spec.weight(key)?.shape.clone();
        let layout_ok = shape.len() == 3 && shape[0] == config.k_size && shape[1] > 0 && shape[2] == 1;
        if !layout_ok {
            return Err(TomatoLeafError::Weights {
                layer: spec.name.clone(),
                reason: format!(
                    "'{}' has shape {:?}, expected [{}, 1, 1] or [{}, channels, 1]",
                    key, shape, config.k_size, config.k_size
                ),
            });
        }
        let blob = spec.weight_with_shape(key, &shape)?;
        kernels.push(blob.data.as_slice());
    }

    let layer = config.init::<B>(&spec.name, kernels[0], kernels[1], device)?;
    Ok(Box::new(layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::artifact::WeightBlob;
    use serde_json::json;

    type TestBackend = crate::backend::DefaultBackend;

    const IDENTITY: [f32; 5] = [0.0, 0.0, 1.0, 0.0, 0.0];

    fn values(t: Tensor<TestBackend, 4>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    fn sigmoid(x: f32) -> f32 {
        1.0 / (1.0 + (-x).exp())
    }

    #[test]
    fn test_output_doubles_channels() {
        let device = Default::default();
        let layer = DualEcaConfig::new()
            .init::<TestBackend>("eca", &IDENTITY, &IDENTITY, &device)
            .unwrap();

        for (b, h, w, c) in [(1, 8, 8, 3), (2, 4, 5, 16), (3, 1, 1, 1)] {
            let x = Tensor::<TestBackend, 4>::ones([b, h, w, c], &device);
            assert_eq!(layer.forward_map(x).dims(), [b, h, w, 2 * c]);
        }
    }

    #[test]
    fn test_identity_kernel_gates_by_channel_mean() {
        let device = Default::default();
        let layer = DualEcaConfig::new()
            .init::<TestBackend>("eca", &IDENTITY, &IDENTITY, &device)
            .unwrap();

        let x = Tensor::<TestBackend, 4>::ones([1, 2, 2, 2], &device);
        let out = values(layer.forward_map(x));

        let sig = sigmoid(1.0);
        let tanh = 1.0f32.tanh();
        // NHWC: each pixel holds [sig, sig, tanh, tanh]
        for pixel in out.chunks(4) {
            assert!((pixel[0] - sig).abs() < 1e-5);
            assert!((pixel[1] - sig).abs() < 1e-5);
            assert!((pixel[2] - tanh).abs() < 1e-5);
            assert!((pixel[3] - tanh).abs() < 1e-5);
        }
    }

    #[test]
    fn test_kernel_slides_along_channels() {
        let device = Default::default();
        // Each gate reads the channel to its left; channel 0 sees zero padding.
        let shift = [0.0, 1.0, 0.0, 0.0, 0.0];
        let layer = DualEcaConfig::new()
            .init::<TestBackend>("eca", &shift, &shift, &device)
            .unwrap();

        let x = Tensor::<TestBackend, 4>::from_floats([[[[2.0, 4.0, 6.0]]]], &device);
        let (gate_sigmoid, gate_tanh) = layer.attention_gates(x);
        let sig: Vec<f32> = gate_sigmoid.into_data().to_vec().unwrap();
        let tanh: Vec<f32> = gate_tanh.into_data().to_vec().unwrap();

        assert!((sig[0] - 0.5).abs() < 1e-5);
        assert!((sig[1] - sigmoid(2.0)).abs() < 1e-5);
        assert!((tanh[0]).abs() < 1e-6);
        assert!((tanh[2] - 4.0f32.tanh()).abs() < 1e-5);
    }

    #[test]
    fn test_feature_kernel_shares_one_gate() {
        let device = Default::default();
        // [3, 2, 1] kernel, rows are taps; only the middle row reaches the data
        let kernel = [9.0, 9.0, 0.5, 0.25, -9.0, -9.0];
        let layer = DualEcaConfig::new()
            .with_k_size(3)
            .init::<TestBackend>("eca", &kernel, &kernel, &device)
            .unwrap();

        let x = Tensor::<TestBackend, 4>::from_floats([[[[2.0, 4.0]]]], &device);
        let out = values(layer.forward_map(x));

        // 2 * 0.5 + 4 * 0.25 = 2
        let sig = sigmoid(2.0);
        let tanh = 2.0f32.tanh();
        let expected = [2.0 * sig, 4.0 * sig, 2.0 * tanh, 4.0 * tanh];
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{} != {}", got, want);
        }
    }

    #[test]
    fn test_paths_are_independent() {
        let device = Default::default();
        let layer = DualEcaConfig::new()
            .init::<TestBackend>(
                "eca",
                &[0.1, -0.2, 0.7, 0.3, 0.05],
                &[-0.4, 0.2, -0.9, 0.1, 0.6],
                &device,
            )
            .unwrap();

        let x = Tensor::<TestBackend, 4>::random(
            [1, 4, 4, 6],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let out = layer.forward_map(x);
        let [_, _, _, depth] = out.dims();
        let half = depth / 2;

        let first = values(out.clone().slice([0..1, 0..4, 0..4, 0..half]));
        let second = values(out.slice([0..1, 0..4, 0..4, half..depth]));
        let max_diff = first
            .iter()
            .zip(&second)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_diff > 1e-3);
    }

    #[test]
    fn test_rejects_even_kernel() {
        let device = Default::default();
        let result = DualEcaConfig::new()
            .with_k_size(4)
            .init::<TestBackend>("eca", &[0.0; 4], &[0.0; 4], &device);
        assert!(result.is_err());
    }

    #[test]
    fn test_factory_reads_channel_sequence_kernels() {
        let device = Default::default();
        let spec = LayerSpec::new(DUAL_ECA_LAYER, "dual_eca")
            .with_config(json!({ "k_size": 5, "trainable": true }))
            .with_weight(SIGMOID_KERNEL, WeightBlob::new(vec![5, 1, 1], IDENTITY.to_vec()))
            .with_weight(TANH_KERNEL, WeightBlob::new(vec![5, 1, 1], IDENTITY.to_vec()));

        let layer = build_dual_eca::<TestBackend>(&spec, &device).unwrap();
        assert_eq!(layer.kind(), DUAL_ECA_LAYER);

        let x = FeatureTensor::Spatial(Tensor::<TestBackend, 4>::ones([1, 3, 3, 4], &device));
        assert_eq!(layer.forward(x).unwrap().shape(), vec![1, 3, 3, 8]);
    }

    #[test]
    fn test_factory_reads_keras_feature_kernels() {
        let device = Default::default();
        let kernel: Vec<f32> = (0..15).map(|i| i as f32 * 0.01).collect();
        let spec = LayerSpec::new(DUAL_ECA_LAYER, "dual_eca")
            .with_config(json!({ "k_size": 5 }))
            .with_weight(SIGMOID_KERNEL, WeightBlob::new(vec![5, 3, 1], kernel.clone()))
            .with_weight(TANH_KERNEL, WeightBlob::new(vec![5, 3, 1], kernel));

        let layer = build_dual_eca::<TestBackend>(&spec, &device).unwrap();
        let x = FeatureTensor::Spatial(Tensor::<TestBackend, 4>::ones([2, 4, 4, 3], &device));
        assert_eq!(layer.forward(x).unwrap().shape(), vec![2, 4, 4, 6]);

        let wrong = FeatureTensor::Spatial(Tensor::<TestBackend, 4>::ones([1, 4, 4, 5], &device));
        assert!(matches!(layer.forward(wrong), Err(TomatoLeafError::Shape { .. })));
    }

    #[test]
    fn test_factory_rejects_unknown_kernel_layout() {
        let device = Default::default();
        for shape in [vec![5, 3], vec![3, 1, 1], vec![5, 1, 2]] {
            let len: usize = shape.iter().product();
            let spec = LayerSpec::new(DUAL_ECA_LAYER, "dual_eca")
                .with_weight(SIGMOID_KERNEL, WeightBlob::new(shape.clone(), vec![0.0; len]))
                .with_weight(TANH_KERNEL, WeightBlob::new(shape, vec![0.0; len]));

            let err = build_dual_eca::<TestBackend>(&spec, &device).err().unwrap();
            assert!(matches!(err, TomatoLeafError::Weights { .. }));
        }
    }

    #[test]
    fn test_factory_requires_both_kernels() {
        let device = Default::default();
        let spec = LayerSpec::new(DUAL_ECA_LAYER, "dual_eca")
            .with_weight(SIGMOID_KERNEL, WeightBlob::new(vec![5, 1, 1], IDENTITY.to_vec()));
        assert!(build_dual_eca::<TestBackend>(&spec, &device).is_err());
    }
}
