//! Built-in inference layers
//!
//! Each layer mirrors a Keras layer type and reads its weights in Keras
//! layout. Convolution and pooling run in Burn's NCHW layout internally;
//! inputs and outputs stay channels-last.

use burn::{
    nn::pool::{AvgPool2d, AvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    tensor::{backend::Backend, module::conv2d, ops::ConvOptions, Tensor},
};
use serde::Deserialize;

use super::artifact::LayerSpec;
use super::layer::{Activation, FeatureTensor, Layer};
use crate::utils::error::{Result, TomatoLeafError};

/// Integer or `[height, width]` pair, as Keras serializes kernel sizes and strides
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum Pair {
    One(usize),
    Two([usize; 2]),
}

impl Pair {
    pub fn get(self) -> [usize; 2] {
        match self {
            Pair::One(v) => [v, v],
            Pair::Two(v) => v,
        }
    }
}

/// Keras padding modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    #[default]
    Valid,
    Same,
}

fn one() -> Pair {
    Pair::One(1)
}

fn enabled() -> bool {
    true
}

fn check_channels_last(spec: &LayerSpec, data_format: &Option<String>) -> Result<()> {
    match data_format.as_deref() {
        None | Some("channels_last") => Ok(()),
        Some(other) => Err(TomatoLeafError::Artifact(format!(
            "layer '{}' uses data_format '{}', only channels_last is supported",
            spec.name, other
        ))),
    }
}

/// Kernel, stride, dilation or pool size with both entries non-zero
fn positive_pair(spec: &LayerSpec, field: &str, value: Pair) -> Result<[usize; 2]> {
    let value = value.get();
    if value.contains(&0) {
        return Err(TomatoLeafError::Artifact(format!(
            "layer '{}': {} must be positive, got {:?}",
            spec.name, field, value
        )));
    }
    Ok(value)
}

fn shape_error(layer: &str, reason: String) -> TomatoLeafError {
    TomatoLeafError::Shape {
        layer: layer.to_string(),
        reason,
    }
}

/// Keras "same" padding `(before, after)` for one spatial axis
pub fn same_padding(input: usize, kernel: usize, stride: usize, dilation: usize) -> (usize, usize) {
    let effective = (kernel - 1) * dilation + 1;
    let output = input.div_ceil(stride);
    let total = ((output.max(1) - 1) * stride + effective).saturating_sub(input);
    (total / 2, total - total / 2)
}

/// Zero-pad the two spatial axes of an NCHW tensor
fn pad_nchw<B: Backend>(
    x: Tensor<B, 4>,
    (top, bottom): (usize, usize),
    (left, right): (usize, usize),
) -> Tensor<B, 4> {
    if top + bottom + left + right == 0 {
        return x;
    }
    let [batch, channels, height, width] = x.dims();
    let padded = Tensor::zeros(
        [batch, channels, height + top + bottom, width + left + right],
        &x.device(),
    );
    padded.slice_assign(
        [0..batch, 0..channels, top..top + height, left..left + width],
        x,
    )
}

// ------------------------------------------------------------------------------------
// Conv2D
// ------------------------------------------------------------------------------------

#[derive(Deserialize)]
struct Conv2dSpec {
    filters: usize,
    kernel_size: Pair,
    #[serde(default = "one")]
    strides: Pair,
    #[serde(default)]
    padding: Padding,
    #[serde(default = "one")]
    dilation_rate: Pair,
    #[serde(default)]
    activation: Activation,
    #[serde(default = "enabled")]
    use_bias: bool,
    #[serde(default)]
    groups: Option<usize>,
    #[serde(default)]
    data_format: Option<String>,
}

/// 2-D convolution with optional bias and fused activation
#[derive(Debug)]
pub struct Conv2dLayer<B: Backend> {
    name: String,
    /// `[out, in, kh, kw]`
    weight: Tensor<B, 4>,
    bias: Option<Tensor<B, 1>>,
    in_channels: usize,
    kernel: [usize; 2],
    stride: [usize; 2],
    dilation: [usize; 2],
    padding: Padding,
    activation: Activation,
}

impl<B: Backend> Layer<B> for Conv2dLayer<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Conv2D"
    }

    fn forward(&self, input: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        let x = input.into_spatial(&self.name)?;
        let [_, height, width, channels] = x.dims();
        if channels != self.in_channels {
            return Err(shape_error(
                &self.name,
                format!("expected {} input channels, got {}", self.in_channels, channels),
            ));
        }

        let x = x.permute([0, 3, 1, 2]);
        let x = match self.padding {
            Padding::Valid => {
                let min_h = (self.kernel[0] - 1) * self.dilation[0] + 1;
                let min_w = (self.kernel[1] - 1) * self.dilation[1] + 1;
                if height < min_h || width < min_w {
                    return Err(shape_error(
                        &self.name,
                        format!("input {}x{} smaller than kernel {:?}", height, width, self.kernel),
                    ));
                }
                x
            }
            Padding::Same => pad_nchw(
                x,
                same_padding(height, self.kernel[0], self.stride[0], self.dilation[0]),
                same_padding(width, self.kernel[1], self.stride[1], self.dilation[1]),
            ),
        };

        let y = conv2d(
            x,
            self.weight.clone(),
            self.bias.clone(),
            ConvOptions::new(self.stride, [0, 0], self.dilation, 1),
        );
        let y = self.activation.apply(y.permute([0, 2, 3, 1]));
        Ok(FeatureTensor::Spatial(y))
    }

    fn emits_probabilities(&self) -> bool {
        self.activation == Activation::Softmax
    }
}

pub fn build_conv2d<B: Backend>(spec: &LayerSpec, device: &B::Device) -> Result<Box<dyn Layer<B>>> {
    let cfg: Conv2dSpec = spec.config_as()?;
    check_channels_last(spec, &cfg.data_format)?;
    if cfg.groups.unwrap_or(1) != 1 {
        return Err(TomatoLeafError::Artifact(format!(
            "layer '{}': grouped convolution is not supported",
            spec.name
        )));
    }

    let kernel = positive_pair(spec, "kernel_size", cfg.kernel_size)?;
    let stride = positive_pair(spec, "strides", cfg.strides)?;
    let dilation = positive_pair(spec, "dilation_rate", cfg.dilation_rate)?;
    let kernel_blob = spec.weight("kernel")?;
    if kernel_blob.shape.len() != 4 {
        return Err(TomatoLeafError::Weights {
            layer: spec.name.clone(),
            reason: format!("kernel must be [kh, kw, in, out], got {:?}", kernel_blob.shape),
        });
    }
    let in_channels = kernel_blob.shape[2];
    spec.weight_with_shape("kernel", &[kernel[0], kernel[1], in_channels, cfg.filters])?;

    // Keras [kh, kw, in, out] -> Burn [out, in, kh, kw]
    let weight = spec.tensor::<B, 4>("kernel", device)?.permute([3, 2, 0, 1]);
    let bias = if cfg.use_bias {
        spec.weight_with_shape("bias", &[cfg.filters])?;
        Some(spec.tensor::<B, 1>("bias", device)?)
    } else {
        None
    };

    Ok(Box::new(Conv2dLayer {
        name: spec.name.clone(),
        weight,
        bias,
        in_channels,
        kernel,
        stride,
        dilation,
        padding: cfg.padding,
        activation: cfg.activation,
    }))
}

// ------------------------------------------------------------------------------------
// Pooling
// ------------------------------------------------------------------------------------

#[derive(Deserialize)]
struct Pool2dSpec {
    #[serde(default = "two")]
    pool_size: Pair,
    #[serde(default)]
    strides: Option<Pair>,
    #[serde(default)]
    padding: Padding,
    #[serde(default)]
    data_format: Option<String>,
}

fn two() -> Pair {
    Pair::One(2)
}

#[derive(Debug)]
enum PoolOp {
    Max(MaxPool2d),
    Avg(AvgPool2d),
}

/// Windowed max or average pooling with "valid" padding
#[derive(Debug)]
pub struct Pool2dLayer {
    name: String,
    kind: &'static str,
    pool_size: [usize; 2],
    op: PoolOp,
}

impl<B: Backend> Layer<B> for Pool2dLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        self.kind
    }

    fn forward(&self, input: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        let x = input.into_spatial(&self.name)?;
        let [_, height, width, _] = x.dims();
        if height < self.pool_size[0] || width < self.pool_size[1] {
            return Err(shape_error(
                &self.name,
                format!("input {}x{} smaller than pool {:?}", height, width, self.pool_size),
            ));
        }

        let x = x.permute([0, 3, 1, 2]);
        let y = match &self.op {
            PoolOp::Max(pool) => pool.forward(x),
            PoolOp::Avg(pool) => pool.forward(x),
        };
        Ok(FeatureTensor::Spatial(y.permute([0, 2, 3, 1])))
    }
}

fn parse_pool(spec: &LayerSpec) -> Result<([usize; 2], [usize; 2])> {
    let cfg: Pool2dSpec = spec.config_as()?;
    check_channels_last(spec, &cfg.data_format)?;
    if cfg.padding == Padding::Same {
        return Err(TomatoLeafError::Artifact(format!(
            "layer '{}': 'same' padding is not supported for pooling",
            spec.name
        )));
    }
    let pool_size = positive_pair(spec, "pool_size", cfg.pool_size)?;
    let strides = match cfg.strides {
        Some(strides) => positive_pair(spec, "strides", strides)?,
        None => pool_size,
    };
    Ok((pool_size, strides))
}

pub fn build_max_pool2d<B: Backend>(
    spec: &LayerSpec,
    _device: &B::Device,
) -> Result<Box<dyn Layer<B>>> {
    let (pool_size, strides) = parse_pool(spec)?;
    Ok(Box::new(Pool2dLayer {
        name: spec.name.clone(),
        kind: "MaxPooling2D",
        pool_size,
        op: PoolOp::Max(MaxPool2dConfig::new(pool_size).with_strides(strides).init()),
    }))
}

pub fn build_avg_pool2d<B: Backend>(
    spec: &LayerSpec,
    _device: &B::Device,
) -> Result<Box<dyn Layer<B>>> {
    let (pool_size, strides) = parse_pool(spec)?;
    Ok(Box::new(Pool2dLayer {
        name: spec.name.clone(),
        kind: "AveragePooling2D",
        pool_size,
        op: PoolOp::Avg(AvgPool2dConfig::new(pool_size).with_strides(strides).init()),
    }))
}

/// Spatial reduction to one value per channel
#[derive(Debug)]
pub struct GlobalPool2dLayer {
    name: String,
    max: bool,
}

impl<B: Backend> Layer<B> for GlobalPool2dLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        if self.max {
            "GlobalMaxPooling2D"
        } else {
            "GlobalAveragePooling2D"
        }
    }

    fn forward(&self, input: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        let x = input.into_spatial(&self.name)?;
        let [batch, _, _, channels] = x.dims();
        let pooled = if self.max {
            x.max_dim(1).max_dim(2)
        } else {
            x.mean_dim(1).mean_dim(2)
        };
        Ok(FeatureTensor::Flat(pooled.reshape([batch, channels])))
    }
}

pub fn build_global_avg_pool2d<B: Backend>(
    spec: &LayerSpec,
    _device: &B::Device,
) -> Result<Box<dyn Layer<B>>> {
    Ok(Box::new(GlobalPool2dLayer {
        name: spec.name.clone(),
        max: false,
    }))
}

pub fn build_global_max_pool2d<B: Backend>(
    spec: &LayerSpec,
    _device: &B::Device,
) -> Result<Box<dyn Layer<B>>> {
    Ok(Box::new(GlobalPool2dLayer {
        name: spec.name.clone(),
        max: true,
    }))
}

// ------------------------------------------------------------------------------------
// BatchNormalization
// ------------------------------------------------------------------------------------

#[derive(Deserialize)]
struct BatchNormSpec {
    #[serde(default = "default_epsilon")]
    epsilon: f64,
    #[serde(default = "enabled")]
    center: bool,
    #[serde(default = "enabled")]
    scale: bool,
}

fn default_epsilon() -> f64 {
    1e-3
}

/// Inference batch norm folded into a per-channel affine transform
#[derive(Debug)]
pub struct BatchNormLayer<B: Backend> {
    name: String,
    channels: usize,
    /// `gamma / sqrt(var + eps)`
    scale: Tensor<B, 1>,
    /// `beta - mean * scale`
    shift: Tensor<B, 1>,
}

impl<B: Backend> Layer<B> for BatchNormLayer<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "BatchNormalization"
    }

    fn forward(&self, input: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        if input.channels() != self.channels {
            return Err(shape_error(
                &self.name,
                format!("expected {} channels, got {}", self.channels, input.channels()),
            ));
        }
        let c = self.channels;
        Ok(match input {
            FeatureTensor::Spatial(x) => FeatureTensor::Spatial(
                x * self.scale.clone().reshape([1, 1, 1, c]) + self.shift.clone().reshape([1, 1, 1, c]),
            ),
            FeatureTensor::Flat(x) => FeatureTensor::Flat(
                x * self.scale.clone().reshape([1, c]) + self.shift.clone().reshape([1, c]),
            ),
        })
    }
}

pub fn build_batch_norm<B: Backend>(
    spec: &LayerSpec,
    device: &B::Device,
) -> Result<Box<dyn Layer<B>>> {
    let cfg: BatchNormSpec = spec.config_as()?;
    let mean = &spec.weight("moving_mean")?.data;
    let channels = mean.len();
    let var = &spec.weight_with_shape("moving_variance", &[channels])?.data;
    let gamma = if cfg.scale {
        spec.weight_with_shape("gamma", &[channels])?.data.clone()
    } else {
        vec![1.0; channels]
    };
    let beta = if cfg.center {
        spec.weight_with_shape("beta", &[channels])?.data.clone()
    } else {
        vec![0.0; channels]
    };

    let scale: Vec<f32> = gamma
        .iter()
        .zip(var)
        .map(|(g, v)| (*g as f64 / (*v as f64 + cfg.epsilon).sqrt()) as f32)
        .collect();
    let shift: Vec<f32> = beta
        .iter()
        .zip(mean)
        .zip(&scale)
        .map(|((b, m), s)| b - m * s)
        .collect();

    Ok(Box::new(BatchNormLayer {
        name: spec.name.clone(),
        channels,
        scale: Tensor::from_floats(scale.as_slice(), device),
        shift: Tensor::from_floats(shift.as_slice(), device),
    }))
}

// ------------------------------------------------------------------------------------
// Dense
// ------------------------------------------------------------------------------------

#[derive(Deserialize)]
struct DenseSpec {
    units: usize,
    #[serde(default)]
    activation: Activation,
    #[serde(default = "enabled")]
    use_bias: bool,
}

/// Fully connected layer
#[derive(Debug)]
pub struct DenseLayer<B: Backend> {
    name: String,
    /// `[in, units]`
    kernel: Tensor<B, 2>,
    bias: Option<Tensor<B, 2>>,
    in_features: usize,
    activation: Activation,
}

impl<B: Backend> Layer<B> for DenseLayer<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Dense"
    }

    fn forward(&self, input: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        let x = input.into_flat(&self.name)?;
        let [_, features] = x.dims();
        if features != self.in_features {
            return Err(shape_error(
                &self.name,
                format!("expected {} input features, got {}", self.in_features, features),
            ));
        }

        let y = x.matmul(self.kernel.clone());
        let y = match &self.bias {
            Some(bias) => y + bias.clone(),
            None => y,
        };
        Ok(FeatureTensor::Flat(self.activation.apply(y)))
    }

    fn emits_probabilities(&self) -> bool {
        self.activation == Activation::Softmax
    }
}

pub fn build_dense<B: Backend>(spec: &LayerSpec, device: &B::Device) -> Result<Box<dyn Layer<B>>> {
    let cfg: DenseSpec = spec.config_as()?;
    let kernel_blob = spec.weight("kernel")?;
    let in_features = kernel_blob.shape.first().copied().unwrap_or(0);
    spec.weight_with_shape("kernel", &[in_features, cfg.units])?;

    let kernel = spec.tensor::<B, 2>("kernel", device)?;
    let bias = if cfg.use_bias {
        spec.weight_with_shape("bias", &[cfg.units])?;
        Some(spec.tensor::<B, 1>("bias", device)?.reshape([1, cfg.units]))
    } else {
        None
    };

    Ok(Box::new(DenseLayer {
        name: spec.name.clone(),
        kernel,
        bias,
        in_features,
        activation: cfg.activation,
    }))
}

// ------------------------------------------------------------------------------------
// Shape and element-wise layers
// ------------------------------------------------------------------------------------

#[derive(Deserialize)]
struct ActivationSpec {
    activation: Activation,
}

/// Standalone activation
#[derive(Debug)]
pub struct ActivationLayer {
    name: String,
    activation: Activation,
}

impl<B: Backend> Layer<B> for ActivationLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Activation"
    }

    fn forward(&self, input: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        Ok(self.activation.apply_features(input))
    }

    fn emits_probabilities(&self) -> bool {
        self.activation == Activation::Softmax
    }
}

pub fn build_activation<B: Backend>(
    spec: &LayerSpec,
    _device: &B::Device,
) -> Result<Box<dyn Layer<B>>> {
    let cfg: ActivationSpec = spec.config_as()?;
    Ok(Box::new(ActivationLayer {
        name: spec.name.clone(),
        activation: cfg.activation,
    }))
}

/// `[B, H, W, C]` -> `[B, H*W*C]` in channels-last order
#[derive(Debug)]
pub struct FlattenLayer {
    name: String,
}

impl<B: Backend> Layer<B> for FlattenLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Flatten"
    }

    fn forward(&self, input: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        Ok(match input {
            FeatureTensor::Spatial(x) => {
                let [batch, height, width, channels] = x.dims();
                FeatureTensor::Flat(x.reshape([batch, height * width * channels]))
            }
            flat @ FeatureTensor::Flat(_) => flat,
        })
    }
}

pub fn build_flatten<B: Backend>(spec: &LayerSpec, _device: &B::Device) -> Result<Box<dyn Layer<B>>> {
    Ok(Box::new(FlattenLayer {
        name: spec.name.clone(),
    }))
}

#[derive(Deserialize)]
struct RescalingSpec {
    scale: f32,
    #[serde(default)]
    offset: f32,
}

/// `x * scale + offset`
#[derive(Debug)]
pub struct RescalingLayer {
    name: String,
    scale: f32,
    offset: f32,
}

impl<B: Backend> Layer<B> for RescalingLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Rescaling"
    }

    fn forward(&self, input: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        Ok(match input {
            FeatureTensor::Spatial(x) => {
                FeatureTensor::Spatial(x.mul_scalar(self.scale).add_scalar(self.offset))
            }
            FeatureTensor::Flat(x) => {
                FeatureTensor::Flat(x.mul_scalar(self.scale).add_scalar(self.offset))
            }
        })
    }
}

pub fn build_rescaling<B: Backend>(
    spec: &LayerSpec,
    _device: &B::Device,
) -> Result<Box<dyn Layer<B>>> {
    let cfg: RescalingSpec = spec.config_as()?;
    Ok(Box::new(RescalingLayer {
        name: spec.name.clone(),
        scale: cfg.scale,
        offset: cfg.offset,
    }))
}

/// Pass-through for layers with no effect at inference (input markers, dropout)
#[derive(Debug)]
pub struct IdentityLayer {
    name: String,
    kind: &'static str,
}

impl<B: Backend> Layer<B> for IdentityLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        self.kind
    }

    fn forward(&self, input: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        Ok(input)
    }
}

pub fn build_input<B: Backend>(spec: &LayerSpec, _device: &B::Device) -> Result<Box<dyn Layer<B>>> {
    Ok(Box::new(IdentityLayer {
        name: spec.name.clone(),
        kind: "InputLayer",
    }))
}

pub fn build_dropout<B: Backend>(spec: &LayerSpec, _device: &B::Device) -> Result<Box<dyn Layer<B>>> {
    Ok(Box::new(IdentityLayer {
        name: spec.name.clone(),
        kind: "Dropout",
    }))
}
