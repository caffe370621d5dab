//! Attention-augmented tomato leaf classifier
//!
//! A sequential network rebuilt from a [`ModelArtifact`] through a
//! [`LayerRegistry`]. The classifier is immutable after loading and can be
//! shared across threads behind an `Arc`.

use std::path::Path;
use std::time::Instant;

use burn::tensor::{activation::softmax, backend::Backend, Tensor};
use tracing::{debug, info};

use super::artifact::ModelArtifact;
use super::config::ClassifierConfig;
use super::layer::{FeatureTensor, Layer};
use super::registry::LayerRegistry;
use crate::utils::error::{Result, TomatoLeafError};

/// One row of the model summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    pub name: String,
    pub kind: &'static str,
    /// Output shape seen during warm-up, empty when warm-up was skipped
    pub output_shape: Vec<usize>,
}

/// Loaded network plus its input/output contract
pub struct TomatoClassifier<B: Backend> {
    name: String,
    layers: Vec<Box<dyn Layer<B>>>,
    config: ClassifierConfig,
    device: B::Device,
    num_parameters: usize,
    summary: Vec<LayerSummary>,
}

impl<B: Backend> std::fmt::Debug for TomatoClassifier<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TomatoClassifier")
            .field("name", &self.name)
            .field("layers", &self.layers.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<B: Backend> TomatoClassifier<B> {
    /// Rebuild the network described by `artifact`
    ///
    /// Fails if any layer type is not registered, if weights do not match
    /// their layer configs, if the artifact input shape differs from
    /// `config`, or if the warm-up pass does not produce `num_classes`
    /// outputs.
    pub fn from_artifact(
        artifact: &ModelArtifact,
        registry: &LayerRegistry<B>,
        config: ClassifierConfig,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate().map_err(TomatoLeafError::Config)?;
        if artifact.input_shape != config.input_shape() {
            return Err(TomatoLeafError::Artifact(format!(
                "model '{}' expects input {:?}, preprocessor produces {:?}",
                artifact.name,
                artifact.input_shape,
                config.input_shape()
            )));
        }

        debug!("Layer types in '{}': {:?}", artifact.name, artifact.layer_types());
        let layers = artifact
            .layers
            .iter()
            .map(|spec| {
                debug!("Building layer '{}' ({})", spec.name, spec.class_name);
                registry.build(spec, device)
            })
            .collect::<Result<Vec<_>>>()?;

        let summary = layers
            .iter()
            .map(|layer| LayerSummary {
                name: layer.name().to_string(),
                kind: layer.kind(),
                output_shape: Vec::new(),
            })
            .collect();

        let mut classifier = Self {
            name: artifact.name.clone(),
            layers,
            config,
            device: device.clone(),
            num_parameters: artifact.num_parameters(),
            summary,
        };

        if classifier.config.warmup {
            classifier.warm_up()?;
        }

        info!(
            "Loaded model '{}': {} layers, {} parameters",
            classifier.name,
            classifier.layers.len(),
            classifier.num_parameters
        );
        Ok(classifier)
    }

    /// Load an artifact file and rebuild it
    pub fn load(
        path: &Path,
        registry: &LayerRegistry<B>,
        config: ClassifierConfig,
        device: &B::Device,
    ) -> Result<Self> {
        info!("Loading model from {:?}", path);
        let artifact = ModelArtifact::load(path)?;
        Self::from_artifact(&artifact, registry, config, device)
    }

    /// Run a blank image through every layer, recording output shapes
    fn warm_up(&mut self) -> Result<()> {
        let start = Instant::now();
        let [h, w, c] = self.config.input_shape();
        let mut x = FeatureTensor::Spatial(Tensor::<B, 4>::zeros([1, h, w, c], &self.device));

        for (layer, row) in self.layers.iter().zip(self.summary.iter_mut()) {
            x = layer.forward(x)?;
            row.output_shape = x.shape();
        }
        self.check_output(&x)?;

        debug!("Warm-up pass took {:.2?}", start.elapsed());
        Ok(())
    }

    fn check_output(&self, output: &FeatureTensor<B>) -> Result<()> {
        match output {
            FeatureTensor::Flat(t) if t.dims()[1] == self.config.num_classes => Ok(()),
            other => Err(TomatoLeafError::Artifact(format!(
                "model '{}' outputs shape {:?}, expected [batch, {}]",
                self.name,
                other.shape(),
                self.config.num_classes
            ))),
        }
    }

    /// Raw network output `[batch, num_classes]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let [_, h, w, c] = input.dims();
        if [h, w, c] != self.config.input_shape() {
            return Err(TomatoLeafError::Inference(format!(
                "input shape {:?} does not match model input {:?}",
                [h, w, c],
                self.config.input_shape()
            )));
        }

        let mut x = FeatureTensor::Spatial(input);
        for layer in &self.layers {
            x = layer.forward(x)?;
        }
        self.check_output(&x)?;
        x.into_flat(&self.name)
    }

    /// Class probabilities `[batch, num_classes]`
    ///
    /// Softmax is applied unless the last layer already produces it.
    pub fn predict_proba(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let output = self.forward(input)?;
        if self.emits_probabilities() {
            Ok(output)
        } else {
            Ok(softmax(output, 1))
        }
    }

    /// Whether the final layer ends in softmax
    pub fn emits_probabilities(&self) -> bool {
        self.layers
            .last()
            .map(|layer| layer.emits_probabilities())
            .unwrap_or(false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.num_parameters
    }

    pub fn summary(&self) -> &[LayerSummary] {
        &self.summary
    }
}
