//! Layer registry
//!
//! Maps serialized layer type names to constructor functions. The graph
//! loader consults the registry for every layer; a type with no entry makes
//! the whole artifact fail to load.

use std::collections::HashMap;

use burn::tensor::backend::Backend;

use super::artifact::LayerSpec;
use super::eca::{build_dual_eca, DUAL_ECA_LAYER};
use super::layer::Layer;
use super::layers;
use crate::utils::error::{Result, TomatoLeafError};

/// Constructor for one layer type
pub type LayerFactory<B> = fn(&LayerSpec, &<B as Backend>::Device) -> Result<Box<dyn Layer<B>>>;

/// Name -> constructor table
pub struct LayerRegistry<B: Backend> {
    factories: HashMap<String, LayerFactory<B>>,
}

impl<B: Backend> Default for LayerRegistry<B> {
    fn default() -> Self {
        default_registry()
    }
}

impl<B: Backend> LayerRegistry<B> {
    /// Registry with no layer types
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Standard Keras layer types, without custom layers
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry
            .register("InputLayer", layers::build_input::<B>)
            .register("Conv2D", layers::build_conv2d::<B>)
            .register("MaxPooling2D", layers::build_max_pool2d::<B>)
            .register("AveragePooling2D", layers::build_avg_pool2d::<B>)
            .register("GlobalAveragePooling2D", layers::build_global_avg_pool2d::<B>)
            .register("GlobalMaxPooling2D", layers::build_global_max_pool2d::<B>)
            .register("BatchNormalization", layers::build_batch_norm::<B>)
            .register("Activation", layers::build_activation::<B>)
            .register("Dense", layers::build_dense::<B>)
            .register("Dropout", layers::build_dropout::<B>)
            .register("Flatten", layers::build_flatten::<B>)
            .register("Rescaling", layers::build_rescaling::<B>);
        registry
    }

    /// Add or replace a layer type
    pub fn register(&mut self, class_name: &str, factory: LayerFactory<B>) -> &mut Self {
        self.factories.insert(class_name.to_string(), factory);
        self
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    /// Registered type names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct the layer described by `spec`
    pub fn build(&self, spec: &LayerSpec, device: &B::Device) -> Result<Box<dyn Layer<B>>> {
        let factory = self
            .factories
            .get(&spec.class_name)
            .ok_or_else(|| TomatoLeafError::UnknownLayer {
                class_name: spec.class_name.clone(),
                layer: spec.name.clone(),
            })?;
        factory(spec, device)
    }
}

/// Builtin layers plus the Dual ECA attention block
pub fn default_registry<B: Backend>() -> LayerRegistry<B> {
    let mut registry = LayerRegistry::builtin();
    registry.register(DUAL_ECA_LAYER, build_dual_eca::<B>);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::artifact::WeightBlob;
    use serde_json::json;

    type TestBackend = crate::backend::DefaultBackend;

    fn eca_spec() -> LayerSpec {
        let mut identity = vec![0.0; 5];
        identity[2] = 1.0;
        LayerSpec::new(DUAL_ECA_LAYER, "dual_eca")
            .with_config(json!({ "k_size": 5 }))
            .with_weight("conv1d_sigmoid", WeightBlob::new(vec![5, 1, 1], identity.clone()))
            .with_weight("conv1d_tanh", WeightBlob::new(vec![5, 1, 1], identity))
    }

    #[test]
    fn test_default_registry_has_dual_eca() {
        let registry = default_registry::<TestBackend>();
        assert!(registry.contains(DUAL_ECA_LAYER));
        assert!(registry.contains("Conv2D"));

        let device = Default::default();
        let layer = registry.build(&eca_spec(), &device).unwrap();
        assert_eq!(layer.kind(), DUAL_ECA_LAYER);
        assert_eq!(layer.name(), "dual_eca");
    }

    #[test]
    fn test_builtin_registry_rejects_custom_layer() {
        let registry = LayerRegistry::<TestBackend>::builtin();
        let device = Default::default();
        match registry.build(&eca_spec(), &device) {
            Err(TomatoLeafError::UnknownLayer { class_name, layer }) => {
                assert_eq!(class_name, DUAL_ECA_LAYER);
                assert_eq!(layer, "dual_eca");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("custom layer built without registration"),
        }
    }

    #[test]
    fn test_register_extends_empty_registry() {
        let mut registry = LayerRegistry::<TestBackend>::empty();
        assert!(registry.names().is_empty());
        registry.register("Flatten", layers::build_flatten::<TestBackend>);
        assert_eq!(registry.names(), vec!["Flatten"]);
    }
}
