//! Classifier Configuration Module
//!
//! Describes the input and output contract a loaded network must satisfy.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::labels::NUM_CLASSES;
use crate::utils::error::{Result, TomatoLeafError};

/// Input/output contract checked when a model is loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Input image size (width and height, square)
    pub input_size: usize,

    /// Number of input channels (3 for RGB)
    pub input_channels: usize,

    /// Number of output classes
    pub num_classes: usize,

    /// Run a forward pass on a blank image right after loading
    pub warmup: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            input_size: 128,
            input_channels: 3,
            num_classes: NUM_CLASSES,
            warmup: true,
        }
    }
}

impl ClassifierConfig {
    pub fn new(input_size: usize, num_classes: usize) -> Self {
        Self {
            input_size,
            num_classes,
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_size == 0 {
            return Err("input_size must be greater than 0".to_string());
        }

        if self.input_channels != 3 {
            return Err("input_channels must be 3 (RGB)".to_string());
        }

        if self.num_classes == 0 {
            return Err("num_classes must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Expected artifact input shape `[H, W, C]`
    pub fn input_shape(&self) -> [usize; 3] {
        [self.input_size, self.input_size, self.input_channels]
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate().map_err(TomatoLeafError::Config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_preprocessor() {
        let config = ClassifierConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.input_shape(), [128, 128, 3]);
        assert_eq!(config.num_classes, 10);
    }

    #[test]
    fn test_validate_rejects_zero_classes() {
        let config = ClassifierConfig::new(128, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_load() {
        let path = std::env::temp_dir().join(format!(
            "tomato-leaf-classifier-config-{}.json",
            std::process::id()
        ));
        let config = ClassifierConfig {
            warmup: false,
            ..ClassifierConfig::new(64, 4)
        };
        config.save(&path).unwrap();
        let loaded = ClassifierConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }
}
