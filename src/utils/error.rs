//! Error Handling Module
//!
//! Defines the error type shared by preprocessing, model loading and
//! prediction. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for tomato leaf classification
#[derive(Error, Debug)]
pub enum TomatoLeafError {
    /// Uploaded bytes could not be decoded into an image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Error loading an image from disk
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Malformed model artifact
    #[error("Invalid model artifact: {0}")]
    Artifact(String),

    /// The artifact names a layer type the registry cannot build
    #[error("Unknown layer type '{class_name}' (layer '{layer}'); register it before loading the model")]
    UnknownLayer { class_name: String, layer: String },

    /// Layer weights missing or of the wrong shape
    #[error("Invalid weights for layer '{layer}': {reason}")]
    Weights { layer: String, reason: String },

    /// Tensor shape did not match what a layer expects
    #[error("Shape mismatch in layer '{layer}': {reason}")]
    Shape { layer: String, reason: String },

    /// Error while running the forward pass
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

/// Convenience Result type for tomato leaf operations
pub type Result<T> = std::result::Result<T, TomatoLeafError>;

/// Extension trait for adding artifact context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| TomatoLeafError::Artifact(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| TomatoLeafError::Artifact(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| TomatoLeafError::Artifact(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| TomatoLeafError::Artifact(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TomatoLeafError::Decode("unsupported format".to_string());
        assert_eq!(format!("{}", err), "Failed to decode image: unsupported format");
    }

    #[test]
    fn test_unknown_layer_names_type() {
        let err = TomatoLeafError::UnknownLayer {
            class_name: "DualECALayer".to_string(),
            layer: "dual_eca".to_string(),
        };
        assert!(format!("{}", err).contains("DualECALayer"));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let err = result.context("Failed to read artifact").unwrap_err();
        assert!(format!("{}", err).contains("Failed to read artifact"));
    }

    #[test]
    fn test_option_context() {
        let opt: Option<i32> = None;
        assert!(matches!(
            opt.context("Value was None"),
            Err(TomatoLeafError::Artifact(_))
        ));
    }
}
