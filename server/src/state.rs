//! Application state for the prediction server
//!
//! Holds the model loaded at startup. A failed load is kept as an error
//! string so the server can still start and report it per request.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use tomato_leaf::backend::{default_device, DefaultBackend};
use tomato_leaf::inference::Predictor;

/// Backend used for request inference
pub type ServerBackend = DefaultBackend;

/// Server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Path to the model artifact
    pub model_path: PathBuf,
    /// Maximum request body size in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            model_path: PathBuf::from(tomato_leaf::model::DEFAULT_MODEL_PATH),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Loaded model, `None` when loading failed
    pub predictor: Option<Predictor<ServerBackend>>,
    /// Why the model is missing
    pub load_error: Option<String>,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, predictor: Option<Predictor<ServerBackend>>) -> Self {
        Self {
            config,
            predictor,
            load_error: None,
            started_at: Instant::now(),
        }
    }

    /// Load the model named in `config`; a failure is logged, not returned
    pub fn load(config: ServerConfig) -> Self {
        let device = default_device();
        match Predictor::load(&config.model_path, &device) {
            Ok(predictor) => {
                info!(
                    "Model '{}' ready ({} layers)",
                    predictor.classifier().name(),
                    predictor.classifier().num_layers()
                );
                Self::new(config, Some(predictor))
            }
            Err(e) => {
                error!("Failed to load model from {:?}: {}", config.model_path, e);
                Self::without_model(config, e.to_string())
            }
        }
    }

    /// State for a server running with no model
    pub fn without_model(config: ServerConfig, reason: String) -> Self {
        let mut state = Self::new(config, None);
        state.load_error = Some(reason);
        state
    }

    /// Run [`AppState::load`] on a blocking thread; a panicking load degrades
    /// the server the same way an `Err` does
    pub async fn load_blocking(config: ServerConfig) -> Self {
        let fallback = config.clone();
        match tokio::task::spawn_blocking(move || Self::load(config)).await {
            Ok(state) => state,
            Err(e) => {
                error!("Model loading task aborted: {}", e);
                Self::without_model(fallback, format!("model loading aborted: {}", e))
            }
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.predictor.is_some()
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_model_degrades() {
        let config = ServerConfig {
            model_path: PathBuf::from("does/not/exist/model.json"),
            ..Default::default()
        };
        let state = AppState::load_blocking(config).await;
        assert!(!state.model_loaded());
        assert!(state.load_error.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_artifact_degrades() {
        let dir = std::env::temp_dir().join(format!("tomato-leaf-state-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.json");
        let artifact = serde_json::json!({
            "format_version": 1,
            "name": "corrupt",
            "input_shape": [128, 128, 3],
            "layers": [{
                "class_name": "Conv2D",
                "name": "conv",
                "config": { "filters": 1, "kernel_size": 3, "strides": 0, "padding": "same", "use_bias": false },
                "weights": { "kernel": { "shape": [3, 3, 3, 1], "data": vec![0.1f32; 27] } }
            }]
        });
        std::fs::write(&path, artifact.to_string()).unwrap();

        let state = AppState::load_blocking(ServerConfig {
            model_path: path,
            ..Default::default()
        })
        .await;
        std::fs::remove_dir_all(&dir).ok();

        assert!(!state.model_loaded());
        assert!(state.load_error.unwrap().contains("strides"));
    }
}
