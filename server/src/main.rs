//! Tomato Leaf Prediction Server
//!
//! HTTP API serving tomato leaf disease predictions. Loads the model once at
//! startup and shares it across requests.

mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use tomato_leaf::backend::backend_name;
use tomato_leaf::model::DEFAULT_MODEL_PATH;
use tomato_leaf::utils::logging::{init_logging, LogConfig, LogLevel};

use crate::state::{AppState, ServerConfig};

/// Tomato Leaf Prediction Server
#[derive(Parser, Debug)]
#[command(name = "tomato-leaf-server")]
#[command(author = "Warre Snaet")]
#[command(version)]
#[command(about = "HTTP API server for tomato leaf disease prediction")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5000")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Path to the model artifact
    #[arg(short, long, env = "TOMATO_MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
    model: PathBuf,

    /// Maximum upload size in megabytes
    #[arg(long, default_value = "16")]
    max_upload_mb: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TOMATO_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Extra per-target log directives, e.g. `tower_http=trace`
    #[arg(long, env = "RUST_LOG")]
    log_filter: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::server(LogLevel::parse_or_info(&cli.log_level))
    };
    if let Some(directives) = &cli.log_filter {
        log_config = log_config.with_directives(directives);
    }
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        model_path: cli.model,
        max_upload_bytes: cli.max_upload_mb * 1024 * 1024,
    };

    info!("Tomato Leaf Prediction Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Model:      {:?}", config.model_path);
    info!("  Backend:    {}", backend_name());
    info!("  Max upload: {} MB", cli.max_upload_mb);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Loading runs the warm-up forward pass, keep it off the async runtime
    let state = AppState::load_blocking(config).await;
    if let Some(reason) = &state.load_error {
        warn!("Serving without a model, /predict will answer 500: {}", reason);
    }

    let app = routes::app(Arc::new(state));

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
