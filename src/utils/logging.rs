//! Logging setup shared by the CLI and the HTTP server
//!
//! Output goes through a `tracing-subscriber` fmt layer. The base level can
//! be refined with `RUST_LOG`-style directives, e.g. `tower_http=debug`.

use std::fmt;
use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter, FmtSubscriber};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level for every target without its own directive
    pub level: LogLevel,
    /// Extra per-target directives, comma separated
    pub directives: Option<String>,
    /// Show the module path of each event
    pub include_target: bool,
    /// Show thread ids (inference runs on blocking worker threads)
    pub include_thread_ids: bool,
    /// Emit an event when a span closes, with its duration
    pub span_timings: bool,
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            directives: None,
            include_target: false,
            include_thread_ids: false,
            span_timings: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Debug output with targets, thread ids and request timings
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            directives: Some("tower_http=debug".to_string()),
            include_target: true,
            include_thread_ids: true,
            span_timings: true,
            ansi_colors: true,
        }
    }

    /// Server logging at `level`, with request spans from `tower_http`
    pub fn server(level: LogLevel) -> Self {
        Self {
            level,
            directives: Some(format!("tower_http={}", level.as_str())),
            include_thread_ids: true,
            ..Default::default()
        }
    }

    pub fn with_directives(mut self, directives: &str) -> Self {
        self.directives = Some(directives.to_string());
        self
    }

    /// Filter built from the level and the directives; bad directives are skipped
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(self.level.to_tracing_level()).into())
            .parse_lossy(self.directives.as_deref().unwrap_or_default())
    }
}

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a level name, falling back to `Info`
    pub fn parse_or_info(s: &str) -> Self {
        s.parse().unwrap_or(LogLevel::Info)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let span_events = if config.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(config.env_filter())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .with_span_events(span_events)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!(" WARNING ".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::parse_or_info("loud"), LogLevel::Info);
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_server_config_tracks_requests() {
        let config = LogConfig::server(LogLevel::Warn);
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.directives.as_deref(), Some("tower_http=warn"));
        assert!(config.include_thread_ids);
    }

    #[test]
    fn test_env_filter_keeps_directives() {
        let filter = LogConfig::default()
            .with_directives("tomato_leaf=trace")
            .env_filter();
        let rendered = filter.to_string();
        assert!(rendered.contains("tomato_leaf=trace"));
        assert!(rendered.contains("info"));
    }
}
