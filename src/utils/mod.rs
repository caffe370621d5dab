//! Utilities module for logging, errors, and formatting helpers

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{Result, ResultExt, TomatoLeafError};
pub use logging::{init_logging, LogConfig, LogLevel};

/// Round a value to a fixed number of decimal places, exact halves to even
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round_ties_even() / factor
}

/// Format a duration in milliseconds in a human-readable way
pub fn format_millis(ms: f64) -> String {
    if ms < 1.0 {
        format!("{:.0} µs", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{:.2} ms", ms)
    } else {
        format!("{:.2} s", ms / 1000.0)
    }
}
