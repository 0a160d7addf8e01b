//! Error types for G-code generation.

use thiserror::Error;

/// Errors that can occur while configuring or driving the writer.
///
/// Retractions skipped by the frequency limiter are not errors and never
/// show up here.
#[derive(Error, Debug)]
pub enum GcodeError {
    /// The output sink could not be written or flushed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An extruder index outside the configured range.
    #[error("extruder {index} out of range (machine has {count})")]
    InvalidExtruder {
        /// Requested extruder.
        index: usize,
        /// Number of configured extruders.
        count: usize,
    },

    /// Invalid machine or writer settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Unrecognised G-code flavor name.
    #[error("unknown G-code flavor: {0}")]
    UnknownFlavor(String),

    /// A plan step referenced a path config that does not exist.
    #[error("unknown path config: {0}")]
    UnknownPathConfig(String),

    /// Malformed motion plan.
    #[error("invalid plan: {0}")]
    Plan(String),

    /// Plan JSON could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Machine settings TOML could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for G-code operations.
pub type Result<T> = std::result::Result<T, GcodeError>;
