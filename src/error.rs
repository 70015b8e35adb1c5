//! Fleetpace Error Types

use thiserror::Error;

/// Result type alias for fleetpace operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fleetpace error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Fleet control errors
    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Probe output is not valid JSON: {0}")]
    ProbeOutput(#[from] serde_json::Error),

    #[error("Convergence failed on {node}: {reason}")]
    Converge { node: String, reason: String },

    #[error("Fleet command timed out after {0} seconds")]
    CommandTimeout(u64),

    #[error("Empty fleet command: {0}")]
    EmptyCommand(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is retryable on the next scheduled attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Probe(_) | Error::Converge { .. } | Error::CommandTimeout(_)
        )
    }
}
