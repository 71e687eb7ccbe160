//! Error types for configuration loading

use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while resolving or reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The user's home directory could not be determined
    #[error("cannot find user home directory")]
    NoHomeDir,

    /// The config file exists but could not be read
    #[error("cannot open config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The config file exists but is not valid JSON
    #[error("invalid config file {path}: {source}")]
    Invalid {
        path: String,
        source: serde_json::Error,
    },
}
