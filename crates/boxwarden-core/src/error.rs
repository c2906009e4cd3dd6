//! Error types for `boxwarden` core library.

use thiserror::Error;

/// Result type alias using `boxwarden` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `boxwarden` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
