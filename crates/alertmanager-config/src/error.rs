//! Error types for the alertmanager-config crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading, merging or persisting a configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {}", path.display())]
    NotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The document could not be parsed or violates a document invariant.
    #[error("malformed configuration: {reason}")]
    MalformedConfig {
        /// Why the document was rejected.
        reason: String,
    },

    /// Reading or writing the configuration file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The reload signal could not be delivered.
    ///
    /// Only ever logged; a failed reload never fails a save.
    #[error("reload failed: {reason}")]
    Reload {
        /// The reason the reload failed.
        reason: String,
    },
}

impl ConfigError {
    /// Shorthand for a [`ConfigError::MalformedConfig`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedConfig {
            reason: reason.into(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::malformed(err.to_string())
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
