//! Error types for the operator.

use alertmanager_config::ConfigError;
use thiserror::Error;

/// Errors that can occur while reconciling rules.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Loading, merging or saving the configuration document failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The rule's desired state cannot be turned into a route and receiver.
    #[error("invalid rule {name}: {reason}")]
    InvalidRule {
        /// The rule name.
        name: String,
        /// Why the rule was rejected.
        reason: String,
    },

    /// The resource API failed.
    #[error("resource client error: {reason}")]
    Client {
        /// The reason the call failed.
        reason: String,
    },

    /// Process-wide settings are invalid. Fatal at startup.
    #[error("invalid settings: {reason}")]
    Settings {
        /// What is wrong with the settings.
        reason: String,
    },

    /// A rule manifest could not be decoded.
    #[error("invalid manifest: {reason}")]
    Manifest {
        /// Why decoding failed.
        reason: String,
    },
}

impl From<serde_yaml::Error> for OperatorError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Manifest {
            reason: err.to_string(),
        }
    }
}

/// Result type for operator operations.
pub type Result<T> = std::result::Result<T, OperatorError>;
