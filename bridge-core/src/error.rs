//! Error types for bridge operations.

use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur while building or running a bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A mapping string names a transform that is not registered.
    #[error("Unknown transformation function: {0}")]
    UnknownTransform(String),

    /// A mapping string does not match the mapping grammar.
    #[error("Invalid mapping `{mapping}`: {reason}")]
    InvalidMapping {
        /// The offending mapping string.
        mapping: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A value could not be read as a hex colour.
    #[error("Invalid colour: {0}")]
    InvalidColor(String),

    /// A value could not be read as a timestamp.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Config or record serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    pub(crate) fn invalid_mapping(mapping: &str, reason: impl Into<String>) -> Self {
        Self::InvalidMapping {
            mapping: mapping.to_string(),
            reason: reason.into(),
        }
    }
}
