//! Checkpoint error types.

use thiserror::Error;

/// Errors that can occur while encoding, decoding or restoring a checkpoint
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CheckpointError {
    /// Serialization to JSON failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Deserialization from JSON failed
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Checkpoint version is not supported by this version
    #[error("Unsupported checkpoint version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The checkpoint was taken from a different machine
    #[error("Checkpoint belongs to machine '{found}', not '{expected}'")]
    MachineMismatch { expected: String, found: String },

    /// A state id in the checkpoint does not exist in the machine
    #[error("Unknown state '{0}' in checkpoint")]
    UnknownState(String),

    /// A history record is keyed by something other than a history state
    #[error("'{0}' is not a history state")]
    NotHistory(String),

    /// The active states do not form a valid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
