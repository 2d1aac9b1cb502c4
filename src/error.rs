//! Error types for Reel

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type for Reel operations
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Errors that can occur while recording or replaying
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Replay was requested but the cassette does not exist
    #[error("Cassette not found: {name}")]
    StorageMissing {
        /// Logical cassette name
        name: String,
    },

    /// The cassette exists but cannot be parsed
    #[error("Cassette {name} is corrupt: {reason}")]
    StorageCorrupt {
        /// Logical cassette name
        name: String,
        /// Parser diagnostic
        reason: String,
    },

    /// No recorded exchange satisfies the active rule set
    #[error("No recorded interaction matches {method} {url}")]
    NoMatchFound {
        /// Method of the live request
        method: String,
        /// URL of the live request
        url: String,
    },

    /// Two live registrations claim the same context identifier
    #[error("Cannot use multiple recorder contexts for the same identifier at the same time: {identifier}")]
    DuplicateContext {
        /// The contested identifier
        identifier: String,
    },

    /// No registration exists for the requested context identifier
    #[error("No recorder context registered for identifier {identifier}")]
    ContextNotFound {
        /// The requested identifier
        identifier: String,
    },

    /// Cassette name cannot be mapped to storage
    #[error("Invalid cassette name: {0}")]
    InvalidName(String),

    /// The underlying transport failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The forwarded call did not complete in time
    #[error("Forwarded request timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error while persisting or reading a cassette
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RecorderError {
    /// Whether this failure came from replay matching or cassette lookup
    #[must_use]
    pub fn is_replay_failure(&self) -> bool {
        matches!(
            self,
            Self::StorageMissing { .. } | Self::NoMatchFound { .. }
        )
    }
}
