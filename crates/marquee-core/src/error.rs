//! Error types for Marquee Core

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Error, Debug)]
pub enum Error {
    // Source errors
    #[error("No playback path for stream: {stream_ref}")]
    UnsupportedSource { stream_ref: String },

    #[error("Invalid stream reference: {0}")]
    InvalidStreamRef(String),

    // Manifest errors
    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    // Pipeline errors
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Recovery attempts exhausted after {attempts} tries")]
    RetriesExhausted { attempts: u32 },

    // Checkpoint errors
    #[error("Checkpoint save failed: {0}")]
    SaveFailed(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a save failure from any displayable cause
    pub fn save_failed(msg: impl Into<String>) -> Self {
        Error::SaveFailed(msg.into())
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ManifestFetch(_) | Error::Network(_) | Error::Decode(_) | Error::SaveFailed(_)
        )
    }

    /// Returns the error code for logs and presentation layers
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::UnsupportedSource { .. } => "UNSUPPORTED_SOURCE",
            Error::InvalidStreamRef(_) => "INVALID_STREAM_REF",
            Error::ManifestFetch(_) => "MANIFEST_FETCH",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::Decode(_) => "DECODE",
            Error::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Error::SaveFailed(_) => "SAVE_FAILED",
            Error::Network(_) => "NETWORK",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
            Error::Internal(_) => "INTERNAL",
            Error::Io(_) => "IO",
        }
    }
}
