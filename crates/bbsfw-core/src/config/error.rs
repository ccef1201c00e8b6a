//! Configuration errors

use thiserror::Error;

/// Errors decoding or encoding the binary configuration record
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unsupported configuration version {0}")]
    UnsupportedVersion(u8),

    #[error("Configuration version {version} must be {expected} bytes, got {actual}")]
    SizeMismatch {
        version: u8,
        expected: usize,
        actual: usize,
    },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A configuration field outside its allowed range
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field} must be in interval {min}-{max}.")]
pub struct ValidationError {
    /// Human-readable field name
    pub field: String,
    pub min: f64,
    pub max: f64,
    pub value: f64,
}
