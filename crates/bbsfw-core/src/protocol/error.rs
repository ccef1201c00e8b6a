//! Protocol errors

use thiserror::Error;

use crate::config::{CodecError, ValidationError};

/// Errors that can occur during protocol communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Not connected to controller")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Controller uses configuration version {device}, only version {supported} can be written")]
    UnsupportedConfigVersion { device: u8, supported: u8 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Configuration codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
