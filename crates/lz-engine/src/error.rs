//! Error types for the serial engine

use thiserror::Error;

/// Errors that can occur while setting up a device link
#[derive(Debug, Error)]
pub enum EngineError {
    /// Serial port could not be opened or configured
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(#[from] lz_protocol::ProtocolError),

    /// Setting has no serial port equivalent
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}
