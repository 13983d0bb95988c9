//! Error types for protocol parsing and encoding

use thiserror::Error;

/// Errors that can occur while parsing device data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Frame is shorter than its command requires
    #[error("frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    /// Invalid BCD encoding
    #[error("invalid BCD digit: 0x{0:02X}")]
    InvalidBcd(u8),

    /// Invalid frequency value
    #[error("invalid frequency: {0}")]
    InvalidFrequency(String),

    /// Invalid mode value
    #[error("invalid mode: {0}")]
    InvalidMode(String),

    /// Numeric field that could not be parsed
    #[error("invalid field: {0}")]
    InvalidField(String),

    /// Bytes that are not valid text in an ASCII protocol
    #[error("non-ASCII data in frame")]
    NotAscii,
}

/// Higher-level protocol errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Parse error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// No rig plugin is registered under this name
    #[error("unknown rig plugin: {0}")]
    UnknownPlugin(String),

    /// Mode has no encoding in this rig's protocol
    #[error("mode {mode} is not supported by {rig}")]
    UnsupportedMode { mode: String, rig: String },

    /// Value does not fit the protocol field
    #[error("{what} out of range: {value} (max {max})")]
    ValueOutOfRange {
        what: &'static str,
        value: u64,
        max: u64,
    },
}
