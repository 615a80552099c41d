use thiserror::Error;

use crate::types::ControlId;

/// Result type for amplifier operations
pub type Result<T> = std::result::Result<T, AmpError>;

/// Errors that can occur when talking to an amplifier
#[derive(Error, Debug)]
pub enum AmpError {
    /// The serial channel failed or lost sync with the device
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A reply line could not be decoded
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A requested setting falls outside what the zone accepts
    #[error("unsupported range: {field} {value} is outside {min}..={max}")]
    UnsupportedRange {
        /// Name of the setting being changed
        field: &'static str,
        /// Value supplied by the caller
        value: u8,
        /// Lowest accepted value
        min: u8,
        /// Highest accepted value
        max: u8,
    },

    /// The zone handle was obtained before the amplifier was reset
    #[error("zone {0} is stale; fetch it again from the amplifier")]
    StaleZone(ControlId),

    /// Configuration values are out of range
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Every sender of zone updates is gone
    #[error("update channel closed")]
    UpdatesClosed,

    /// The receiver fell behind and missed updates
    #[error("update receiver lagged by {0} messages")]
    UpdatesLagged(u64),
}

/// Failures of the write/echo/read exchange on the channel
#[derive(Error, Debug)]
pub enum TransportError {
    /// I/O error on the underlying channel
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel reached end of stream
    #[error("connection closed")]
    ConnectionClosed,

    /// The echoed command had a different length than the one sent
    #[error("echo length mismatch: sent {sent:?}, read back {received:?}")]
    EchoLength {
        /// Command that was written
        sent: String,
        /// Echo that came back
        received: String,
    },

    /// The echoed command differed from the one sent
    #[error("echo mismatch: sent {sent:?}, read back {received:?}")]
    EchoMismatch {
        /// Command that was written
        sent: String,
        /// Echo that came back
        received: String,
    },
}

/// Reply lines that match neither known response shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A single-field reply carried an unknown action code
    #[error("invalid command code: {0:?}")]
    InvalidCommandCode(String),

    /// The reply length matches no known shape
    #[error("invalid command string: {0:?}")]
    InvalidInput(String),
}

impl From<std::io::Error> for AmpError {
    fn from(e: std::io::Error) -> Self {
        AmpError::Transport(TransportError::Io(e))
    }
}
