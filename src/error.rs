//! Error types for railcan
//!
//! Provides a unified error type for all operations, plus the
//! codec-level [`ParseError`].

use thiserror::Error;

/// Result type alias using RailError
pub type Result<T> = std::result::Result<T, RailError>;

/// Unified error type for railcan operations
#[derive(Debug, Error)]
pub enum RailError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    // -------------------------------------------------------------------------
    // Exchange Errors
    // -------------------------------------------------------------------------
    #[error("Send failed for opcode 0x{opcode:02x}: {reason}")]
    SendFailed { opcode: u8, reason: String },

    #[error("No reply for opcode 0x{opcode:02x} within {timeout_ms} ms")]
    Timeout { opcode: u8, timeout_ms: u64 },

    #[error("Unexpected reply for opcode 0x{opcode:02x}: {reason}")]
    UnexpectedReply { opcode: u8, reason: String },

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("Transport error: {0}")]
    Transport(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RailError {
    /// Whether this error is a reply timeout (retrying the whole
    /// operation is reasonable)
    pub fn is_timeout(&self) -> bool {
        matches!(self, RailError::Timeout { .. })
    }
}

/// Failure to decode a message from its text or frame encoding
///
/// A message that failed to decode must not be trusted; start over
/// from a cleared one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("input too short: need {expected} characters, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("invalid hex digit {found:?} at position {position}")]
    InvalidHex { position: usize, found: char },

    #[error("payload length {0} exceeds 8")]
    LengthOutOfRange(u8),

    #[error("expected a single space at position {position}")]
    MissingSeparator { position: usize },

    #[error("invalid response marker {0:?}")]
    InvalidMarker(char),

    #[error("unexpected trailing input at position {position}")]
    TrailingInput { position: usize },
}
