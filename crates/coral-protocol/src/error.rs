//! Protocol error types for RESP parsing.

use thiserror::Error;

/// Errors that can occur when decoding the RESP wire format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The input buffer doesn't contain a complete frame yet.
    /// The caller should read more data and try again.
    #[error("incomplete frame: need more data")]
    Incomplete,

    /// The first byte of a frame didn't match any known RESP type prefix.
    #[error("invalid type prefix: {0:#04x}")]
    InvalidPrefix(u8),

    /// Failed to parse an integer value from the frame content.
    #[error("invalid integer encoding")]
    InvalidInteger,

    /// A bulk string or array declared an invalid length.
    #[error("invalid frame length: {0}")]
    InvalidLength(i64),

    /// A bulk string declared a length beyond the configured maximum.
    #[error("bulk string of {0} bytes exceeds maximum")]
    BulkTooLarge(usize),

    /// Arrays nested deeper than the configured maximum.
    #[error("frame nesting too deep")]
    NestingTooDeep,

    /// A simple string or error line contained invalid UTF-8.
    #[error("invalid utf-8 in {0} line")]
    InvalidUtf8(&'static str),
}
