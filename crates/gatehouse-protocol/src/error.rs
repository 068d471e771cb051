//! Error types for the protocol layer.
//!
//! Each crate in Gatehouse defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in the bytes themselves:
//! never in networking or in authentication state.

/// Errors that can occur while encoding or decoding wire messages.
///
/// Receivers never propagate these past the node boundary: a malformed
/// payload is logged and dropped, it must not take the node down.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The buffer ended before a complete field could be read.
    #[error("truncated message: needed {needed} more bytes")]
    Truncated { needed: usize },

    /// A string field contained bytes that are not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// A string is too long for its 2-byte length prefix.
    #[error("string of {0} bytes exceeds the 65535 byte limit")]
    StringTooLong(usize),

    /// An identity field did not parse as a UUID.
    #[error("invalid identity id: {0}")]
    InvalidUuid(String),

    /// The type tag is not one this build understands.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// The message decoded but violates a protocol rule
    /// (e.g. a boolean byte other than 0 or 1).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
