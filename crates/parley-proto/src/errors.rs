//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding packets.
///
/// All variants describe structural problems with the bytes on the wire.
/// None of them is fatal to a connection: the receiver logs the error and
/// discards the packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer too short to contain a packet header.
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes available.
        actual: usize,
    },

    /// Header magic number did not match.
    #[error("invalid magic number")]
    InvalidMagic,

    /// Unsupported protocol version byte.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Payload exceeds the maximum allowed size.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Claimed or actual payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Header claims more payload bytes than the buffer contains.
    #[error("packet truncated: header claims {expected} payload bytes, got {actual}")]
    PacketTruncated {
        /// Payload size claimed by the header.
        expected: usize,
        /// Payload bytes actually present.
        actual: usize,
    },

    /// Opcode not recognized by this protocol version.
    #[error("unknown opcode: {0:#06x}")]
    UnknownOpcode(u16),

    /// CBOR serialization failed.
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed.
    #[error("CBOR decode error: {0}")]
    CborDecode(String),
}
