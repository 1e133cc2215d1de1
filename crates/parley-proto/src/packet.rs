//! Packet type combining header and payload bytes.
//!
//! A `Packet` is the transport-layer unit: a 32-byte raw binary header
//! (Big Endian) followed by variable-length bytes that are already encoded.
//!
//! This is a pure data holder. For typed messages, see
//! `Payload::into_packet()` and `Payload::from_packet()`.

use bytes::{BufMut, Bytes};

use crate::{
    PacketHeader,
    errors::{ProtocolError, Result},
};

/// Complete wire packet (transport layer).
///
/// Layout on the wire:
/// `[PacketHeader: 32 bytes, raw binary] + [payload: variable bytes]`
///
/// Holds raw bytes, NOT the `Payload` enum. The server routes packets on
/// the header alone without deserializing the body.
///
/// # Invariants
///
/// - Size Consistency: `payload.len()` MUST match `header.payload_size()`.
///   Enforced by [`Packet::new`] and verified by [`Packet::decode`].
///
/// - Size Limit: `payload.len()` MUST NOT exceed
///   [`PacketHeader::MAX_PAYLOAD_SIZE`] (64 KiB). Violations are rejected
///   during decoding and encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet header (32 bytes).
    pub header: PacketHeader,

    /// Raw payload bytes (already CBOR-encoded).
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet with automatic `payload_size` calculation.
    ///
    /// The header's `payload_size` field is set to match the actual payload
    /// length, so a packet with mismatched header and body cannot be
    /// constructed.
    ///
    /// # Panics
    ///
    /// Panics if `payload.len() > u32::MAX`. In practice this cannot happen
    /// because `Bytes` is bounded by `isize::MAX` and the protocol limit is
    /// 64 KiB.
    #[must_use]
    pub fn new(mut header: PacketHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        // INVARIANT: Payload length always fits in u32. Bytes is bounded by
        // isize::MAX and MAX_PAYLOAD_SIZE (64 KiB) << u32::MAX.
        #[allow(clippy::expect_used)]
        let payload_len = u32::try_from(payload.len())
            .expect("invariant: payload length fits in u32 (bounded by protocol limit)");

        header.payload_size = payload_len.to_be_bytes();

        debug_assert_eq!(header.payload_size(), payload_len);

        Self { header, payload }
    }

    /// Encode packet into a buffer.
    ///
    /// Writes: `[header (32 bytes)] + [payload (variable)]`
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if the payload exceeds
    ///   `MAX_PAYLOAD_SIZE` (64 KiB)
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.payload.len(), self.header.payload_size() as usize);

        if self.payload.len() > PacketHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: PacketHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a packet from wire format.
    ///
    /// Returns a `Packet` with raw bytes; payload deserialization happens
    /// later via `Payload::from_packet()`. All header validation happens
    /// before any payload bytes are copied. Trailing bytes after the claimed
    /// payload are ignored.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError`] if header parsing fails (invalid magic, version,
    ///   or size limits)
    /// - [`ProtocolError::PacketTruncated`] if the buffer holds fewer payload
    ///   bytes than the header claims
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = PacketHeader::from_bytes(bytes)?;

        let payload_size = header.payload_size() as usize;
        let total_size = PacketHeader::SIZE.checked_add(payload_size).ok_or({
            ProtocolError::PayloadTooLarge {
                size: payload_size,
                max: PacketHeader::MAX_PAYLOAD_SIZE as usize,
            }
        })?;

        if bytes.len() < total_size {
            return Err(ProtocolError::PacketTruncated {
                expected: payload_size,
                actual: bytes.len().saturating_sub(PacketHeader::SIZE),
            });
        }

        // INVARIANT: bytes.len() >= total_size was checked above, so this
        // slice cannot panic.
        #[allow(clippy::expect_used)]
        let payload = Bytes::copy_from_slice(
            bytes.get(PacketHeader::SIZE..total_size).expect("invariant: bounds checked above"),
        );

        debug_assert_eq!(payload.len(), payload_size);

        Ok(Self { header: *header, payload })
    }
}
