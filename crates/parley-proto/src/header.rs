//! Packet header with zero-copy parsing.
//!
//! The `PacketHeader` is a fixed 32-byte structure serialized as raw binary
//! (Big Endian). The server routes packets on header fields alone, without
//! touching the CBOR body.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Operation codes identifying the payload type of a packet.
///
/// The opcode in the header is the only discriminator on the wire; the CBOR
/// body carries just the inner struct of the active variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Server-assigned identity (and room context, when room-scoped).
    Id = 0x0001,
    /// Chat message, both directions.
    Chat = 0x0002,
    /// Presence: a user joined.
    Register = 0x0003,
    /// Presence: a user left.
    Unregister = 0x0004,

    /// Login request.
    Login = 0x0010,
    /// Account registration request.
    Signup = 0x0011,
    /// Token refresh request (zero-byte body).
    Refresh = 0x0012,
    /// Logout notification (zero-byte body).
    Logout = 0x0013,

    /// Room listing request (zero-byte body).
    RoomsRequest = 0x0020,
    /// Room listing response.
    RoomsList = 0x0021,
    /// Room creation request.
    NewRoom = 0x0022,

    /// Generic success response.
    Ok = 0x0030,
    /// Generic rejection carrying a human-readable reason.
    Deny = 0x0031,
    /// Issued credential pair.
    Credentials = 0x0032,
}

impl Opcode {
    /// Raw wire value of this opcode.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a raw wire value. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Id),
            0x0002 => Some(Self::Chat),
            0x0003 => Some(Self::Register),
            0x0004 => Some(Self::Unregister),
            0x0010 => Some(Self::Login),
            0x0011 => Some(Self::Signup),
            0x0012 => Some(Self::Refresh),
            0x0013 => Some(Self::Logout),
            0x0020 => Some(Self::RoomsRequest),
            0x0021 => Some(Self::RoomsList),
            0x0022 => Some(Self::NewRoom),
            0x0030 => Some(Self::Ok),
            0x0031 => Some(Self::Deny),
            0x0032 => Some(Self::Credentials),
            _ => None,
        }
    }
}

/// Fixed 32-byte packet header (Big Endian network byte order).
///
/// Fields are stored as raw byte arrays to avoid alignment issues, which
/// lets `zerocopy` cast untrusted network bytes directly to a header
/// reference: every 32-byte pattern is a valid bit representation, so the
/// cast itself cannot misbehave - validation happens explicitly in
/// [`PacketHeader::from_bytes`].
///
/// The `sender_id` is assigned by the server from the connection credential.
/// Clients MUST zero it before sending; the send path enforces this so a
/// client can never assert an identity over the wire.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PacketHeader {
    magic: [u8; 4],                   // 0x50524C59 ("PRLY" in ASCII)
    version: u8,                      // 0x01
    reserved: u8,                     // Must be zero
    pub(crate) opcode: [u8; 2],       // u16 operation code
    sender_id: [u8; 8],               // u64 server-assigned sender
    room_id: [u8; 8],                 // u64 room scope (0 = unscoped)
    pub(crate) payload_size: [u8; 4], // u32 payload length
    reserved2: [u8; 4],               // Must be zero
}

impl PacketHeader {
    /// Size of the serialized header (32 bytes).
    pub const SIZE: usize = 32;

    /// Magic number: "PRLY" in ASCII.
    pub const MAGIC: u32 = 0x5052_4C59;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (64 KiB).
    pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

    /// Create a new header with the specified opcode.
    ///
    /// Sender and room default to zero (unassigned).
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            reserved: 0,
            opcode: opcode.to_u16().to_be_bytes(),
            sender_id: [0; 8],
            room_id: [0; 8],
            payload_size: [0; 4],
            reserved2: [0; 4],
        }
    }

    /// Parse a header from network bytes (zero-copy).
    ///
    /// Validation runs cheapest-first: length, magic, version, payload size.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PacketTooShort`] if the buffer is under 32 bytes
    /// - [`ProtocolError::InvalidMagic`] if the magic number is wrong
    /// - [`ProtocolError::UnsupportedVersion`] on a version mismatch
    /// - [`ProtocolError::PayloadTooLarge`] if the claimed size exceeds the
    ///   maximum
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::PacketTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Protocol magic number.
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Protocol version byte.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Operation code as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Operation code as enum. `None` if unrecognized.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Server-assigned sender identifier. Zero means unassigned.
    #[must_use]
    pub fn sender_id(&self) -> u64 {
        u64::from_be_bytes(self.sender_id)
    }

    /// Room scope of this packet. Zero means unscoped.
    #[must_use]
    pub fn room_id(&self) -> u64 {
        u64::from_be_bytes(self.room_id)
    }

    /// Payload size in bytes (max 64 KiB).
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Update the sender identifier.
    pub fn set_sender_id(&mut self, sender_id: u64) {
        self.sender_id = sender_id.to_be_bytes();
    }

    /// Update the room scope.
    pub fn set_room_id(&mut self, room_id: u64) {
        self.room_id = room_id.to_be_bytes();
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for PacketHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketHeader")
            .field("magic", &format!("{:#010x}", self.magic()))
            .field("version", &self.version())
            .field("opcode", &format!("{:#06x}", self.opcode()))
            .field("sender_id", &self.sender_id())
            .field("room_id", &self.room_id())
            .field("payload_size", &self.payload_size())
            .finish_non_exhaustive()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for PacketHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PacketHeader {}
