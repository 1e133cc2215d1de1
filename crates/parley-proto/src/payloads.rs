//! CBOR-encoded protocol messages.
//!
//! Packet headers are raw binary for cheap routing, but payload bodies use
//! CBOR for type safety and forward compatibility. The `Payload` enum covers
//! all message types: chat traffic (Id, Chat, Register, Unregister), auth
//! requests, room management, and generic responses.
//!
//! CBOR is self-describing (field names embedded), compact, and needs no
//! code generation. The server never deserializes chat bodies, only routes
//! them.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). Round-trip encoding must produce identical values.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    Opcode, Packet, PacketHeader,
    errors::{ProtocolError, Result},
};

/// Server-assigned identity, sent once per connection.
///
/// On a room-scoped connection the server includes the room context so the
/// client does not need a separate lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAssign {
    /// Connection-scoped user identifier.
    pub id: u64,
    /// Display name registered for this account.
    pub username: String,
    /// Room the connection is scoped to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomInfo>,
}

/// A chat room known to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Unique room identifier.
    pub room_id: u64,
    /// Account name of the room creator.
    pub owner_id: String,
    /// Human-readable room name.
    pub name: String,
}

/// A single chat message.
///
/// Client-sent messages leave `timestamp` unset; the receiving side stamps
/// them on arrival. Server-relayed messages carry the authoritative time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unix timestamp in milliseconds, if stamped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Display name of the author. Empty when the sender is implied by the
    /// packet header.
    #[serde(default)]
    pub sender_name: String,
    /// Message text.
    pub text: String,
}

/// Presence notification: a user joined the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceJoin {
    /// Identifier of the joining user.
    pub id: u64,
    /// Display name of the joining user.
    pub username: String,
}

/// Presence notification: a user left the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceLeave {
    /// Identifier of the departing user.
    pub id: u64,
}

/// Login request carrying account credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Account name.
    pub username: String,
    /// Account password (plaintext over TLS).
    pub password: String,
}

// Manual Debug to keep the password out of logs
impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Account registration request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupRequest {
    /// Desired account name.
    pub username: String,
    /// Desired account password.
    pub password: String,
}

impl std::fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupRequest")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Room listing response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomList {
    /// All rooms visible to the requesting account.
    pub rooms: Vec<RoomInfo>,
}

/// Room creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRoomRequest {
    /// Name for the new room.
    pub name: String,
}

/// Rejection response with a human-readable reason.
///
/// The reason is surfaced to the user verbatim, so the server phrases it
/// for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyReason {
    /// Why the request was rejected.
    pub reason: String,
}

/// Issued token pair after a successful login or refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialGrant {
    /// Short-lived access token. May be absent on a partial grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Long-lived refresh token. May be absent on a partial grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl CredentialGrant {
    /// Whether both tokens are present and non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        let present = |token: &Option<String>| token.as_deref().is_some_and(|t| !t.is_empty());
        present(&self.access_token) && present(&self.refresh_token)
    }
}

// Manual Debug to keep tokens out of logs
impl std::fmt::Debug for CredentialGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialGrant")
            .field("access_token", &self.access_token.as_ref().map(|_| "[redacted]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// All possible packet payloads.
///
/// The payload type is determined by the `Opcode` in the packet header, so
/// we serialize only the inner struct content (no variant tag in CBOR).
///
/// # Invariants
///
/// - Opcode Uniqueness: Each payload variant corresponds to exactly one
///   `Opcode`.
///
/// - Serialization Consistency: Encoding a `Payload` and then decoding it
///   with the same opcode MUST produce an equivalent value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Chat traffic
    /// Server-assigned identity for this connection.
    Id(IdAssign),
    /// Chat message, both directions.
    Chat(ChatMessage),
    /// A user joined the room.
    Register(PresenceJoin),
    /// A user left the room.
    Unregister(PresenceLeave),

    // Authentication
    /// Login request.
    Login(LoginRequest),
    /// Account registration request.
    Signup(SignupRequest),
    /// Token refresh request (zero-byte body, token travels in the
    /// Authorization header).
    Refresh,
    /// Logout notification (zero-byte body).
    Logout,

    // Room management
    /// Room listing request (zero-byte body).
    RoomsRequest,
    /// Room listing response.
    RoomsList(RoomList),
    /// Room creation request.
    NewRoom(NewRoomRequest),

    // Responses
    /// Generic success.
    Ok,
    /// Rejection with reason.
    Deny(DenyReason),
    /// Issued token pair.
    Credentials(CredentialGrant),
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Id(_) => Opcode::Id,
            Self::Chat(_) => Opcode::Chat,
            Self::Register(_) => Opcode::Register,
            Self::Unregister(_) => Opcode::Unregister,
            Self::Login(_) => Opcode::Login,
            Self::Signup(_) => Opcode::Signup,
            Self::Refresh => Opcode::Refresh,
            Self::Logout => Opcode::Logout,
            Self::RoomsRequest => Opcode::RoomsRequest,
            Self::RoomsList(_) => Opcode::RoomsList,
            Self::NewRoom(_) => Opcode::NewRoom,
            Self::Ok => Opcode::Ok,
            Self::Deny(_) => Opcode::Deny,
            Self::Credentials(_) => Opcode::Credentials,
        }
    }

    /// Encode payload to a buffer.
    ///
    /// Serializes only the inner struct, NOT the variant tag. The packet
    /// header's opcode already identifies the payload type. Unit variants
    /// produce zero bytes.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborEncode`] if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Id(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Chat(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Register(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Unregister(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Login(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Signup(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Refresh | Self::Logout | Self::RoomsRequest | Self::Ok => Ok(()),
            Self::RoomsList(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::NewRoom(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Deny(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Credentials(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode payload from bytes based on opcode.
    ///
    /// The size check happens BEFORE CBOR parsing begins, so the parser
    /// never sees oversized input.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if bytes exceed
    ///   `MAX_PAYLOAD_SIZE` (64 KiB)
    /// - [`ProtocolError::CborDecode`] if CBOR deserialization fails
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > PacketHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: PacketHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Id => Self::Id(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::Chat => Self::Chat(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::Register => Self::Register(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::Unregister => Self::Unregister(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::Login => Self::Login(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::Signup => Self::Signup(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::Refresh => Self::Refresh,
            Opcode::Logout => Self::Logout,
            Opcode::RoomsRequest => Self::RoomsRequest,
            Opcode::RoomsList => Self::RoomsList(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::NewRoom => Self::NewRoom(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::Ok => Self::Ok,
            Opcode::Deny => Self::Deny(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
            Opcode::Credentials => Self::Credentials(
                ciborium::de::from_reader(bytes)
                    .map_err(|e| ProtocolError::CborDecode(e.to_string()))?,
            ),
        };

        Ok(payload)
    }

    /// Convert payload into a transport packet.
    ///
    /// Encodes the body to CBOR, sets the matching opcode in the header, and
    /// builds a `Packet` with automatic `payload_size` calculation.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborEncode`] if serialization fails
    pub fn into_packet(self, mut header: PacketHeader) -> Result<Packet> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Ok(Packet::new(header, buf))
    }

    /// Parse payload from a raw transport packet.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnknownOpcode`] if the header opcode is not
    ///   recognized
    /// - [`ProtocolError::CborDecode`] if CBOR deserialization fails
    /// - [`ProtocolError::PayloadTooLarge`] if the payload exceeds the
    ///   maximum size
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let opcode = packet
            .header
            .opcode_enum()
            .ok_or_else(|| ProtocolError::UnknownOpcode(packet.header.opcode()))?;
        Self::decode(opcode, &packet.payload)
    }
}
