//! Wire protocol for the Parley chat client.
//!
//! Every message exchanged with the server - over the persistent WebSocket
//! or a transient auth request - is a single [`Packet`]: a fixed 32-byte
//! binary header followed by a CBOR-encoded payload body. The header's
//! opcode is the discriminator for the [`Payload`] union; exactly one
//! variant is active per packet.
//!
//! # Layers
//!
//! - [`PacketHeader`]: raw big-endian header, parsed without copying
//! - [`Packet`]: header + raw payload bytes (transport layer)
//! - [`Payload`]: typed message union (logic layer)
//!
//! Decode failures are typed [`ProtocolError`]s. Callers log and discard
//! malformed packets; a bad frame from a hostile or out-of-sync peer must
//! never terminate the connection.

mod errors;
mod header;
mod packet;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use header::{Opcode, PacketHeader};
pub use packet::Packet;
pub use payloads::Payload;
