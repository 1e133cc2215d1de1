//! Feeds arbitrary CBOR bodies to `Payload::from_packet` under every
//! opcode.
//!
//! Each opcode selects a different deserialization target, so the same
//! input is replayed against all of them. Garbage CBOR, bodies shaped for
//! the wrong opcode, and deeply nested structures must all surface as
//! decode errors.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use parley_proto::{Opcode, Packet, PacketHeader, Payload};

fuzz_target!(|data: &[u8]| {
    let opcodes = [
        Opcode::Id,
        Opcode::Chat,
        Opcode::Register,
        Opcode::Unregister,
        Opcode::Login,
        Opcode::Signup,
        Opcode::Refresh,
        Opcode::Logout,
        Opcode::RoomsRequest,
        Opcode::RoomsList,
        Opcode::NewRoom,
        Opcode::Ok,
        Opcode::Deny,
        Opcode::Credentials,
    ];

    for opcode in opcodes {
        let mut header = PacketHeader::new(opcode);
        header.set_room_id(1);
        header.set_sender_id(1);

        let packet = Packet::new(header, Bytes::copy_from_slice(data));
        let _ = Payload::from_packet(&packet);
    }
});
