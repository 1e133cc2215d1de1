//! Cross-layer packet tests: typed payloads through the full wire format.

#![allow(clippy::unwrap_used)]

use hex_literal::hex;
use parley_proto::payloads::{ChatMessage, DenyReason, IdAssign, PresenceLeave, RoomInfo};
use parley_proto::{Opcode, Packet, PacketHeader, Payload, ProtocolError};
use proptest::prelude::*;

fn arbitrary_payload() -> impl Strategy<Value = Payload> {
    prop_oneof![
        (any::<u64>(), ".*", prop::option::of(arbitrary_room())).prop_map(
            |(id, username, room)| Payload::Id(IdAssign { id, username, room })
        ),
        (prop::option::of(any::<u64>()), ".*", ".*").prop_map(|(timestamp, sender_name, text)| {
            Payload::Chat(ChatMessage { timestamp, sender_name, text })
        }),
        any::<u64>().prop_map(|id| Payload::Unregister(PresenceLeave { id })),
        ".*".prop_map(|reason| Payload::Deny(DenyReason { reason })),
        Just(Payload::Refresh),
        Just(Payload::Ok),
    ]
}

fn arbitrary_room() -> impl Strategy<Value = RoomInfo> {
    (any::<u64>(), ".*", ".*")
        .prop_map(|(room_id, owner_id, name)| RoomInfo { room_id, owner_id, name })
}

proptest! {
    #[test]
    fn payload_survives_wire_round_trip(payload in arbitrary_payload(), sender in any::<u64>(), room in any::<u64>()) {
        let mut header = PacketHeader::new(payload.opcode());
        header.set_sender_id(sender);
        header.set_room_id(room);

        let packet = payload.clone().into_packet(header).unwrap();

        let mut wire = Vec::new();
        packet.encode(&mut wire).unwrap();

        let parsed = Packet::decode(&wire).unwrap();
        prop_assert_eq!(parsed.header.sender_id(), sender);
        prop_assert_eq!(parsed.header.room_id(), room);

        let decoded = Payload::from_packet(&parsed).unwrap();
        prop_assert_eq!(payload, decoded);
    }
}

#[test]
fn golden_unregister_packet() {
    // 32-byte header followed by CBOR {"id": 9}
    let wire = hex!(
        "50524c59" // magic "PRLY"
        "01"       // version
        "00"       // reserved
        "0004"     // opcode: Unregister
        "0000000000000000" // sender_id
        "0000000000000005" // room_id
        "00000005" // payload_size
        "00000000" // reserved
        "a162696409"
    );

    let packet = Packet::decode(&wire).unwrap();
    assert_eq!(packet.header.opcode_enum(), Some(Opcode::Unregister));
    assert_eq!(packet.header.room_id(), 5);

    let payload = Payload::from_packet(&packet).unwrap();
    assert_eq!(payload, Payload::Unregister(PresenceLeave { id: 9 }));

    // Re-encoding reproduces the exact bytes
    let mut header = PacketHeader::new(Opcode::Unregister);
    header.set_room_id(5);
    let rebuilt = Payload::Unregister(PresenceLeave { id: 9 }).into_packet(header).unwrap();
    let mut out = Vec::new();
    rebuilt.encode(&mut out).unwrap();
    assert_eq!(out.as_slice(), &wire[..]);
}

#[test]
fn unknown_opcode_surfaces_as_error() {
    // Valid framing, unrecognized opcode 0x7777
    let wire = hex!(
        "50524c59"
        "01"
        "00"
        "7777"
        "0000000000000000"
        "0000000000000000"
        "00000000"
        "00000000"
    );

    let packet = Packet::decode(&wire).unwrap();
    assert_eq!(packet.header.opcode_enum(), None);

    let result = Payload::from_packet(&packet);
    assert_eq!(result, Err(ProtocolError::UnknownOpcode(0x7777)));
}
