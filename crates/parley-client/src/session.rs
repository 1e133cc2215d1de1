//! Session state machine.
//!
//! The `Session` is the Sans-IO core of the client: it owns the connection
//! identity, the room roster, and the message history, and it converts
//! events into actions without performing any I/O itself. The driver feeds
//! it transport events and user intents and executes whatever it returns.
//!
//! # Invariants
//!
//! - Roster entries are unique by user id. Re-registration replaces the
//!   existing entry in place.
//! - Identity, room, and roster belong to one connection. They reset when
//!   a new connection is established and rebuild from its events.
//! - The local user, once identified, sorts first in the roster.
//! - Message history is append-only and ordered by arrival.
//! - A malformed inbound packet is logged and dropped; it never terminates
//!   the session.

use parley_core::{ClientError, Environment};
use parley_proto::{
    Packet, PacketHeader, Payload,
    payloads::{ChatMessage, IdAssign, PresenceJoin, PresenceLeave, RoomInfo},
};
use tracing::{debug, warn};

use crate::event::{SessionAction, SessionEvent};

/// WebSocket close code for a normal closure.
const CLOSE_NORMAL: u16 = 1000;

/// A user known to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Server-assigned user identifier.
    pub id: u64,
    /// Display name.
    pub name: String,
}

/// A chat message in the session history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    /// Unix timestamp in milliseconds. Server-stamped when the packet
    /// carried one, locally stamped otherwise.
    pub timestamp: u64,
    /// Resolved author of the message.
    pub author: Identity,
    /// Message text.
    pub text: String,
}

/// Client session state machine.
///
/// Generic over [`Environment`] so tests control the clock used for local
/// message timestamps.
pub struct Session<E: Environment> {
    env: E,

    /// Whether this deployment scopes connections to a room. When set, an
    /// identity assignment without room context asks the user to pick one.
    requires_room: bool,

    /// Our identity, once the server assigns it.
    identity: Option<Identity>,

    /// Room this connection is scoped to, if any.
    room: Option<RoomInfo>,

    /// Users currently present, local user first.
    roster: Vec<Identity>,

    /// Append-only message history.
    history: Vec<ChatEvent>,

    connected: bool,

    /// Set once the user asks to log out, so the trailing transport
    /// termination is not treated as a failure.
    logout_requested: bool,
}

impl<E: Environment> Session<E> {
    /// Create a new session.
    pub fn new(env: E, requires_room: bool) -> Self {
        Self {
            env,
            requires_room,
            identity: None,
            room: None,
            roster: Vec::new(),
            history: Vec::new(),
            connected: false,
            logout_requested: false,
        }
    }

    /// Our server-assigned identity, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Room this connection is scoped to, if any.
    pub fn room(&self) -> Option<&RoomInfo> {
        self.room.as_ref()
    }

    /// Users currently present, local user first.
    pub fn roster(&self) -> &[Identity] {
        &self.roster
    }

    /// Message history in arrival order.
    pub fn history(&self) -> &[ChatEvent] {
        &self.history
    }

    /// Whether the transport is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Process an event and return resulting actions.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<SessionAction>, ClientError> {
        match event {
            SessionEvent::Established => {
                self.connected = true;
                self.logout_requested = false;
                // Identity, room, and roster are per-connection state; the
                // server reassigns all of them on the new socket
                self.identity = None;
                self.room = None;
                self.roster.clear();
                Ok(Vec::new())
            },
            SessionEvent::Terminated => Ok(self.handle_terminated()),
            SessionEvent::PacketReceived(packet) => Ok(self.handle_packet(&packet)),
            SessionEvent::SendMessage { text } => self.handle_send_message(&text),
            SessionEvent::Disconnect => Ok(self.handle_disconnect()),
        }
    }

    fn handle_terminated(&mut self) -> Vec<SessionAction> {
        self.connected = false;

        if self.logout_requested {
            debug!("transport closed after logout");
            return Vec::new();
        }

        warn!("transport lost, refresh needed");
        vec![SessionAction::RefreshNeeded]
    }

    fn handle_packet(&mut self, packet: &Packet) -> Vec<SessionAction> {
        let payload = match Payload::from_packet(packet) {
            Ok(payload) => payload,
            Err(e) => {
                // Malformed packets are dropped, not fatal
                warn!(error = %e, opcode = packet.header.opcode(), "discarding malformed packet");
                return Vec::new();
            },
        };

        match payload {
            Payload::Id(assign) => self.handle_id(assign),
            Payload::Chat(msg) => {
                self.handle_chat(packet.header.sender_id(), msg);
                Vec::new()
            },
            Payload::Register(join) => {
                self.handle_register(join);
                Vec::new()
            },
            Payload::Unregister(leave) => {
                self.handle_unregister(&leave);
                Vec::new()
            },
            other => {
                // Auth and room-management payloads belong to the HTTP
                // endpoints, not the chat socket
                warn!(opcode = ?other.opcode(), "unexpected payload on chat connection");
                Vec::new()
            },
        }
    }

    fn handle_id(&mut self, assign: IdAssign) -> Vec<SessionAction> {
        debug!(id = assign.id, username = %assign.username, "identity assigned");

        let me = Identity { id: assign.id, name: assign.username };
        self.identity = Some(me.clone());
        self.room = assign.room;

        self.upsert_roster(me);

        if self.requires_room && self.room.is_none() {
            return vec![SessionAction::RoomSelectionNeeded];
        }
        Vec::new()
    }

    fn handle_chat(&mut self, sender_id: u64, msg: ChatMessage) {
        let timestamp = msg.timestamp.unwrap_or_else(|| self.env.unix_millis());

        // Prefer the roster name for the sender, then the embedded name,
        // then a placeholder
        let name = self
            .roster
            .iter()
            .find(|m| m.id == sender_id)
            .map(|m| m.name.clone())
            .or_else(|| (!msg.sender_name.is_empty()).then(|| msg.sender_name.clone()))
            .unwrap_or_else(|| format!("Client {sender_id}"));

        self.history.push(ChatEvent {
            timestamp,
            author: Identity { id: sender_id, name },
            text: msg.text,
        });
    }

    fn handle_register(&mut self, join: PresenceJoin) {
        debug!(id = join.id, username = %join.username, "user joined");
        self.upsert_roster(Identity { id: join.id, name: join.username });
    }

    fn handle_unregister(&mut self, leave: &PresenceLeave) {
        debug!(id = leave.id, "user left");
        self.roster.retain(|m| m.id != leave.id);
    }

    fn handle_send_message(&mut self, text: &str) -> Result<Vec<SessionAction>, ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let Some(me) = self.identity.clone() else {
            warn!("dropping outbound message: no identity assigned yet");
            return Ok(Vec::new());
        };

        let mut header = PacketHeader::new(parley_proto::Opcode::Chat);
        if let Some(room) = &self.room {
            header.set_room_id(room.room_id);
        }

        // Outbound messages are unstamped; receivers stamp on arrival
        let packet = Payload::Chat(ChatMessage {
            timestamp: None,
            sender_name: String::new(),
            text: text.to_string(),
        })
        .into_packet(header)?;

        // Local echo so our own message shows without a server round trip
        self.history.push(ChatEvent {
            timestamp: self.env.unix_millis(),
            author: me,
            text: text.to_string(),
        });

        Ok(vec![SessionAction::Send(packet)])
    }

    fn handle_disconnect(&mut self) -> Vec<SessionAction> {
        self.logout_requested = true;
        vec![
            SessionAction::NotifyLogout,
            SessionAction::ClearTokens,
            SessionAction::CloseConnection { code: CLOSE_NORMAL, reason: "logout".to_string() },
        ]
    }

    /// Insert or replace a roster entry, keeping the local user first.
    fn upsert_roster(&mut self, user: Identity) {
        if let Some(existing) = self.roster.iter_mut().find(|m| m.id == user.id) {
            *existing = user;
        } else {
            self.roster.push(user);
        }

        if let Some(me) = &self.identity {
            let my_id = me.id;
            // Stable sort keeps arrival order among remote users
            self.roster.sort_by_key(|m| m.id != my_id);
        }
    }
}
