//! Session events and actions.
//!
//! The session state machine consumes [`SessionEvent`]s (transport
//! notifications and user intents) and returns [`SessionAction`]s for the
//! driver to execute. Neither type touches I/O.

use parley_proto::Packet;

/// Input to the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transport finished connecting.
    Established,

    /// The transport dropped, either cleanly or by error. Both paths
    /// converge here.
    Terminated,

    /// A packet arrived from the server.
    PacketReceived(Packet),

    /// The user submitted a chat message.
    SendMessage {
        /// Raw input text. Trimmed before sending; blank input is a no-op.
        text: String,
    },

    /// The user requested a logout.
    Disconnect,
}

/// Output of the session state machine, executed by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send a packet to the server.
    Send(Packet),

    /// Close the transport with the given close code and reason.
    CloseConnection {
        /// WebSocket close code (1000 for normal closure).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },

    /// Notify the auth endpoint of the logout (best effort).
    NotifyLogout,

    /// Drop the stored credential pair.
    ClearTokens,

    /// The session lost its transport; a token refresh and reconnect is
    /// needed before chatting can resume.
    RefreshNeeded,

    /// The server assigned an identity without a room scope; the user must
    /// pick a room.
    RoomSelectionNeeded,
}
