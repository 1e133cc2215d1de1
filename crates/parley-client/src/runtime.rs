//! Session driver.
//!
//! [`SessionDriver`] is the async loop that wires the pieces together: it
//! feeds transport events and user commands into the [`Session`] state
//! machine in arrival order, executes the actions it returns, and publishes
//! a state snapshot after every step.

use std::sync::Arc;

use parley_core::{Environment, TokenStore};
use parley_proto::payloads::RoomInfo;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use crate::auth::{AuthClient, AuthTransport};
use crate::connection::{ConnectionManager, Connector, TransportEvent};
use crate::event::{SessionAction, SessionEvent};
use crate::session::{ChatEvent, Identity, Session};

/// User intent fed into the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Send a chat message.
    SendMessage {
        /// Raw input text.
        text: String,
    },
    /// Log out and close the connection.
    Disconnect,
}

/// Out-of-band condition the UI must act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotice {
    /// The transport dropped unexpectedly; refresh credentials and
    /// reconnect.
    RefreshNeeded,
    /// The server assigned an identity without a room; the user must pick
    /// one.
    RoomSelectionNeeded,
}

/// Point-in-time view of the session state.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// Whether the transport is up.
    pub connected: bool,
    /// Our identity, once assigned.
    pub identity: Option<Identity>,
    /// Room scope, if any.
    pub room: Option<RoomInfo>,
    /// Users present, local user first.
    pub roster: Vec<Identity>,
    /// Message history in arrival order.
    pub history: Vec<ChatEvent>,
}

/// Handle held by the UI: commands in, snapshots and notices out.
pub struct SessionHandle {
    /// Send user intents to the driver.
    pub commands: mpsc::UnboundedSender<SessionCommand>,
    /// Watch the session state.
    pub snapshot: watch::Receiver<SessionSnapshot>,
    /// Receive out-of-band notices.
    pub notices: mpsc::UnboundedReceiver<SessionNotice>,
}

/// Async loop driving a [`Session`] against real I/O.
pub struct SessionDriver<E: Environment, C: Connector, T: AuthTransport> {
    session: Session<E>,
    manager: ConnectionManager<C>,
    auth: AuthClient<T>,
    store: Arc<dyn TokenStore>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    snapshot: watch::Sender<SessionSnapshot>,
    notices: mpsc::UnboundedSender<SessionNotice>,
}

impl<E: Environment, C: Connector, T: AuthTransport> SessionDriver<E, C, T> {
    /// Wire a driver to a session, connection manager, and auth client.
    ///
    /// Registers the driver as the manager's event sink. The returned
    /// handle is the UI's side of the loop.
    pub fn new(
        session: Session<E>,
        manager: ConnectionManager<C>,
        auth: AuthClient<T>,
        store: Arc<dyn TokenStore>,
    ) -> (Self, SessionHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        manager.configure(events_tx);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        let driver = Self {
            session,
            manager,
            auth,
            store,
            transport_events: events_rx,
            commands: commands_rx,
            snapshot: snapshot_tx,
            notices: notices_tx,
        };
        let handle =
            SessionHandle { commands: commands_tx, snapshot: snapshot_rx, notices: notices_rx };

        (driver, handle)
    }

    /// Run until both the transport and the command channel are gone.
    pub async fn run(mut self) {
        loop {
            let event = tokio::select! {
                transport = self.transport_events.recv() => match transport {
                    Some(TransportEvent::Established) => SessionEvent::Established,
                    Some(TransportEvent::Terminated) => SessionEvent::Terminated,
                    Some(TransportEvent::Packet(packet)) => SessionEvent::PacketReceived(packet),
                    None => break,
                },
                command = self.commands.recv() => match command {
                    Some(SessionCommand::SendMessage { text }) => SessionEvent::SendMessage { text },
                    Some(SessionCommand::Disconnect) => SessionEvent::Disconnect,
                    None => break,
                },
            };

            match self.session.handle(event) {
                Ok(actions) => {
                    for action in actions {
                        self.execute(action).await;
                    }
                },
                Err(e) => error!(error = %e, "session rejected event"),
            }

            self.publish();
        }

        debug!("session driver stopped");
    }

    async fn execute(&self, action: SessionAction) {
        match action {
            SessionAction::Send(packet) => self.manager.send(packet),
            SessionAction::CloseConnection { code, reason } => self.manager.close(code, reason),
            SessionAction::NotifyLogout => self.auth.notify_logout().await,
            SessionAction::ClearTokens => self.store.clear(),
            SessionAction::RefreshNeeded => {
                let _ = self.notices.send(SessionNotice::RefreshNeeded);
            },
            SessionAction::RoomSelectionNeeded => {
                let _ = self.notices.send(SessionNotice::RoomSelectionNeeded);
            },
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(SessionSnapshot {
            connected: self.session.is_connected(),
            identity: self.session.identity().cloned(),
            room: self.session.room().cloned(),
            roster: self.session.roster().to_vec(),
            history: self.session.history().to_vec(),
        });
    }
}
