//! Connection lifecycle management.
//!
//! [`ConnectionManager`] owns the chat socket: it dials through a pluggable
//! [`Connector`], pumps frames between the link and the event sink on a
//! spawned task, and enforces the lifecycle rules (no double connect, sends
//! dropped while down, sender id zeroed on the way out).
//!
//! Protocol logic lives in [`crate::Session`]; this layer only moves bytes.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley_proto::Packet;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket. Sends are dropped.
    Disconnected,
    /// Dial in progress.
    Connecting,
    /// Socket is up.
    Connected,
}

/// Notification from the connection task.
#[derive(Debug)]
pub enum TransportEvent {
    /// The socket finished connecting.
    Established,
    /// The socket dropped. Clean closes and errors both land here.
    Terminated,
    /// A packet arrived.
    Packet(Packet),
}

/// Dials a server and produces a link split into send and receive halves.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Sending half of the link.
    type Tx: LinkTx;
    /// Receiving half of the link.
    type Rx: LinkRx;

    /// Open a connection to `url`.
    async fn dial(&self, url: &str) -> Result<(Self::Tx, Self::Rx), TransportError>;
}

/// Sending half of an established link.
#[async_trait]
pub trait LinkTx: Send + 'static {
    /// Send one binary message.
    async fn send(&mut self, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Close the link with the given close code and reason.
    async fn close(&mut self, code: u16, reason: String) -> Result<(), TransportError>;
}

/// Receiving half of an established link.
#[async_trait]
pub trait LinkRx: Send + 'static {
    /// Receive the next binary message. `None` means the link ended.
    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>>;
}

enum Command {
    Packet(Vec<u8>),
    Close { code: u16, reason: String },
}

struct Shared {
    state: Mutex<ConnectionState>,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    task: Mutex<Option<AbortHandle>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        self.state.lock().map_or(ConnectionState::Disconnected, |guard| *guard)
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    fn emit(&self, event: TransportEvent) {
        let sink = self.events.lock().ok().and_then(|guard| guard.clone());
        if let Some(sink) = sink {
            // Receiver gone means nobody is listening anymore
            let _ = sink.send(event);
        }
    }
}

/// Manages the single chat socket.
///
/// Mirrors the lifecycle of a browser WebSocket wrapper: `configure` sets
/// the event sink (last write wins), `connect` is a no-op unless
/// disconnected, `send` drops silently while the socket is down, and
/// `clear` tears everything back to the initial state.
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    shared: Arc<Shared>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self { connector: Arc::clone(&self.connector), shared: Arc::clone(&self.shared) }
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager in the disconnected state.
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected),
                events: Mutex::new(None),
                outbound: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    /// Set the event sink. Replaces any previous sink.
    pub fn configure(&self, events: mpsc::UnboundedSender<TransportEvent>) {
        if let Ok(mut guard) = self.shared.events.lock() {
            *guard = Some(events);
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Open the connection.
    ///
    /// A no-op (with a log line) when a connection is already open or in
    /// progress.
    pub fn connect(&self, url: &str) {
        if self.shared.state() != ConnectionState::Disconnected {
            warn!("connect ignored: connection already open or in progress");
            return;
        }

        self.shared.set_state(ConnectionState::Connecting);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        if let Ok(mut guard) = self.shared.outbound.lock() {
            *guard = Some(cmd_tx);
        }

        let connector = Arc::clone(&self.connector);
        let shared = Arc::clone(&self.shared);
        let url = url.to_string();
        let handle = tokio::spawn(run_link(connector, url, cmd_rx, shared));

        if let Ok(mut guard) = self.shared.task.lock() {
            *guard = Some(handle.abort_handle());
        }
    }

    /// Send a packet to the server.
    ///
    /// Dropped (with a log line) unless the connection is up. The header's
    /// sender id is forced to zero before encoding; the server assigns the
    /// real sender from the connection credential.
    pub fn send(&self, mut packet: Packet) {
        if self.shared.state() != ConnectionState::Connected {
            warn!("send dropped: connection not open");
            return;
        }

        packet.header.set_sender_id(0);

        let mut bytes = Vec::new();
        if let Err(e) = packet.encode(&mut bytes) {
            warn!(error = %e, "send dropped: packet failed to encode");
            return;
        }

        let outbound = self.shared.outbound.lock().ok().and_then(|guard| guard.clone());
        if let Some(outbound) = outbound {
            let _ = outbound.send(Command::Packet(bytes));
        }
    }

    /// Close the connection gracefully.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let outbound = self.shared.outbound.lock().ok().and_then(|guard| guard.clone());
        if let Some(outbound) = outbound {
            let _ = outbound.send(Command::Close { code, reason: reason.into() });
        }
    }

    /// Tear down to the initial state: abort the connection task, drop the
    /// event sink, forget the socket. Idempotent.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.shared.task.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        if let Ok(mut guard) = self.shared.outbound.lock() {
            *guard = None;
        }
        if let Ok(mut guard) = self.shared.events.lock() {
            *guard = None;
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }
}

/// Connection task: dial, then pump frames until the link ends.
async fn run_link<C: Connector>(
    connector: Arc<C>,
    url: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
) {
    let (mut tx, mut rx) = match connector.dial(&url).await {
        Ok(link) => link,
        Err(e) => {
            warn!(error = %e, "dial failed");
            shared.set_state(ConnectionState::Disconnected);
            if let Ok(mut guard) = shared.outbound.lock() {
                *guard = None;
            }
            shared.emit(TransportEvent::Terminated);
            return;
        },
    };

    shared.set_state(ConnectionState::Connected);
    shared.emit(TransportEvent::Established);
    debug!(%url, "connection established");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Packet(bytes)) => {
                    if let Err(e) = tx.send(bytes).await {
                        warn!(error = %e, "send failed, dropping connection");
                        break;
                    }
                },
                Some(Command::Close { code, reason }) => {
                    debug!(code, %reason, "closing connection");
                    if let Err(e) = tx.close(code, reason).await {
                        warn!(error = %e, "close handshake failed");
                    }
                    break;
                },
                // Manager dropped the channel
                None => break,
            },
            inbound = rx.recv() => match inbound {
                Some(Ok(bytes)) => match Packet::decode(&bytes) {
                    Ok(packet) => shared.emit(TransportEvent::Packet(packet)),
                    // Malformed frames are dropped, the connection stays up
                    Err(e) => warn!(error = %e, "discarding undecodable frame"),
                },
                Some(Err(e)) => {
                    warn!(error = %e, "transport error");
                    break;
                },
                None => break,
            },
        }
    }

    shared.set_state(ConnectionState::Disconnected);
    if let Ok(mut guard) = shared.outbound.lock() {
        *guard = None;
    }
    shared.emit(TransportEvent::Terminated);
    debug!("connection terminated");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parley_proto::{Opcode, PacketHeader, Payload};

    use super::*;

    /// Link halves backed by channels, plus a handle for the test side.
    struct MockConnector {
        dial_count: AtomicUsize,
        /// When set, dial never completes.
        hang: bool,
        /// Server side of the link, installed on first dial.
        server: Mutex<Option<ServerSide>>,
    }

    struct ServerSide {
        to_client: mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>,
        from_client: mpsc::UnboundedReceiver<Vec<u8>>,
    }

    struct MockTx {
        sent: mpsc::UnboundedSender<Vec<u8>>,
    }

    struct MockRx {
        inbound: mpsc::UnboundedReceiver<Result<Vec<u8>, TransportError>>,
    }

    #[async_trait]
    impl LinkTx for MockTx {
        async fn send(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
            self.sent
                .send(bytes)
                .map_err(|_| TransportError::Stream("peer gone".to_string()))
        }

        async fn close(&mut self, _code: u16, _reason: String) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[async_trait]
    impl LinkRx for MockRx {
        async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
            self.inbound.recv().await
        }
    }

    impl MockConnector {
        fn new() -> Self {
            Self { dial_count: AtomicUsize::new(0), hang: false, server: Mutex::new(None) }
        }

        fn hanging() -> Self {
            Self { hang: true, ..Self::new() }
        }

        fn take_server(&self) -> ServerSide {
            self.server.lock().unwrap().take().unwrap()
        }
    }

    #[async_trait]
    impl Connector for Arc<MockConnector> {
        type Tx = MockTx;
        type Rx = MockRx;

        async fn dial(&self, _url: &str) -> Result<(Self::Tx, Self::Rx), TransportError> {
            self.dial_count.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }

            let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
            let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();
            *self.server.lock().unwrap() =
                Some(ServerSide { to_client: to_client_tx, from_client: from_client_rx });

            Ok((MockTx { sent: from_client_tx }, MockRx { inbound: to_client_rx }))
        }
    }

    fn chat_packet(text: &str) -> Packet {
        let payload = Payload::Chat(parley_proto::payloads::ChatMessage {
            timestamp: None,
            sender_name: String::new(),
            text: text.to_string(),
        });
        payload.into_packet(PacketHeader::new(Opcode::Chat)).unwrap()
    }

    async fn connect_and_wait(
        manager: &ConnectionManager<Arc<MockConnector>>,
    ) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        manager.configure(events_tx);
        manager.connect("ws://test");

        let event = tokio::time::timeout(Duration::from_secs(1), events_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, TransportEvent::Established));
        event_loop_settled().await;
        events_rx
    }

    /// Let the spawned connection task observe state changes.
    async fn event_loop_settled() {
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn connect_delivers_packets() {
        let connector = Arc::new(MockConnector::new());
        let manager = ConnectionManager::new(Arc::clone(&connector));
        let mut events = connect_and_wait(&manager).await;
        assert_eq!(manager.state(), ConnectionState::Connected);

        let server = connector.take_server();
        let mut wire = Vec::new();
        chat_packet("hello").encode(&mut wire).unwrap();
        server.to_client.send(Ok(wire)).unwrap();

        let event =
            tokio::time::timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        let TransportEvent::Packet(packet) = event else {
            panic!("expected packet event");
        };
        assert_eq!(packet.header.opcode_enum(), Some(Opcode::Chat));
    }

    #[tokio::test]
    async fn double_connect_is_noop() {
        let connector = Arc::new(MockConnector::hanging());
        let manager = ConnectionManager::new(Arc::clone(&connector));
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        manager.configure(events_tx);

        manager.connect("ws://test");
        event_loop_settled().await;
        manager.connect("ws://test");
        event_loop_settled().await;

        assert_eq!(connector.dial_count.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn send_while_disconnected_is_dropped() {
        let connector = Arc::new(MockConnector::new());
        let manager = ConnectionManager::new(Arc::clone(&connector));

        // No connect: nothing to send on, nothing panics
        manager.send(chat_packet("into the void"));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn outbound_sender_id_is_zeroed() {
        let connector = Arc::new(MockConnector::new());
        let manager = ConnectionManager::new(Arc::clone(&connector));
        let _events = connect_and_wait(&manager).await;

        let mut packet = chat_packet("hi");
        packet.header.set_sender_id(0xDEAD_BEEF);
        manager.send(packet);

        let mut server = connector.take_server();
        let sent = tokio::time::timeout(Duration::from_secs(1), server.from_client.recv())
            .await
            .unwrap()
            .unwrap();
        let decoded = Packet::decode(&sent).unwrap();
        assert_eq!(decoded.header.sender_id(), 0);
    }

    #[tokio::test]
    async fn malformed_inbound_frame_keeps_connection_up() {
        let connector = Arc::new(MockConnector::new());
        let manager = ConnectionManager::new(Arc::clone(&connector));
        let mut events = connect_and_wait(&manager).await;

        let server = connector.take_server();
        server.to_client.send(Ok(vec![0xBA, 0xD0])).unwrap();

        // Follow with a valid packet to prove the connection survived
        let mut wire = Vec::new();
        chat_packet("still here").encode(&mut wire).unwrap();
        server.to_client.send(Ok(wire)).unwrap();

        let event =
            tokio::time::timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert!(matches!(event, TransportEvent::Packet(_)));
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn link_end_terminates_once() {
        let connector = Arc::new(MockConnector::new());
        let manager = ConnectionManager::new(Arc::clone(&connector));
        let mut events = connect_and_wait(&manager).await;

        let server = connector.take_server();
        drop(server.to_client);

        let event =
            tokio::time::timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert!(matches!(event, TransportEvent::Terminated));
        event_loop_settled().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let connector = Arc::new(MockConnector::new());
        let manager = ConnectionManager::new(Arc::clone(&connector));
        let _events = connect_and_wait(&manager).await;

        manager.clear();
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.clear();
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        // Reconnect works after clear
        let _events = connect_and_wait(&manager).await;
        assert_eq!(manager.state(), ConnectionState::Connected);
    }
}
