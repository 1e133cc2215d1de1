//! End-to-end session flow against an in-memory server.
//!
//! Wires the real driver, session, and connection manager to channel-backed
//! transport mocks and walks the full lifecycle: connect, identity, chat,
//! logout.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use parley_client::auth::AuthTransport;
use parley_client::{
    AuthClient, ConnectionManager, Connector, LinkRx, LinkTx, SessionCommand, SessionDriver,
    SessionNotice, SessionSnapshot,
};
use parley_client::connection::TransportError;
use parley_core::test_utils::MockEnv;
use parley_core::{ClientError, CredentialPair, MemoryTokenStore, TokenStore};
use parley_proto::payloads::{ChatMessage, IdAssign, PresenceJoin, RoomInfo};
use parley_proto::{Opcode, Packet, PacketHeader, Payload};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

/// Connector backed by channels. Clones share the server side, so the
/// test keeps a handle to the link the manager dials.
#[derive(Clone, Default)]
struct ChannelConnector {
    server: Arc<Mutex<Option<ServerSide>>>,
}

struct ServerSide {
    to_client: mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>,
    from_client: mpsc::UnboundedReceiver<Vec<u8>>,
}

struct ChannelTx {
    sent: mpsc::UnboundedSender<Vec<u8>>,
}

struct ChannelRx {
    inbound: mpsc::UnboundedReceiver<Result<Vec<u8>, TransportError>>,
}

impl ChannelConnector {
    fn take_server(&self) -> ServerSide {
        self.server.lock().unwrap().take().unwrap()
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    type Tx = ChannelTx;
    type Rx = ChannelRx;

    async fn dial(&self, _url: &str) -> Result<(Self::Tx, Self::Rx), TransportError> {
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();
        *self.server.lock().unwrap() =
            Some(ServerSide { to_client: to_client_tx, from_client: from_client_rx });
        Ok((ChannelTx { sent: from_client_tx }, ChannelRx { inbound: to_client_rx }))
    }
}

#[async_trait]
impl LinkTx for ChannelTx {
    async fn send(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.sent.send(bytes).map_err(|_| TransportError::Stream("peer gone".to_string()))
    }

    async fn close(&mut self, _code: u16, _reason: String) -> Result<(), TransportError> {
        Ok(())
    }
}

#[async_trait]
impl LinkRx for ChannelRx {
    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        self.inbound.recv().await
    }
}

/// Auth endpoint double. Clones share the request log.
#[derive(Clone, Default)]
struct RecordingAuth {
    responses: Arc<Mutex<VecDeque<Vec<u8>>>>,
    requests: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl RecordingAuth {
    fn requests(&self) -> Vec<(String, Option<String>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthTransport for RecordingAuth {
    async fn post(
        &self,
        path: &str,
        authorization: Option<&str>,
        _body: Vec<u8>,
    ) -> Result<Vec<u8>, ClientError> {
        self.requests
            .lock()
            .unwrap()
            .push((path.to_string(), authorization.map(str::to_string)));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ClientError::Request("no canned response".to_string()))
    }
}

struct Harness {
    connector: ChannelConnector,
    auth: RecordingAuth,
    store: Arc<MemoryTokenStore>,
    manager: ConnectionManager<ChannelConnector>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
    notices: mpsc::UnboundedReceiver<SessionNotice>,
}

fn harness(requires_room: bool) -> Harness {
    let connector = ChannelConnector::default();
    let manager = ConnectionManager::new(connector.clone());

    let auth = RecordingAuth::default();
    let store = Arc::new(MemoryTokenStore::new());
    store.save(CredentialPair {
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
    });

    let session = parley_client::Session::new(MockEnv::at(5_000), requires_room);
    let auth_client = AuthClient::new(
        auth.clone(),
        Arc::clone(&store) as Arc<dyn TokenStore>,
    );

    let (driver, handle) = SessionDriver::new(
        session,
        manager.clone(),
        auth_client,
        Arc::clone(&store) as Arc<dyn TokenStore>,
    );
    tokio::spawn(driver.run());

    Harness {
        connector,
        auth,
        store,
        manager,
        commands: handle.commands,
        snapshot: handle.snapshot,
        notices: handle.notices,
    }
}

async fn wait_for(
    snapshot: &mut watch::Receiver<SessionSnapshot>,
    mut pred: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    timeout(Duration::from_secs(2), async {
        loop {
            {
                let current = snapshot.borrow();
                if pred(&current) {
                    return current.clone();
                }
            }
            snapshot.changed().await.unwrap();
        }
    })
    .await
    .expect("condition not reached in time")
}

fn send_payload(server: &ServerSide, payload: Payload, sender_id: u64) {
    let mut header = PacketHeader::new(payload.opcode());
    header.set_sender_id(sender_id);
    let packet = payload.into_packet(header).unwrap();
    let mut wire = Vec::new();
    packet.encode(&mut wire).unwrap();
    server.to_client.send(Ok(wire)).unwrap();
}

#[tokio::test]
async fn full_chat_lifecycle() {
    let mut h = harness(false);
    h.manager.connect("ws://test?room=1&token=access");

    wait_for(&mut h.snapshot, |s| s.connected).await;
    let mut server = h.connector.take_server();

    // Server assigns identity with room context
    let room = RoomInfo { room_id: 1, owner_id: "alice".to_string(), name: "general".to_string() };
    send_payload(
        &server,
        Payload::Id(IdAssign { id: 7, username: "alice".to_string(), room: Some(room.clone()) }),
        0,
    );
    let snap = wait_for(&mut h.snapshot, |s| s.identity.is_some()).await;
    assert_eq!(snap.identity.unwrap().name, "alice");
    assert_eq!(snap.room, Some(room));
    assert_eq!(snap.roster.len(), 1);

    // Another user joins and speaks
    send_payload(&server, Payload::Register(PresenceJoin { id: 2, username: "bob".to_string() }), 0);
    send_payload(
        &server,
        Payload::Chat(ChatMessage {
            timestamp: Some(6_000),
            sender_name: String::new(),
            text: "hi alice".to_string(),
        }),
        2,
    );
    let snap = wait_for(&mut h.snapshot, |s| !s.history.is_empty()).await;
    assert_eq!(snap.roster.len(), 2);
    assert_eq!(snap.history[0].author.name, "bob");
    assert_eq!(snap.history[0].timestamp, 6_000);

    // We reply: the packet goes out with sender zeroed and room scoped,
    // and the message echoes locally
    h.commands.send(SessionCommand::SendMessage { text: " hi bob ".to_string() }).unwrap();

    let wire = timeout(Duration::from_secs(2), server.from_client.recv()).await.unwrap().unwrap();
    let sent = Packet::decode(&wire).unwrap();
    assert_eq!(sent.header.opcode_enum(), Some(Opcode::Chat));
    assert_eq!(sent.header.sender_id(), 0);
    assert_eq!(sent.header.room_id(), 1);
    let Payload::Chat(msg) = Payload::from_packet(&sent).unwrap() else {
        panic!("expected chat payload");
    };
    assert_eq!(msg.text, "hi bob");
    assert_eq!(msg.timestamp, None);

    let snap = wait_for(&mut h.snapshot, |s| s.history.len() == 2).await;
    assert_eq!(snap.history[1].author.name, "alice");
    assert_eq!(snap.history[1].timestamp, 5_000);
}

#[tokio::test]
async fn logout_clears_tokens_and_notifies_server() {
    let mut h = harness(false);
    h.manager.connect("ws://test");
    wait_for(&mut h.snapshot, |s| s.connected).await;

    h.commands.send(SessionCommand::Disconnect).unwrap();
    wait_for(&mut h.snapshot, |s| !s.connected).await;

    assert_eq!(h.store.load(), None);
    assert_eq!(
        h.auth.requests(),
        vec![("/logout".to_string(), Some("refresh".to_string()))]
    );

    // Intentional logout never asks for a refresh
    assert!(h.notices.try_recv().is_err());
}

#[tokio::test]
async fn lost_transport_raises_refresh_notice() {
    let mut h = harness(false);
    h.manager.connect("ws://test");
    wait_for(&mut h.snapshot, |s| s.connected).await;

    let server = h.connector.take_server();
    drop(server);

    wait_for(&mut h.snapshot, |s| !s.connected).await;
    let notice = timeout(Duration::from_secs(2), h.notices.recv()).await.unwrap().unwrap();
    assert_eq!(notice, SessionNotice::RefreshNeeded);
}

#[tokio::test]
async fn unscoped_identity_raises_room_notice() {
    let mut h = harness(true);
    h.manager.connect("ws://test");
    wait_for(&mut h.snapshot, |s| s.connected).await;

    let server = h.connector.take_server();
    send_payload(
        &server,
        Payload::Id(IdAssign { id: 7, username: "alice".to_string(), room: None }),
        0,
    );

    let notice = timeout(Duration::from_secs(2), h.notices.recv()).await.unwrap().unwrap();
    assert_eq!(notice, SessionNotice::RoomSelectionNeeded);
}
