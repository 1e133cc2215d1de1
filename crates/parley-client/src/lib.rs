//! Parley chat client.
//!
//! The client splits into a pure session state machine and the I/O that
//! feeds it:
//!
//! - [`Session`]: Sans-IO state machine. Consumes [`SessionEvent`]s and
//!   emits [`SessionAction`]s; owns the roster and message history.
//! - [`ConnectionManager`]: WebSocket lifecycle (connect, send, close,
//!   clear) over a pluggable [`Connector`].
//! - [`AuthClient`]: login, signup, refresh, logout, and room management
//!   over HTTP.
//! - [`SessionDriver`]: async loop wiring the three together.
//!
//! Session logic never touches a socket, so every protocol behavior is
//! testable without a server.

pub mod auth;
pub mod connection;
pub mod event;
pub mod runtime;
pub mod session;
pub mod transport;

pub use auth::{AuthClient, AuthTransport, HttpTransport};
pub use connection::{
    ConnectionManager, ConnectionState, Connector, LinkRx, LinkTx, TransportEvent,
};
pub use event::{SessionAction, SessionEvent};
pub use runtime::{SessionCommand, SessionDriver, SessionHandle, SessionNotice, SessionSnapshot};
pub use session::{ChatEvent, Identity, Session};
pub use transport::WsConnector;
