//! Authentication and room management over HTTP.
//!
//! The auth endpoints speak the same packet format as the chat socket, one
//! packet per request body and one per response body, as
//! `application/octet-stream`. Refresh and logout authorize with the
//! refresh token; room operations authorize with the access token.
//!
//! # Invariants
//!
//! - Stored credentials are atomic: a partial grant is never persisted, and
//!   a failed refresh leaves the store empty rather than holding a stale
//!   pair.
//! - Server rejection reasons pass through [`ClientError::Denied`]
//!   verbatim.

use std::sync::Arc;

use async_trait::async_trait;
use parley_core::{ClientError, CredentialPair, TokenStore};
use parley_proto::payloads::{
    CredentialGrant, LoginRequest, NewRoomRequest, RoomInfo, SignupRequest,
};
use parley_proto::{Packet, PacketHeader, Payload};
use tracing::{debug, warn};

const LOGIN_PATH: &str = "/login";
const REFRESH_PATH: &str = "/refresh";
const LOGOUT_PATH: &str = "/logout";
const ROOMS_PATH: &str = "/rooms";
const NEW_ROOM_PATH: &str = "/new-room";

/// One-shot request transport for the auth endpoints.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// POST `body` to `path`, optionally with an `Authorization` header.
    /// Returns the response body.
    async fn post(
        &self,
        path: &str,
        authorization: Option<&str>,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, ClientError>;
}

/// [`AuthTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport targeting `base_url` (scheme and host, no
    /// trailing slash).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl AuthTransport for HttpTransport {
    async fn post(
        &self,
        path: &str,
        authorization: Option<&str>,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, ClientError> {
        let mut request = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body);

        if let Some(token) = authorization {
            request = request.header(reqwest::header::AUTHORIZATION, token.to_string());
        }

        let response =
            request.send().await.map_err(|e| ClientError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Request(format!("unexpected status {status}")));
        }

        let bytes = response.bytes().await.map_err(|e| ClientError::Request(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Client for the auth and room endpoints.
pub struct AuthClient<T: AuthTransport> {
    transport: T,
    store: Arc<dyn TokenStore>,
}

impl<T: AuthTransport> AuthClient<T> {
    /// Create an auth client over `transport`, persisting credentials to
    /// `store`.
    pub fn new(transport: T, store: Arc<dyn TokenStore>) -> Self {
        Self { transport, store }
    }

    /// Log in and persist the issued credential pair.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Denied`] with the server's reason on rejection
    /// - [`ClientError::CredentialInvalid`] on a partial grant; stored
    ///   tokens are cleared first
    /// - [`ClientError::WrongMessageType`] on an unexpected response
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let body = encode(Payload::Login(LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }))?;

        let response = self.transport.post(LOGIN_PATH, None, body).await?;

        match decode(&response)? {
            Payload::Credentials(grant) => {
                let Some(pair) = grant_to_pair(grant) else {
                    // A half-issued pair is unusable; drop whatever we had
                    self.store.clear();
                    return Err(ClientError::CredentialInvalid);
                };
                self.store.save(pair);
                debug!(%username, "authenticated");
                Ok(())
            },
            Payload::Deny(deny) => Err(ClientError::Denied { reason: deny.reason }),
            _ => Err(ClientError::WrongMessageType { expected: "Credentials" }),
        }
    }

    /// Create an account. Does not log in; call
    /// [`AuthClient::authenticate`] afterwards.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let body = encode(Payload::Signup(SignupRequest {
            username: username.to_string(),
            password: password.to_string(),
        }))?;

        let response = self.transport.post(LOGIN_PATH, None, body).await?;

        match decode(&response)? {
            Payload::Ok => {
                debug!(%username, "account created");
                Ok(())
            },
            Payload::Deny(deny) => Err(ClientError::Denied { reason: deny.reason }),
            _ => Err(ClientError::WrongMessageType { expected: "Ok" }),
        }
    }

    /// Exchange the stored refresh token for a fresh credential pair.
    ///
    /// The store is cleared before the attempt, so a failed refresh can
    /// never leave a stale pair behind.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotAuthenticated`] if no pair is stored
    /// - [`ClientError::Denied`] if the server rejects the refresh token
    /// - [`ClientError::CredentialInvalid`] on a partial grant
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let Some(pair) = self.store.load() else {
            return Err(ClientError::NotAuthenticated);
        };

        // Single-use refresh token: clear first, re-persist only a
        // complete new pair
        self.store.clear();

        let body = encode(Payload::Refresh)?;
        let response =
            self.transport.post(REFRESH_PATH, Some(&pair.refresh_token), body).await?;

        match decode(&response)? {
            Payload::Credentials(grant) => {
                let Some(pair) = grant_to_pair(grant) else {
                    return Err(ClientError::CredentialInvalid);
                };
                self.store.save(pair);
                debug!("credentials refreshed");
                Ok(())
            },
            Payload::Deny(deny) => Err(ClientError::Denied { reason: deny.reason }),
            _ => Err(ClientError::WrongMessageType { expected: "Credentials" }),
        }
    }

    /// Log out: tell the server to revoke the refresh token, then drop the
    /// stored pair.
    ///
    /// The network call is best effort. Local credentials are cleared even
    /// when the server is unreachable, so logout never fails.
    pub async fn logout(&self) {
        self.notify_logout().await;
        self.store.clear();
    }

    /// Tell the server to revoke the refresh token. Best effort; does not
    /// touch the store.
    pub async fn notify_logout(&self) {
        if let Some(pair) = self.store.load() {
            match encode(Payload::Logout) {
                Ok(body) => {
                    if let Err(e) =
                        self.transport.post(LOGOUT_PATH, Some(&pair.refresh_token), body).await
                    {
                        warn!(error = %e, "logout notification failed");
                    }
                },
                Err(e) => warn!(error = %e, "logout packet failed to encode"),
            }
        }
    }

    /// List rooms visible to this account.
    pub async fn list_rooms(&self) -> Result<Vec<RoomInfo>, ClientError> {
        let Some(pair) = self.store.load() else {
            return Err(ClientError::NotAuthenticated);
        };

        let body = encode(Payload::RoomsRequest)?;
        let response = self.transport.post(ROOMS_PATH, Some(&pair.access_token), body).await?;

        match decode(&response)? {
            Payload::RoomsList(list) => Ok(list.rooms),
            Payload::Deny(deny) => Err(ClientError::Denied { reason: deny.reason }),
            _ => Err(ClientError::WrongMessageType { expected: "RoomsList" }),
        }
    }

    /// Create a room with the given name.
    pub async fn create_room(&self, name: &str) -> Result<(), ClientError> {
        let Some(pair) = self.store.load() else {
            return Err(ClientError::NotAuthenticated);
        };

        let body = encode(Payload::NewRoom(NewRoomRequest { name: name.to_string() }))?;
        let response = self.transport.post(NEW_ROOM_PATH, Some(&pair.access_token), body).await?;

        match decode(&response)? {
            Payload::Ok => Ok(()),
            Payload::Deny(deny) => Err(ClientError::Denied { reason: deny.reason }),
            _ => Err(ClientError::WrongMessageType { expected: "Ok" }),
        }
    }
}

/// A grant is usable only when both tokens are present and non-empty.
fn grant_to_pair(grant: CredentialGrant) -> Option<CredentialPair> {
    if !grant.is_complete() {
        return None;
    }
    match (grant.access_token, grant.refresh_token) {
        (Some(access_token), Some(refresh_token)) => {
            Some(CredentialPair { access_token, refresh_token })
        },
        _ => None,
    }
}

fn encode(payload: Payload) -> Result<Vec<u8>, ClientError> {
    let header = PacketHeader::new(payload.opcode());
    let packet = payload.into_packet(header)?;
    let mut bytes = Vec::new();
    packet.encode(&mut bytes)?;
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> Result<Payload, ClientError> {
    let packet = Packet::decode(bytes)?;
    Ok(Payload::from_packet(&packet)?)
}
