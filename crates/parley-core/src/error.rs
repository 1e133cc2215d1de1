//! Client error types.

use parley_proto::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the client session and auth flows.
///
/// Display strings double as user-facing messages: `Denied` renders the
/// server's reason verbatim so the UI can show it without translation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// A packet failed structural or CBOR decoding.
    #[error("malformed packet: {0}")]
    Malformed(#[from] ProtocolError),

    /// A response carried a payload type the flow did not expect.
    #[error("wrong message type: expected {expected}")]
    WrongMessageType {
        /// Name of the payload type the flow was waiting for.
        expected: &'static str,
    },

    /// The server rejected the request. Carries the server's reason
    /// verbatim.
    #[error("{reason}")]
    Denied {
        /// Human-readable rejection reason from the server.
        reason: String,
    },

    /// The server issued an incomplete credential pair. Stored tokens have
    /// been cleared.
    #[error("credential grant incomplete, tokens cleared")]
    CredentialInvalid,

    /// No stored credentials are available for an operation that requires
    /// them.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The transport dropped underneath an active session.
    #[error("transport lost: {reason}")]
    TransportLost {
        /// What terminated the transport.
        reason: String,
    },

    /// An HTTP request failed at the network or status level.
    #[error("request failed: {0}")]
    Request(String),
}

impl ClientError {
    /// Whether re-authenticating could resolve this error.
    #[must_use]
    pub const fn needs_reauth(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::CredentialInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_displays_reason_verbatim() {
        let err = ClientError::Denied { reason: "User already exists".to_string() };
        assert_eq!(err.to_string(), "User already exists");
    }

    #[test]
    fn protocol_error_converts() {
        let err: ClientError = ProtocolError::InvalidMagic.into();
        assert!(matches!(err, ClientError::Malformed(_)));
    }

    #[test]
    fn reauth_classification() {
        assert!(ClientError::NotAuthenticated.needs_reauth());
        assert!(ClientError::CredentialInvalid.needs_reauth());
        assert!(!ClientError::Denied { reason: "no".to_string() }.needs_reauth());
    }
}
