//! Credential storage.
//!
//! The server issues a short-lived access token and a long-lived refresh
//! token as a pair. Storage treats the pair as atomic: a partial pair is
//! never persisted and never returned, so callers can assume that a loaded
//! pair is usable as-is.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// An access/refresh token pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Short-lived token presented on authenticated requests.
    pub access_token: String,
    /// Long-lived token used to mint a fresh pair.
    pub refresh_token: String,
}

impl CredentialPair {
    /// Whether both tokens are present and non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

// Manual Debug to keep tokens out of logs
impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .finish()
    }
}

/// Persistent store for the credential pair.
///
/// Implementations must be atomic at the pair level: `save` replaces both
/// tokens together and `load` returns `None` rather than a partial pair.
pub trait TokenStore: Send + Sync {
    /// Load the stored pair, if a complete one exists.
    fn load(&self) -> Option<CredentialPair>;

    /// Replace the stored pair.
    fn save(&self, pair: CredentialPair);

    /// Remove any stored pair. Idempotent.
    fn clear(&self);
}

/// In-memory token store.
///
/// The reference store for tests and for clients that do not persist
/// credentials across restarts.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: Mutex<Option<CredentialPair>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<CredentialPair> {
        // A pair with an empty token is unusable; never hand it out
        self.inner
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .filter(CredentialPair::is_complete)
    }

    fn save(&self, pair: CredentialPair) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(pair);
        }
    }

    fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = None;
        }
    }
}
