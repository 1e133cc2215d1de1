//! Core types shared across the Parley client stack.
//!
//! This crate holds the pieces that both the protocol driver and the auth
//! flows depend on: the client error type, credential storage, and the
//! environment abstraction that keeps session logic deterministic under
//! test.

mod env;
mod error;
mod tokens;

pub use env::{Environment, SystemEnv};
pub use error::ClientError;
pub use tokens::{CredentialPair, MemoryTokenStore, TokenStore};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
