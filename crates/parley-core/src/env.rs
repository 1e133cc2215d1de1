//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from the system clock. Production code uses
//! [`SystemEnv`]; tests use a mock with a controllable clock so message
//! timestamps are reproducible.

use std::time::{SystemTime, UNIX_EPOCH};

/// Abstract environment providing wall-clock time.
///
/// Session logic stamps locally-originated chat messages with the current
/// time. Routing that through this trait keeps the logic a pure function of
/// its inputs.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current wall-clock time as Unix milliseconds.
    ///
    /// # Invariants
    ///
    /// - Values never decrease within a single execution context.
    fn unix_millis(&self) -> u64;
}

/// Production environment backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn unix_millis(&self) -> u64 {
        // Pre-epoch clocks read as zero rather than panicking
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}
