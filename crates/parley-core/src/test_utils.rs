//! Deterministic test doubles.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::Environment;

/// Environment with a manually-controlled clock.
///
/// Clones share the same clock, so advancing time on one handle is visible
/// to logic holding another.
#[derive(Debug, Clone, Default)]
pub struct MockEnv {
    millis: Arc<AtomicU64>,
}

impl MockEnv {
    /// Create a mock environment starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock environment at the given Unix-millisecond time.
    #[must_use]
    pub fn at(millis: u64) -> Self {
        Self { millis: Arc::new(AtomicU64::new(millis)) }
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Environment for MockEnv {
    fn unix_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
