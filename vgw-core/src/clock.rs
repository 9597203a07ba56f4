#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Injectable monotonic clock.
//!
//! Every freshness decision in the daemon (peer expiry, forwarder expiry)
//! reads this capability instead of the wall clock, so host clock jumps can
//! never produce spurious expiries and tests can drive virtual time.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

/// Monotonic time source.
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic instant.
    fn now(&self) -> Instant;
}

/// Production clock.
///
/// Reads time through the tokio timer so tests running under
/// `tokio::time::pause` observe the same virtual time that drives the
/// daemon's tick interval. Outside a paused runtime this is the plain
/// monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Hand-driven clock for unit tests.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + *offset
    }
}
