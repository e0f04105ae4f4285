//! Time source injection
//!
//! All time-dependent rules (claim expiry, voting windows) compare stored
//! timestamps against a `Clock`. Production code uses `SystemClock`; tests
//! and the simulator drive a `ManualClock`.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unix timestamp in whole seconds
pub type Timestamp = u64;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by `chrono::Utc`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // Pre-epoch system time clamps to zero
        Utc::now().timestamp().max(0) as Timestamp
    }
}

/// Manually driven clock for deterministic tests and replay
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.now.store(at, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) -> Timestamp {
        self.now.fetch_add(seconds, Ordering::SeqCst) + seconds
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
