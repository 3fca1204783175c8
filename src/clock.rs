//! Clock abstraction (spec §9: "ad-hoc time arithmetic ... must be centralized
//! behind a clock abstraction the tests can drive"). The scanner, reminder
//! scheduler and SOS coordinator all take `Arc<dyn Clock>` instead of calling
//! `Utc::now()` directly.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test double that only advances when told to. Used by scenario tests to
/// pin `now` so scanner/reminder/SOS ticks are deterministic (spec §8's
/// round-trip laws depend on a frozen clock).
pub struct FrozenClock {
    current: Mutex<DateTime<Utc>>,
}

impl FrozenClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(start),
        })
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.current.lock().unwrap();
        *guard += delta;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.current.lock().unwrap() = to;
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap()
    }
}
