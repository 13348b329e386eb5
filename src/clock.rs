// src/clock.rs
use std::sync::Mutex;

use chrono::{Duration, Utc};

use crate::model::Timestamp;

/// Source of "now". The daily reset boundary and `recorded_at` stamps read
/// time only through this trait.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually driven clock for replays and tests.
pub struct FixedClock {
    now: Mutex<Timestamp>,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: Timestamp) {
        *crate::store::lock_recover(&self.now) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = crate::store::lock_recover(&self.now);
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *crate::store::lock_recover(&self.now)
    }
}
