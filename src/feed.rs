// src/feed.rs
//
// LiveFeedBroadcaster: fan-out of freshly written ledger rows.
// One unbounded mpsc channel per subscriber; nothing is buffered for
// subscribers that join later.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

use crate::model::DeltaEvent;
use crate::store::lock_recover;

#[derive(Default)]
pub struct LiveFeed {
    subscribers: Mutex<Vec<Sender<DeltaEvent>>>,
}

impl LiveFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        lock_recover(&self.subscribers).push(tx);
        Subscription { rx }
    }

    /// Deliver `events` in order to every live subscriber. Subscribers whose
    /// receiving end is gone are dropped. Returns how many were reached.
    pub fn publish(&self, events: &[DeltaEvent]) -> usize {
        if events.is_empty() {
            return self.subscriber_count();
        }
        let mut subs = lock_recover(&self.subscribers);
        subs.retain(|tx| events.iter().all(|ev| tx.send(ev.clone()).is_ok()));
        subs.len()
    }

    pub fn subscriber_count(&self) -> usize {
        lock_recover(&self.subscribers).len()
    }
}

pub struct Subscription {
    rx: Receiver<DeltaEvent>,
}

impl Subscription {
    pub fn try_next(&self) -> Option<DeltaEvent> {
        self.rx.try_recv().ok()
    }

    /// Block up to `timeout`. `None` on timeout or when the feed is gone.
    pub fn next_timeout(&self, timeout: Duration) -> Option<DeltaEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything queued right now.
    pub fn drain(&self) -> Vec<DeltaEvent> {
        self.rx.try_iter().collect()
    }
}

/// Blocking iteration; ends when the feed is dropped.
impl Iterator for Subscription {
    type Item = DeltaEvent;

    fn next(&mut self) -> Option<DeltaEvent> {
        self.rx.recv().ok()
    }
}
