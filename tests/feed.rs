// tests/feed.rs
mod common;

use std::thread;
use std::time::Duration;

use common::at;

use rankwatch::feed::LiveFeed;
use rankwatch::key;
use rankwatch::model::DeltaEvent;

fn ev(subject: &str, v: i64) -> DeltaEvent {
    DeltaEvent {
        key: key!(subject, "W", "G"),
        batch_time: at(12, 5),
        previous_batch_time: Some(at(12, 0)),
        delta_value: v,
        before: 0,
        after: v,
    }
}

#[test]
fn every_subscriber_gets_every_event_in_order() {
    let feed = LiveFeed::new();
    let a = feed.subscribe();
    let b = feed.subscribe();

    assert_eq!(feed.publish(&[ev("x", 1), ev("y", 2)]), 2);
    feed.publish(&[ev("z", 3)]);

    let names = |evs: Vec<DeltaEvent>| evs.into_iter().map(|e| e.key.subject).collect::<Vec<_>>();
    assert_eq!(names(a.drain()), vec!["x", "y", "z"]);
    assert_eq!(names(b.drain()), vec!["x", "y", "z"]);
    assert!(a.try_next().is_none());
}

#[test]
fn late_subscribers_miss_earlier_events() {
    let feed = LiveFeed::new();
    feed.publish(&[ev("early", 1)]);
    let sub = feed.subscribe();
    feed.publish(&[ev("late", 2)]);
    assert_eq!(sub.drain().len(), 1);
}

#[test]
fn dropped_subscribers_are_pruned() {
    let feed = LiveFeed::new();
    let keep = feed.subscribe();
    drop(feed.subscribe());
    assert_eq!(feed.subscriber_count(), 2);

    assert_eq!(feed.publish(&[ev("x", 1)]), 1);
    assert_eq!(feed.subscriber_count(), 1);
    assert_eq!(keep.drain().len(), 1);
}

#[test]
fn blocking_receive_across_threads() {
    let feed = std::sync::Arc::new(LiveFeed::new());
    let sub = feed.subscribe();
    let tx = feed.clone();
    let h = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        tx.publish(&[ev("x", 9)]);
    });
    let got = sub.next_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(got.delta_value, 9);
    h.join().unwrap();
    assert!(sub.next_timeout(Duration::from_millis(10)).is_none());
}
