// tests/reset.rs
mod common;

use chrono::NaiveDate;
use common::{batch, day};

use rankwatch::delta::apply_batch;
use rankwatch::key;
use rankwatch::reset::DailyReset;
use rankwatch::store::Tables;

// Reset at 10:02 local, UTC-3 => 13:02 UTC.
fn reset() -> DailyReset {
    DailyReset::new(10, 2, -3).unwrap()
}

fn seeded() -> Tables {
    let mut t = Tables::default();
    apply_batch(&mut t, &batch("W", day(1, 12, 0), &[("K", 500)]), day(1, 12, 0));
    apply_batch(&mut t, &batch("W", day(1, 12, 30), &[("K", 620)]), day(1, 12, 30));
    t
}

#[test]
fn reset_then_batch_is_suppressed() {
    let mut t = seeded();
    let now = day(1, 13, 5);

    assert!(reset().check_and_reset(&mut t, now));
    assert_eq!(t.get_snapshot(&key!("K", "W", "G")).unwrap().cumulative_value, 0);
    assert_eq!(t.reset_marker(), NaiveDate::from_ymd_opt(2025, 3, 1));
    assert!(t.skip_pending());

    let out = apply_batch(&mut t, &batch("W", day(1, 13, 5), &[("K", 45)]), now);
    assert_eq!(out.suppressed, 1);
    assert!(out.events.is_empty());
    assert!(t.get_delta(&key!("K", "W", "G"), day(1, 13, 5)).is_none());
    assert_eq!(t.get_snapshot(&key!("K", "W", "G")).unwrap().cumulative_value, 45);
    assert!(!t.skip_pending());

    // Ledger history survives the reset.
    assert_eq!(t.delta_rows().count(), 1);
}

#[test]
fn next_batch_after_suppression_records_normally() {
    let mut t = seeded();
    reset().check_and_reset(&mut t, day(1, 13, 5));
    apply_batch(&mut t, &batch("W", day(1, 13, 5), &[("K", 45)]), day(1, 13, 5));
    let out = apply_batch(&mut t, &batch("W", day(1, 13, 10), &[("K", 80)]), day(1, 13, 10));
    assert_eq!(out.recorded, 1);
    assert_eq!(out.events[0].delta_value, 35);
}

#[test]
fn fires_at_most_once_per_local_day() {
    let mut t = seeded();
    let r = reset();
    assert!(!r.check_and_reset(&mut t, day(1, 13, 1)), "before the boundary");
    assert!(r.check_and_reset(&mut t, day(1, 13, 2)));
    assert!(!r.check_and_reset(&mut t, day(1, 20, 0)));
    // 02:00 UTC on the 2nd is still the 1st locally.
    assert!(!r.check_and_reset(&mut t, day(2, 2, 0)));
    assert!(!r.check_and_reset(&mut t, day(2, 13, 0)));
    assert!(r.check_and_reset(&mut t, day(2, 13, 2)));
    assert_eq!(t.reset_marker(), NaiveDate::from_ymd_opt(2025, 3, 2));
}

#[test]
fn skip_flag_is_consumed_by_unrelated_batch() {
    let mut t = seeded();
    reset().check_and_reset(&mut t, day(1, 13, 5));

    let out = apply_batch(&mut t, &batch("Other", day(1, 13, 5), &[("Z", 10)]), day(1, 13, 5));
    assert_eq!(out.new_keys, 1);
    assert!(!t.skip_pending());

    // The flag is gone, so K's first post-reset value now counts in full.
    let out = apply_batch(&mut t, &batch("W", day(1, 13, 6), &[("K", 45)]), day(1, 13, 6));
    assert_eq!(out.recorded, 1);
    assert_eq!(out.events[0].before, 0);
}

#[test]
fn zero_after_reset_is_unchanged_not_suppressed() {
    let mut t = seeded();
    reset().check_and_reset(&mut t, day(1, 13, 5));
    let out = apply_batch(&mut t, &batch("W", day(1, 13, 5), &[("K", 0)]), day(1, 13, 5));
    assert_eq!((out.unchanged, out.suppressed), (1, 0));
    assert!(!t.skip_pending());
}

#[test]
fn due_reports_boundary() {
    let r = reset();
    assert!(!r.is_due(day(1, 13, 1), None));
    assert!(r.is_due(day(1, 13, 2), None));
    assert!(!r.is_due(day(1, 13, 2), NaiveDate::from_ymd_opt(2025, 3, 1)));
    assert!(r.is_due(day(1, 13, 2), NaiveDate::from_ymd_opt(2025, 2, 28)));
}
