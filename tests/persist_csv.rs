// tests/persist_csv.rs
mod common;

use std::collections::BTreeMap;
use std::fs;

use chrono::NaiveDate;
use common::{batch, day, tmp_dir};

use rankwatch::delta::apply_batch;
use rankwatch::model::{PlayerObservation, VipKey};
use rankwatch::persist::{CsvBackend, DELTAS_FILE, MARKER_FILE, SNAPSHOTS_FILE, STATUS_FILE};
use rankwatch::reset::DailyReset;
use rankwatch::source::{Routine, StatusReport};
use rankwatch::store::{DeltaQuery, SnapshotFilter, Store};
use rankwatch::vip::observe;
use rankwatch::{key, vip_key};

#[test]
fn state_survives_restart() {
    let dir = tmp_dir("restart");
    {
        let store = Store::open(CsvBackend::new(&dir).unwrap()).unwrap();
        let b1 = batch("W", day(1, 12, 0), &[("Foo, the \"Bold\"", 500), ("K", 10)]);
        let b2 = batch("W", day(1, 12, 5), &[("Foo, the \"Bold\"", 620), ("K", 15)]);
        store.transaction(|t| Ok(apply_batch(t, &b1, day(1, 12, 0)))).unwrap();
        store.transaction(|t| Ok(apply_batch(t, &b2, day(1, 12, 5)))).unwrap();
        store.add_vip(vip_key!("V", "W")).unwrap();
        store.transaction(|t| {
            let obs = [PlayerObservation { subject: "V".into(), exp_today: 42, online_minutes: 7 }];
            Ok(observe(t, "W", day(1, 12, 5), &obs, day(1, 12, 5)))
        }).unwrap();
    }

    assert!(dir.join(SNAPSHOTS_FILE).exists());
    assert!(dir.join(DELTAS_FILE).exists());

    let store = Store::open(CsvBackend::new(&dir).unwrap()).unwrap();
    let snap = store.get_snapshot(&key!("Foo, the \"Bold\"", "W", "G")).unwrap();
    assert_eq!((snap.cumulative_value, snap.last_source_timestamp), (620, day(1, 12, 5)));
    assert_eq!(store.deltas(&DeltaQuery::default()).len(), 2);
    assert_eq!(store.latest_batch_time("W"), Some(day(1, 12, 5)));
    assert_eq!(store.vips(), vec![VipKey::new("V", "W")]);
    assert_eq!(store.vip_snapshots()[0].online_minutes, 7);
    assert_eq!(store.snapshots(&SnapshotFilter::default()).len(), 2);
}

#[test]
fn reset_marker_persists_so_reset_does_not_refire() {
    let dir = tmp_dir("marker");
    let reset = DailyReset::new(10, 2, -3).unwrap();
    {
        let store = Store::open(CsvBackend::new(&dir).unwrap()).unwrap();
        let fired = store.transaction(|t| Ok(reset.check_and_reset(t, day(1, 13, 5)))).unwrap();
        assert!(fired);
    }
    assert_eq!(fs::read_to_string(dir.join(MARKER_FILE)).unwrap().trim(), "2025-03-01");

    let store = Store::open(CsvBackend::new(&dir).unwrap()).unwrap();
    assert_eq!(store.last_reset(), NaiveDate::from_ymd_opt(2025, 3, 1));
    // The skip flag is transient.
    assert!(!store.skip_pending());
    let fired = store.transaction(|t| Ok(reset.check_and_reset(t, day(1, 18, 0)))).unwrap();
    assert!(!fired);
}

#[test]
fn legacy_duplicates_and_bad_lines_on_load() {
    let dir = tmp_dir("legacy");
    fs::write(
        dir.join(DELTAS_FILE),
        "subject,world,guild,batch_time,delta_value,before,after,recorded_at\n\
         K,W,G,2025-03-01T12:05:00Z,10,0,10,2025-03-01T12:05:00Z\n\
         K,W,G,2025-03-01T12:05:00Z,12,0,12,2025-03-01T12:06:00Z\n\
         K,W,G,not-a-time,1,0,1,2025-03-01T12:06:00Z\n\
         K,W,G,2025-03-01T12:10:00Z,3,12,15,2025-03-01T12:10:00Z\n",
    )
    .unwrap();

    let store = Store::open(CsvBackend::new(&dir).unwrap()).unwrap();
    let rows = store.deltas(&DeltaQuery::default());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].delta_value, 12);
}

#[test]
fn wrong_header_is_an_error() {
    let dir = tmp_dir("header");
    fs::write(dir.join(SNAPSHOTS_FILE), "name,exp\nK,1\n").unwrap();
    assert!(Store::open(CsvBackend::new(&dir).unwrap()).is_err());
}

#[test]
fn status_report_is_saved_as_json() {
    let dir = tmp_dir("status");
    let store = Store::open(CsvBackend::new(&dir).unwrap()).unwrap();
    let worlds = BTreeMap::from([(String::from("W"), BTreeMap::from([(Routine::Ranking, day(1, 12, 0))]))]);
    store.save_status(&StatusReport::new(day(1, 12, 1), &worlds)).unwrap();

    let text = fs::read_to_string(dir.join(STATUS_FILE)).unwrap();
    let back: StatusReport = serde_json::from_str(&text).unwrap();
    assert_eq!(back.worlds, worlds);
    assert_eq!(store.data_dir(), Some(dir));
}

#[test]
fn failed_table_write_leaves_previous_commit_on_disk() {
    let dir = tmp_dir("partial");
    let key = key!("K", "W", "G");
    {
        let store = Store::open(CsvBackend::new(&dir).unwrap()).unwrap();
        let b1 = batch("W", day(1, 12, 0), &[("K", 500)]);
        store.transaction(|t| Ok(apply_batch(t, &b1, day(1, 12, 0)))).unwrap();

        // A directory squatting on the temp name makes the snapshot write fail.
        fs::create_dir(dir.join(format!("{SNAPSHOTS_FILE}.tmp"))).unwrap();
        let b2 = batch("W", day(1, 12, 5), &[("K", 620)]);
        assert!(store.transaction(|t| Ok(apply_batch(t, &b2, day(1, 12, 5)))).is_err());
        assert!(store.deltas(&DeltaQuery::default()).is_empty());
    }
    assert!(!dir.join(DELTAS_FILE).exists());
    assert!(!dir.join(format!("{DELTAS_FILE}.tmp")).exists());
    fs::remove_dir(dir.join(format!("{SNAPSHOTS_FILE}.tmp"))).unwrap();

    let store = Store::open(CsvBackend::new(&dir).unwrap()).unwrap();
    assert!(store.deltas(&DeltaQuery::default()).is_empty());
    let snap = store.get_snapshot(&key).unwrap();
    assert_eq!((snap.cumulative_value, snap.last_source_timestamp), (500, day(1, 12, 0)));

    // The next batch measures from the value that is actually on disk.
    let b3 = batch("W", day(1, 12, 10), &[("K", 700)]);
    store.transaction(|t| Ok(apply_batch(t, &b3, day(1, 12, 10)))).unwrap();
    let sum: i64 = store.deltas(&DeltaQuery::default()).iter().map(|d| d.delta_value).sum();
    assert_eq!(500 + sum, store.get_snapshot(&key).unwrap().cumulative_value);
}
