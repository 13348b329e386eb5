// src/delta.rs
//
// DeltaComputer: turns one world batch of cumulative values into ledger rows.
// Runs inside a store transaction; the caller publishes `events` after commit.

use crate::model::{Batch, DeltaEvent, Key, Timestamp};
use crate::store::{Tables, Written};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// New ledger rows.
    pub recorded: usize,
    /// Existing `(key, batch_time)` rows overwritten.
    pub corrected: usize,
    /// Ledger writes skipped because the batch followed a daily reset.
    pub suppressed: usize,
    pub unchanged: usize,
    /// Keys seen for the first time (snapshot created, no ledger row).
    pub new_keys: usize,
    /// Rows older than what the store already holds for that key.
    pub stale: usize,
    pub events: Vec<DeltaEvent>,
}

impl BatchOutcome {
    pub fn written(&self) -> usize {
        self.recorded + self.corrected
    }
}

/// Apply `batch` to the tables. `now` stamps `last_observed_at` and
/// `recorded_at`. Clears the skip flag when done, whatever happened.
pub fn apply_batch(tables: &mut Tables, batch: &Batch, now: Timestamp) -> BatchOutcome {
    let mut out = BatchOutcome::default();
    let skip = tables.skip_pending();
    let t = batch.batch_time;

    for row in &batch.rows {
        let key = Key::new(row.subject.as_str(), batch.world.as_str(), row.guild.as_str());

        let Some(snap) = tables.get_snapshot(&key) else {
            tables.upsert_snapshot(key, row.cumulative, t, now);
            out.new_keys += 1;
            continue;
        };

        if t < snap.last_source_timestamp {
            logd!("Stale row for {key}: {t} older than {}", snap.last_source_timestamp);
            out.stale += 1;
            continue;
        }

        // Same batch seen again: measure against the value before it.
        let existing = (snap.last_source_timestamp == t)
            .then(|| tables.get_delta(&key, t))
            .flatten();
        let previous = existing.map_or(snap.cumulative_value, |rec| rec.before);
        let previous_batch_time = (snap.last_source_timestamp < t).then_some(snap.last_source_timestamp);
        let had_record = existing.is_some();

        let delta = row.cumulative - previous;

        if delta == 0 && !had_record {
            tables.upsert_snapshot(key, row.cumulative, t, now);
            out.unchanged += 1;
            continue;
        }

        if skip {
            logf!("Suppressed post-reset delta for {key}: {delta:+}");
            tables.upsert_snapshot(key, row.cumulative, t, now);
            out.suppressed += 1;
            continue;
        }

        match tables.append_or_correct_delta(key.clone(), t, delta, previous, row.cumulative, now) {
            Written::Inserted => out.recorded += 1,
            Written::Corrected => out.corrected += 1,
        }
        tables.upsert_snapshot(key.clone(), row.cumulative, t, now);

        out.events.push(DeltaEvent {
            key,
            batch_time: t,
            previous_batch_time,
            delta_value: delta,
            before: previous,
            after: row.cumulative,
        });
    }

    if tables.take_skip() {
        logf!("Skip flag consumed by batch {} @ {t}", batch.world);
    }

    logd!(
        "Batch {} @ {t}: {} recorded, {} corrected, {} suppressed, {} unchanged, {} new, {} stale",
        batch.world, out.recorded, out.corrected, out.suppressed, out.unchanged, out.new_keys, out.stale
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BatchRow;
    use chrono::{TimeZone, Utc};

    fn t(m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, m, 0).unwrap()
    }

    fn batch(at: u32, rows: &[(&str, i64)]) -> Batch {
        Batch::new("W", t(at), rows.iter().map(|(s, v)| BatchRow::new(*s, "G", *v)).collect())
    }

    #[test]
    fn corrected_value_keeps_chain_consistent() {
        let mut tables = Tables::default();
        apply_batch(&mut tables, &batch(0, &[("A", 100)]), t(0));
        apply_batch(&mut tables, &batch(5, &[("A", 150)]), t(5));
        // Source re-publishes the same batch_time with a higher value.
        let out = apply_batch(&mut tables, &batch(5, &[("A", 170)]), t(6));
        assert_eq!(out.corrected, 1);

        let rec = tables.get_delta(&key!("A", "W", "G"), t(5)).unwrap();
        assert_eq!((rec.before, rec.after, rec.delta_value), (100, 170, 70));
        assert_eq!(out.events[0].previous_batch_time, None);
    }

    #[test]
    fn stale_rows_do_not_touch_state() {
        let mut tables = Tables::default();
        apply_batch(&mut tables, &batch(5, &[("A", 100)]), t(5));
        let out = apply_batch(&mut tables, &batch(0, &[("A", 40)]), t(6));
        assert_eq!(out.stale, 1);
        assert_eq!(tables.get_snapshot(&key!("A", "W", "G")).unwrap().cumulative_value, 100);
    }

    #[test]
    fn negative_delta_is_recorded() {
        let mut tables = Tables::default();
        apply_batch(&mut tables, &batch(0, &[("A", 100)]), t(0));
        let out = apply_batch(&mut tables, &batch(5, &[("A", 80)]), t(5));
        assert_eq!(out.recorded, 1);
        assert_eq!(out.events[0].delta_value, -20);
        assert_eq!(out.events[0].previous_batch_time, Some(t(0)));
    }
}
