// src/export.rs
//
// CSV export of store contents, in the same row layout the CSV backend
// persists, plus per-key totals over a ledger range.

use std::collections::BTreeMap;
use std::path::Path;

use crate::csv::{rows_to_string, SEP};
use crate::error::Result;
use crate::file::write_atomic;
use crate::model::{DeltaRecord, Key, Snapshot, VipDelta};
use crate::persist::{
    delta_row, snapshot_row, vip_delta_row, DELTA_HEADERS, SNAPSHOT_HEADERS, VIP_DELTA_HEADERS,
};
use crate::store::{DeltaQuery, SnapshotFilter, Store};

pub fn snapshots_csv(snaps: &[Snapshot]) -> String {
    let rows: Vec<_> = snaps.iter().map(snapshot_row).collect();
    rows_to_string(SNAPSHOT_HEADERS, &rows, SEP)
}

pub fn deltas_csv(deltas: &[DeltaRecord]) -> String {
    let rows: Vec<_> = deltas.iter().map(delta_row).collect();
    rows_to_string(DELTA_HEADERS, &rows, SEP)
}

pub fn vip_deltas_csv(deltas: &[VipDelta]) -> String {
    let rows: Vec<_> = deltas.iter().map(vip_delta_row).collect();
    rows_to_string(VIP_DELTA_HEADERS, &rows, SEP)
}

/// Write the filtered leaderboard to `path`. Returns the row count.
pub fn write_snapshots(store: &Store, filter: &SnapshotFilter, path: &Path) -> Result<usize> {
    let snaps = store.snapshots(filter);
    write_atomic(path, snapshots_csv(&snaps).as_bytes())?;
    logf!("Exported {} snapshots to {}", snaps.len(), path.display());
    Ok(snaps.len())
}

pub fn write_deltas(store: &Store, query: &DeltaQuery, path: &Path) -> Result<usize> {
    let deltas = store.deltas(query);
    write_atomic(path, deltas_csv(&deltas).as_bytes())?;
    logf!("Exported {} deltas to {}", deltas.len(), path.display());
    Ok(deltas.len())
}

pub fn write_vip_deltas(store: &Store, query: &DeltaQuery, path: &Path) -> Result<usize> {
    let deltas = store.vip_deltas(query);
    write_atomic(path, vip_deltas_csv(&deltas).as_bytes())?;
    logf!("Exported {} VIP deltas to {}", deltas.len(), path.display());
    Ok(deltas.len())
}

/// Sum of `delta_value` per key, highest first.
pub fn totals(deltas: &[DeltaRecord]) -> Vec<(Key, i64)> {
    let mut sums: BTreeMap<&Key, i64> = BTreeMap::new();
    for d in deltas {
        *sums.entry(&d.key).or_default() += d.delta_value;
    }
    let mut out: Vec<(Key, i64)> = sums.into_iter().map(|(k, v)| (k.clone(), v)).collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}
