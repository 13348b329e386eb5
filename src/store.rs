// src/store.rs
//
// SnapshotStore + DeltaLedger.
//
// - Tables: the whole mutable state (ranking snapshots and ledger, reset
//           marker, skip flag, VIP list/snapshots/ledger). Plain data with
//           the row-level operations the delta and reset rules build on.
// - Store:  one coarse Mutex around Tables and the persistence backend.
//           Every mutation is a transaction over a working copy that is
//           swapped in only after the backend accepted it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;

use crate::error::Result;
use crate::model::{DeltaRecord, Key, Snapshot, Timestamp, VipDelta, VipKey, VipSnapshot};
use crate::persist::{Backend, MemoryBackend};
use crate::source::StatusReport;

/// Lock a mutex, taking over the data if a previous holder panicked.
/// Committed tables are only replaced after a successful persist, so the
/// guarded value is always a consistent state.
pub(crate) fn lock_recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Which tables changed inside the current transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dirty {
    pub snapshots: bool,
    pub deltas: bool,
    pub marker: bool,
    pub vips: bool,
    pub vip_snapshots: bool,
    pub vip_deltas: bool,
}

impl Dirty {
    pub fn any(&self) -> bool {
        self.snapshots || self.deltas || self.marker || self.vips || self.vip_snapshots || self.vip_deltas
    }
}

/// Outcome of a ledger write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Written {
    Inserted,
    /// A row for the same `(key, batch_time)` existed and was overwritten.
    Corrected,
}

/// Flat image of persisted state, as produced by `Backend::load`.
#[derive(Clone, Debug, Default)]
pub struct Loaded {
    pub snapshots: Vec<Snapshot>,
    pub deltas: Vec<DeltaRecord>,
    pub reset_marker: Option<NaiveDate>,
    pub vips: Vec<VipKey>,
    pub vip_snapshots: Vec<VipSnapshot>,
    pub vip_deltas: Vec<VipDelta>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotFilter {
    pub world: Option<String>,
    pub guild: Option<String>,
}

impl SnapshotFilter {
    pub fn world(world: impl Into<String>) -> Self {
        Self { world: Some(world.into()), guild: None }
    }

    fn matches(&self, key: &Key) -> bool {
        self.world.as_deref().is_none_or(|w| w == key.world)
            && self.guild.as_deref().is_none_or(|g| g == key.guild)
    }
}

/// Ledger range query; `from` and `to` are inclusive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeltaQuery {
    pub world: Option<String>,
    pub guild: Option<String>,
    pub subject: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
}

impl DeltaQuery {
    pub fn subject(subject: impl Into<String>) -> Self {
        Self { subject: Some(subject.into()), ..Self::default() }
    }

    fn matches_time(&self, t: Timestamp) -> bool {
        self.from.is_none_or(|f| t >= f) && self.to.is_none_or(|e| t <= e)
    }

    fn matches(&self, key: &Key, t: Timestamp) -> bool {
        self.world.as_deref().is_none_or(|w| w == key.world)
            && self.guild.as_deref().is_none_or(|g| g == key.guild)
            && self.subject.as_deref().is_none_or(|s| s == key.subject)
            && self.matches_time(t)
    }

    fn matches_vip(&self, key: &VipKey, t: Timestamp) -> bool {
        self.world.as_deref().is_none_or(|w| w == key.world)
            && self.subject.as_deref().is_none_or(|s| s == key.subject)
            && self.matches_time(t)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Tables {
    snapshots: BTreeMap<Key, Snapshot>,
    deltas: BTreeMap<(Key, Timestamp), DeltaRecord>,
    reset_marker: Option<NaiveDate>,
    skip_next: bool,
    vips: BTreeSet<VipKey>,
    vip_snapshots: BTreeMap<VipKey, VipSnapshot>,
    vip_deltas: BTreeMap<(VipKey, Timestamp), VipDelta>,
    dirty: Dirty,
}

impl Tables {
    /// Build tables from a persisted image. Ledger rows sharing a
    /// `(key, batch_time)` collapse to the last one; returns how many were
    /// dropped that way.
    pub fn from_loaded(loaded: Loaded) -> (Self, usize) {
        let mut t = Tables { reset_marker: loaded.reset_marker, ..Tables::default() };
        let mut dropped = 0;

        for snap in loaded.snapshots {
            t.snapshots.insert(snap.key.clone(), snap);
        }
        for rec in loaded.deltas {
            if t.deltas.insert((rec.key.clone(), rec.batch_time), rec).is_some() {
                dropped += 1;
            }
        }
        t.vips.extend(loaded.vips);
        for snap in loaded.vip_snapshots {
            t.vip_snapshots.insert(snap.key.clone(), snap);
        }
        for rec in loaded.vip_deltas {
            if t.vip_deltas.insert((rec.key.clone(), rec.batch_time), rec).is_some() {
                dropped += 1;
            }
        }
        (t, dropped)
    }

    pub fn dirty(&self) -> Dirty { self.dirty }

    /* ---------------- Snapshots ---------------- */

    pub fn get_snapshot(&self, key: &Key) -> Option<&Snapshot> {
        self.snapshots.get(key)
    }

    pub fn upsert_snapshot(&mut self, key: Key, cumulative: i64, source_timestamp: Timestamp, observed_at: Timestamp) {
        self.dirty.snapshots = true;
        match self.snapshots.get_mut(&key) {
            Some(snap) => {
                snap.cumulative_value = cumulative;
                snap.last_source_timestamp = source_timestamp;
                snap.last_observed_at = observed_at;
            }
            None => {
                self.snapshots.insert(key.clone(), Snapshot {
                    key,
                    cumulative_value: cumulative,
                    last_source_timestamp: source_timestamp,
                    last_observed_at: observed_at,
                });
            }
        }
    }

    /// Zero every cumulative value; timestamps and the ledger are kept.
    pub fn zero_snapshots(&mut self) -> usize {
        for snap in self.snapshots.values_mut() {
            snap.cumulative_value = 0;
        }
        if !self.snapshots.is_empty() {
            self.dirty.snapshots = true;
        }
        self.snapshots.len()
    }

    pub fn snapshot_rows(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.values()
    }

    /* ---------------- Ledger ---------------- */

    pub fn get_delta(&self, key: &Key, batch_time: Timestamp) -> Option<&DeltaRecord> {
        self.deltas.get(&(key.clone(), batch_time))
    }

    /// Insert a ledger row, or overwrite delta/before/after of the row that
    /// already exists for `(key, batch_time)`. Last observation wins.
    pub fn append_or_correct_delta(
        &mut self,
        key: Key,
        batch_time: Timestamp,
        delta: i64,
        before: i64,
        after: i64,
        recorded_at: Timestamp,
    ) -> Written {
        self.dirty.deltas = true;
        match self.deltas.get_mut(&(key.clone(), batch_time)) {
            Some(rec) => {
                rec.delta_value = delta;
                rec.before = before;
                rec.after = after;
                rec.recorded_at = recorded_at;
                Written::Corrected
            }
            None => {
                self.deltas.insert((key.clone(), batch_time), DeltaRecord {
                    key,
                    batch_time,
                    delta_value: delta,
                    before,
                    after,
                    recorded_at,
                });
                Written::Inserted
            }
        }
    }

    pub fn delta_rows(&self) -> impl Iterator<Item = &DeltaRecord> {
        self.deltas.values()
    }

    /* ---------------- Reset marker / skip flag ---------------- */

    pub fn reset_marker(&self) -> Option<NaiveDate> { self.reset_marker }

    pub fn set_reset_marker(&mut self, date: NaiveDate) {
        self.reset_marker = Some(date);
        self.dirty.marker = true;
    }

    pub fn skip_pending(&self) -> bool { self.skip_next }

    pub fn set_skip(&mut self) { self.skip_next = true; }

    /// Clear the skip flag, returning whether it was set.
    pub fn take_skip(&mut self) -> bool {
        std::mem::take(&mut self.skip_next)
    }

    /* ---------------- VIPs ---------------- */

    pub fn is_vip(&self, key: &VipKey) -> bool { self.vips.contains(key) }

    pub fn add_vip(&mut self, key: VipKey) -> bool {
        let added = self.vips.insert(key);
        self.dirty.vips |= added;
        added
    }

    pub fn remove_vip(&mut self, key: &VipKey) -> bool {
        let removed = self.vips.remove(key);
        self.dirty.vips |= removed;
        removed
    }

    pub fn vip_list(&self) -> impl Iterator<Item = &VipKey> {
        self.vips.iter()
    }

    pub fn get_vip_snapshot(&self, key: &VipKey) -> Option<&VipSnapshot> {
        self.vip_snapshots.get(key)
    }

    pub fn upsert_vip_snapshot(&mut self, snap: VipSnapshot) {
        self.dirty.vip_snapshots = true;
        self.vip_snapshots.insert(snap.key.clone(), snap);
    }

    /// Zero VIP counters and flag each one for a fresh baseline.
    pub fn zero_vip_snapshots(&mut self) -> usize {
        for snap in self.vip_snapshots.values_mut() {
            snap.cumulative_value = 0;
            snap.online_minutes = 0;
            snap.rebaseline = true;
        }
        if !self.vip_snapshots.is_empty() {
            self.dirty.vip_snapshots = true;
        }
        self.vip_snapshots.len()
    }

    pub fn vip_snapshot_rows(&self) -> impl Iterator<Item = &VipSnapshot> {
        self.vip_snapshots.values()
    }

    pub fn get_vip_delta(&self, key: &VipKey, batch_time: Timestamp) -> Option<&VipDelta> {
        self.vip_deltas.get(&(key.clone(), batch_time))
    }

    pub fn append_or_correct_vip_delta(&mut self, rec: VipDelta) -> Written {
        self.dirty.vip_deltas = true;
        match self.vip_deltas.insert((rec.key.clone(), rec.batch_time), rec) {
            Some(_) => Written::Corrected,
            None => Written::Inserted,
        }
    }

    pub fn vip_delta_rows(&self) -> impl Iterator<Item = &VipDelta> {
        self.vip_deltas.values()
    }

    /* ---------------- Read API ---------------- */

    /// Leaderboard order: highest value first, then by key.
    pub fn snapshots(&self, filter: &SnapshotFilter) -> Vec<Snapshot> {
        let mut out: Vec<Snapshot> = self.snapshots.values()
            .filter(|s| filter.matches(&s.key))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.cumulative_value.cmp(&a.cumulative_value).then_with(|| a.key.cmp(&b.key)));
        out
    }

    /// Ledger rows in `(batch_time, key)` order.
    pub fn deltas(&self, query: &DeltaQuery) -> Vec<DeltaRecord> {
        let mut out: Vec<DeltaRecord> = self.deltas.values()
            .filter(|d| query.matches(&d.key, d.batch_time))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.batch_time.cmp(&b.batch_time).then_with(|| a.key.cmp(&b.key)));
        out
    }

    pub fn vip_deltas(&self, query: &DeltaQuery) -> Vec<VipDelta> {
        let mut out: Vec<VipDelta> = self.vip_deltas.values()
            .filter(|d| query.matches_vip(&d.key, d.batch_time))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.batch_time.cmp(&b.batch_time).then_with(|| a.key.cmp(&b.key)));
        out
    }

    /// Newest source timestamp recorded for any key of `world`.
    pub fn latest_batch_time(&self, world: &str) -> Option<Timestamp> {
        self.snapshots.values()
            .filter(|s| s.key.world == world)
            .map(|s| s.last_source_timestamp)
            .max()
    }
}

struct Inner {
    tables: Tables,
    backend: Box<dyn Backend>,
}

pub struct Store {
    inner: Mutex<Inner>,
}

impl Store {
    /// Load persisted state through `backend` and take ownership of it.
    pub fn open(mut backend: impl Backend + 'static) -> Result<Self> {
        let loaded = backend.load()?;
        let (tables, dropped) = Tables::from_loaded(loaded);
        if dropped > 0 {
            logw!("Found and removed {dropped} duplicate ledger rows on load");
        }
        logf!(
            "Store opened: {} snapshots, {} deltas, {} VIPs",
            tables.snapshots.len(), tables.deltas.len(), tables.vips.len()
        );
        Ok(Self { inner: Mutex::new(Inner { tables, backend: Box::new(backend) }) })
    }

    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner { tables: Tables::default(), backend: Box::new(MemoryBackend::default()) }),
        }
    }

    /// Run `f` against a working copy of the tables under the store lock.
    /// If `f` fails or the backend rejects the result, the committed tables
    /// are left untouched.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut inner = lock_recover(&self.inner);
        let mut work = inner.tables.clone();
        work.dirty = Dirty::default();

        let out = f(&mut work)?;

        if work.dirty.any() {
            inner.backend.persist(&work)?;
        }
        work.dirty = Dirty::default();
        inner.tables = work;
        Ok(out)
    }

    /// Consistent read of the committed tables.
    pub fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let inner = lock_recover(&self.inner);
        f(&inner.tables)
    }

    pub fn data_dir(&self) -> Option<PathBuf> {
        lock_recover(&self.inner).backend.data_dir().map(|p| p.to_path_buf())
    }

    pub fn save_status(&self, report: &StatusReport) -> Result<()> {
        lock_recover(&self.inner).backend.save_status(report)
    }

    /* ---------------- Read API ---------------- */

    pub fn get_snapshot(&self, key: &Key) -> Option<Snapshot> {
        self.read(|t| t.get_snapshot(key).cloned())
    }

    pub fn snapshots(&self, filter: &SnapshotFilter) -> Vec<Snapshot> {
        self.read(|t| t.snapshots(filter))
    }

    pub fn deltas(&self, query: &DeltaQuery) -> Vec<DeltaRecord> {
        self.read(|t| t.deltas(query))
    }

    pub fn latest_batch_time(&self, world: &str) -> Option<Timestamp> {
        self.read(|t| t.latest_batch_time(world))
    }

    pub fn last_reset(&self) -> Option<NaiveDate> {
        self.read(|t| t.reset_marker())
    }

    pub fn skip_pending(&self) -> bool {
        self.read(|t| t.skip_pending())
    }

    pub fn vips(&self) -> Vec<VipKey> {
        self.read(|t| t.vip_list().cloned().collect())
    }

    pub fn vip_snapshots(&self) -> Vec<VipSnapshot> {
        self.read(|t| t.vip_snapshot_rows().cloned().collect())
    }

    pub fn vip_deltas(&self, query: &DeltaQuery) -> Vec<VipDelta> {
        self.read(|t| t.vip_deltas(query))
    }

    pub fn add_vip(&self, key: VipKey) -> Result<bool> {
        let label = key.to_string();
        let added = self.transaction(|t| Ok(t.add_vip(key)))?;
        if added {
            logf!("Added VIP: {label}");
        }
        Ok(added)
    }

    pub fn remove_vip(&self, key: &VipKey) -> Result<bool> {
        let removed = self.transaction(|t| Ok(t.remove_vip(key)))?;
        if removed {
            logf!("Removed VIP: {key}");
        }
        Ok(removed)
    }
}
