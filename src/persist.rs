// src/persist.rs
//
// Persistence backends for the store tables.
// The store never touches files itself; it hands the committed working copy
// to a `Backend` and only swaps it in when `persist` succeeds.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::csv::{parse_rows, split_header, SEP};
use crate::error::{Error, Result};
use crate::file::{ensure_directory, read_optional, table_bytes, write_all_atomic, write_atomic};
use crate::model::{DeltaRecord, Key, Snapshot, Timestamp, VipDelta, VipKey, VipSnapshot};
use crate::source::StatusReport;
use crate::store::{Loaded, Tables};

pub trait Backend: Send {
    /// Read everything persisted so far. A fresh location yields an empty image.
    fn load(&mut self) -> Result<Loaded>;

    /// Write the tables flagged dirty in `tables`.
    fn persist(&mut self, tables: &Tables) -> Result<()>;

    fn save_status(&mut self, _report: &StatusReport) -> Result<()> {
        Ok(())
    }

    fn data_dir(&self) -> Option<&Path> {
        None
    }
}

/* ---------------- Memory ---------------- */

/// Keeps nothing; optionally seeded with an image to load.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    seed: Option<Loaded>,
    pub persists: usize,
}

impl MemoryBackend {
    pub fn seeded(loaded: Loaded) -> Self {
        Self { seed: Some(loaded), persists: 0 }
    }
}

impl Backend for MemoryBackend {
    fn load(&mut self) -> Result<Loaded> {
        Ok(self.seed.take().unwrap_or_default())
    }

    fn persist(&mut self, _tables: &Tables) -> Result<()> {
        self.persists += 1;
        Ok(())
    }
}

/* ---------------- Row encoding ---------------- */

pub const SNAPSHOT_HEADERS: &[&str] =
    &["subject", "world", "guild", "cumulative_value", "last_source_timestamp", "last_observed_at"];
pub const DELTA_HEADERS: &[&str] =
    &["subject", "world", "guild", "batch_time", "delta_value", "before", "after", "recorded_at"];
pub const VIP_HEADERS: &[&str] = &["subject", "world"];
pub const VIP_SNAPSHOT_HEADERS: &[&str] = &[
    "subject", "world", "cumulative_value", "online_minutes",
    "last_source_timestamp", "last_observed_at", "rebaseline",
];
pub const VIP_DELTA_HEADERS: &[&str] = &[
    "subject", "world", "batch_time", "delta_value", "delta_online", "before", "after", "recorded_at",
];

pub fn fmt_ts(t: Timestamp) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_ts(s: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::parse(format!("bad timestamp {s:?}: {e}")))
}

fn parse_i64(s: &str) -> Result<i64> {
    s.trim().parse().map_err(|_| Error::parse(format!("bad integer {s:?}")))
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        other => Err(Error::parse(format!("bad flag {other:?}"))),
    }
}

fn want(row: &[String], n: usize) -> Result<()> {
    if row.len() == n {
        Ok(())
    } else {
        Err(Error::parse(format!("expected {n} columns, got {}", row.len())))
    }
}

pub fn snapshot_row(s: &Snapshot) -> Vec<String> {
    vec![
        s.key.subject.clone(),
        s.key.world.clone(),
        s.key.guild.clone(),
        s.cumulative_value.to_string(),
        fmt_ts(s.last_source_timestamp),
        fmt_ts(s.last_observed_at),
    ]
}

pub fn snapshot_from_row(row: &[String]) -> Result<Snapshot> {
    want(row, SNAPSHOT_HEADERS.len())?;
    Ok(Snapshot {
        key: key!(row[0].as_str(), row[1].as_str(), row[2].as_str()),
        cumulative_value: parse_i64(&row[3])?,
        last_source_timestamp: parse_ts(&row[4])?,
        last_observed_at: parse_ts(&row[5])?,
    })
}

pub fn delta_row(d: &DeltaRecord) -> Vec<String> {
    vec![
        d.key.subject.clone(),
        d.key.world.clone(),
        d.key.guild.clone(),
        fmt_ts(d.batch_time),
        d.delta_value.to_string(),
        d.before.to_string(),
        d.after.to_string(),
        fmt_ts(d.recorded_at),
    ]
}

pub fn delta_from_row(row: &[String]) -> Result<DeltaRecord> {
    want(row, DELTA_HEADERS.len())?;
    Ok(DeltaRecord {
        key: Key::new(row[0].as_str(), row[1].as_str(), row[2].as_str()),
        batch_time: parse_ts(&row[3])?,
        delta_value: parse_i64(&row[4])?,
        before: parse_i64(&row[5])?,
        after: parse_i64(&row[6])?,
        recorded_at: parse_ts(&row[7])?,
    })
}

pub fn vip_row(k: &VipKey) -> Vec<String> {
    vec![k.subject.clone(), k.world.clone()]
}

fn vip_from_row(row: &[String]) -> Result<VipKey> {
    want(row, VIP_HEADERS.len())?;
    Ok(vip_key!(row[0].as_str(), row[1].as_str()))
}

pub fn vip_snapshot_row(s: &VipSnapshot) -> Vec<String> {
    vec![
        s.key.subject.clone(),
        s.key.world.clone(),
        s.cumulative_value.to_string(),
        s.online_minutes.to_string(),
        fmt_ts(s.last_source_timestamp),
        fmt_ts(s.last_observed_at),
        s.rebaseline.to_string(),
    ]
}

fn vip_snapshot_from_row(row: &[String]) -> Result<VipSnapshot> {
    want(row, VIP_SNAPSHOT_HEADERS.len())?;
    Ok(VipSnapshot {
        key: vip_key!(row[0].as_str(), row[1].as_str()),
        cumulative_value: parse_i64(&row[2])?,
        online_minutes: parse_i64(&row[3])?,
        last_source_timestamp: parse_ts(&row[4])?,
        last_observed_at: parse_ts(&row[5])?,
        rebaseline: parse_bool(&row[6])?,
    })
}

pub fn vip_delta_row(d: &VipDelta) -> Vec<String> {
    vec![
        d.key.subject.clone(),
        d.key.world.clone(),
        fmt_ts(d.batch_time),
        d.delta_value.to_string(),
        d.delta_online.to_string(),
        d.before.to_string(),
        d.after.to_string(),
        fmt_ts(d.recorded_at),
    ]
}

fn vip_delta_from_row(row: &[String]) -> Result<VipDelta> {
    want(row, VIP_DELTA_HEADERS.len())?;
    Ok(VipDelta {
        key: vip_key!(row[0].as_str(), row[1].as_str()),
        batch_time: parse_ts(&row[2])?,
        delta_value: parse_i64(&row[3])?,
        delta_online: parse_i64(&row[4])?,
        before: parse_i64(&row[5])?,
        after: parse_i64(&row[6])?,
        recorded_at: parse_ts(&row[7])?,
    })
}

/* ---------------- CSV directory ---------------- */

pub const SNAPSHOTS_FILE: &str = "snapshots.csv";
pub const DELTAS_FILE: &str = "deltas.csv";
pub const MARKER_FILE: &str = "last_reset.txt";
pub const VIPS_FILE: &str = "vips.csv";
pub const VIP_SNAPSHOTS_FILE: &str = "vip_snapshots.csv";
pub const VIP_DELTAS_FILE: &str = "vip_deltas.csv";
pub const STATUS_FILE: &str = "status.json";

/// One CSV file per table under a data directory, each rewritten whole
/// when its table changed. All changed tables of a commit are staged as
/// temp files before any is renamed, so a failed write leaves the previous
/// commit intact. Only a crash between two renames can split a commit;
/// replaying that batch corrects it.
#[derive(Debug, Clone)]
pub struct CsvBackend {
    dir: PathBuf,
}

impl CsvBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure_directory(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Parse one table file. Malformed rows are logged and skipped.
    fn load_table<T>(
        &self,
        name: &str,
        headers: &[&str],
        decode: impl Fn(&[String]) -> Result<T>,
    ) -> Result<Vec<T>> {
        let path = self.path(name);
        let Some(text) = read_optional(&path)? else {
            return Ok(Vec::new());
        };
        let rows = parse_rows(&text, SEP);
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let body = split_header(&rows, headers)
            .ok_or_else(|| Error::parse(format!("{}: unexpected header", path.display())))?;

        let mut out = Vec::with_capacity(body.len());
        for (i, row) in body.iter().enumerate() {
            match decode(row) {
                Ok(v) => out.push(v),
                Err(e) => logw!("{}: skipping line {}: {e}", path.display(), i + 2),
            }
        }
        Ok(out)
    }
}

impl Backend for CsvBackend {
    fn load(&mut self) -> Result<Loaded> {
        let marker_path = self.path(MARKER_FILE);
        let reset_marker = match read_optional(&marker_path)? {
            Some(text) if !text.trim().is_empty() => Some(
                NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                    .map_err(|e| Error::parse(format!("{}: {e}", marker_path.display())))?,
            ),
            _ => None,
        };

        Ok(Loaded {
            snapshots: self.load_table(SNAPSHOTS_FILE, SNAPSHOT_HEADERS, snapshot_from_row)?,
            deltas: self.load_table(DELTAS_FILE, DELTA_HEADERS, delta_from_row)?,
            reset_marker,
            vips: self.load_table(VIPS_FILE, VIP_HEADERS, vip_from_row)?,
            vip_snapshots: self.load_table(VIP_SNAPSHOTS_FILE, VIP_SNAPSHOT_HEADERS, vip_snapshot_from_row)?,
            vip_deltas: self.load_table(VIP_DELTAS_FILE, VIP_DELTA_HEADERS, vip_delta_from_row)?,
        })
    }

    fn persist(&mut self, tables: &Tables) -> Result<()> {
        let dirty = tables.dirty();
        let mut files: Vec<(PathBuf, Vec<u8>)> = Vec::new();

        if dirty.deltas {
            let rows: Vec<_> = tables.delta_rows().map(delta_row).collect();
            files.push((self.path(DELTAS_FILE), table_bytes(DELTA_HEADERS, &rows)));
        }
        if dirty.snapshots {
            let rows: Vec<_> = tables.snapshot_rows().map(snapshot_row).collect();
            files.push((self.path(SNAPSHOTS_FILE), table_bytes(SNAPSHOT_HEADERS, &rows)));
        }
        if dirty.vips {
            let rows: Vec<_> = tables.vip_list().map(vip_row).collect();
            files.push((self.path(VIPS_FILE), table_bytes(VIP_HEADERS, &rows)));
        }
        if dirty.vip_deltas {
            let rows: Vec<_> = tables.vip_delta_rows().map(vip_delta_row).collect();
            files.push((self.path(VIP_DELTAS_FILE), table_bytes(VIP_DELTA_HEADERS, &rows)));
        }
        if dirty.vip_snapshots {
            let rows: Vec<_> = tables.vip_snapshot_rows().map(vip_snapshot_row).collect();
            files.push((self.path(VIP_SNAPSHOTS_FILE), table_bytes(VIP_SNAPSHOT_HEADERS, &rows)));
        }
        // Marker renamed last: if a rename above fails, the reset fires again.
        if dirty.marker {
            if let Some(date) = tables.reset_marker() {
                files.push((self.path(MARKER_FILE), date.format("%Y-%m-%d").to_string().into_bytes()));
            }
        }

        write_all_atomic(&files)?;
        logd!("Persisted {} tables to {} ({dirty:?})", files.len(), self.dir.display());
        Ok(())
    }

    fn save_status(&mut self, report: &StatusReport) -> Result<()> {
        let json = serde_json::to_vec_pretty(report)
            .map_err(|e| Error::parse(format!("status report: {e}")))?;
        write_atomic(&self.path(STATUS_FILE), &json)
    }

    fn data_dir(&self) -> Option<&Path> {
        Some(&self.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn malformed_rows_are_rejected() {
        assert!(delta_from_row(&[s!("A"), s!("W")]).is_err());
        let mut row = delta_row(&DeltaRecord {
            key: key!("A", "W", "G"),
            batch_time: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            delta_value: 1,
            before: 0,
            after: 1,
            recorded_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        });
        row[4] = s!("one");
        assert!(delta_from_row(&row).is_err());
    }

    #[test]
    fn timestamps_use_utc_rfc3339() {
        let t = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(fmt_ts(t), "2025-01-02T03:04:05Z");
        assert_eq!(parse_ts("2025-01-02T00:04:05-03:00").unwrap(), t);
    }
}
