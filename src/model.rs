// src/model.rs
//
// Ledger data model. Everything here is plain data; the rules that mutate
// it live in `store`, `delta`, `reset` and `vip`.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// All instants are kept in UTC; the source's local times are converted
/// once by the site adapter.
pub type Timestamp = DateTime<Utc>;

/// Partition unit of the ranking ledger.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    pub subject: String,
    pub world: String,
    pub guild: String,
}

impl Key {
    pub fn new(subject: impl Into<String>, world: impl Into<String>, guild: impl Into<String>) -> Self {
        Self { subject: subject.into(), world: world.into(), guild: guild.into() }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} - {})", self.subject, self.world, self.guild)
    }
}

/// VIPs are tracked per world only, whatever guild they are in.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VipKey {
    pub subject: String,
    pub world: String,
}

impl VipKey {
    pub fn new(subject: impl Into<String>, world: impl Into<String>) -> Self {
        Self { subject: subject.into(), world: world.into() }
    }
}

impl fmt::Display for VipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.subject, self.world)
    }
}

/// Current cumulative value for one key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub key: Key,
    /// Logically non-negative; not enforced.
    pub cumulative_value: i64,
    pub last_source_timestamp: Timestamp,
    pub last_observed_at: Timestamp,
}

/// One computed change. Unique per `(key, batch_time)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub key: Key,
    pub batch_time: Timestamp,
    pub delta_value: i64,
    pub before: i64,
    pub after: i64,
    pub recorded_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipSnapshot {
    pub key: VipKey,
    pub cumulative_value: i64,
    pub online_minutes: i64,
    pub last_source_timestamp: Timestamp,
    pub last_observed_at: Timestamp,
    /// Set by the daily reset; the next observation writes a fresh baseline.
    pub rebaseline: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipDelta {
    pub key: VipKey,
    pub batch_time: Timestamp,
    pub delta_value: i64,
    pub delta_online: i64,
    pub before: i64,
    pub after: i64,
    pub recorded_at: Timestamp,
}

/// One ranking row as the scraper adapter hands it over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRow {
    pub subject: String,
    pub guild: String,
    pub cumulative: i64,
}

impl BatchRow {
    pub fn new(subject: impl Into<String>, guild: impl Into<String>, cumulative: i64) -> Self {
        Self { subject: subject.into(), guild: guild.into(), cumulative }
    }
}

/// Everything collected for one world in one polling cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub world: String,
    pub batch_time: Timestamp,
    pub rows: Vec<BatchRow>,
}

impl Batch {
    pub fn new(world: impl Into<String>, batch_time: Timestamp, rows: Vec<BatchRow>) -> Self {
        Self { world: world.into(), batch_time, rows }
    }

    /// Concatenate per-guild rows in configuration order. A subject listed
    /// under more than one guild keeps its first occurrence.
    pub fn merge(world: impl Into<String>, batch_time: Timestamp, per_guild: Vec<Vec<BatchRow>>) -> Self {
        let mut seen: HashSet<String> = HashSet::new();
        let mut rows = Vec::new();
        for guild_rows in per_guild {
            for row in guild_rows {
                if seen.insert(row.subject.clone()) {
                    rows.push(row);
                }
            }
        }
        Self::new(world, batch_time, rows)
    }

    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }
}

/// What a VIP's player page reports for today.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerObservation {
    pub subject: String,
    pub exp_today: i64,
    pub online_minutes: i64,
}

/// Live-feed payload for one newly written or corrected ledger row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaEvent {
    pub key: Key,
    pub batch_time: Timestamp,
    pub previous_batch_time: Option<Timestamp>,
    pub delta_value: i64,
    pub before: i64,
    pub after: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn merge_keeps_first_guild_for_duplicate_subject() {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let batch = Batch::merge("Auroria", t, vec![
            vec![BatchRow::new("Alice", "Alpha", 10), BatchRow::new("Bob", "Alpha", 20)],
            vec![BatchRow::new("Bob", "Beta", 99), BatchRow::new("Cara", "Beta", 5)],
        ]);
        let subjects: Vec<_> = batch.rows.iter().map(|r| (r.subject.as_str(), r.guild.as_str())).collect();
        assert_eq!(subjects, vec![("Alice", "Alpha"), ("Bob", "Alpha"), ("Cara", "Beta")]);
        assert_eq!(batch.rows[1].cumulative, 20);
    }
}
