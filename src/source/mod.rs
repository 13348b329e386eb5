// src/source/mod.rs
//
// What the engine needs from the outside world, as traits. `site` is the
// implementation for the public ranking site; tests plug in fakes.

pub mod site;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{BatchRow, PlayerObservation, Timestamp};

/// Collection routines the status page reports per world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Routine {
    Ranking,
    Online,
    DeathsKills,
}

impl Routine {
    pub fn classify(label: &str) -> Option<Self> {
        let l: String = label.to_lowercase().chars().filter(|c| c.is_alphanumeric()).collect();
        if l.contains("deathskills") || l.contains("deaths") {
            Some(Routine::DeathsKills)
        } else if l.contains("online") {
            Some(Routine::Online)
        } else if l.contains("ranking") {
            Some(Routine::Ranking)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Routine::Ranking => "ranking",
            Routine::Online => "online",
            Routine::DeathsKills => "deaths_kills",
        }
    }
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// world -> routine -> last update.
pub type StatusMap = BTreeMap<String, BTreeMap<Routine, Timestamp>>;

/// The ranking routine's instant for `world`: that world's `batch_time`.
pub fn ranking_time(status: &StatusMap, world: &str) -> Option<Timestamp> {
    status.get(world)?.get(&Routine::Ranking).copied()
}

pub trait StatusSource: Send + Sync {
    fn fetch_status(&self) -> Result<StatusMap>;
}

pub trait RankingSource: Send + Sync {
    /// Rows of one guild's ranking page, guild already filled in.
    fn fetch_ranking(&self, world: &str, guild: &str) -> Result<Vec<BatchRow>>;
}

pub trait PlayerSource: Send + Sync {
    fn fetch_player(&self, subject: &str) -> Result<PlayerObservation>;
}

/// Snapshot of one status fetch, saved as `status.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub fetched_at: Timestamp,
    pub worlds: StatusMap,
}

impl StatusReport {
    pub fn new(fetched_at: Timestamp, worlds: &StatusMap) -> Self {
        Self { fetched_at, worlds: worlds.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routine_labels() {
        assert_eq!(Routine::classify("Daily Raw Ranking"), Some(Routine::Ranking));
        assert_eq!(Routine::classify("Online"), Some(Routine::Online));
        assert_eq!(Routine::classify("Deaths/Kills"), Some(Routine::DeathsKills));
        assert_eq!(Routine::classify("Something else"), None);
    }
}
