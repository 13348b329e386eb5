// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};

use rankwatch::error::{Error, Result};
use rankwatch::model::{Batch, BatchRow, PlayerObservation, Timestamp};
use rankwatch::source::{PlayerSource, RankingSource, Routine, StatusMap, StatusSource};

/// 2025-03-01 at `h:m` UTC.
pub fn at(h: u32, m: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2025, 3, 1, h, m, 0).unwrap()
}

pub fn day(d: u32, h: u32, m: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2025, 3, d, h, m, 0).unwrap()
}

pub fn batch(world: &str, t: Timestamp, rows: &[(&str, i64)]) -> Batch {
    Batch::new(world, t, rows.iter().map(|(s, v)| BatchRow::new(*s, "G", *v)).collect())
}

pub fn tmp_dir(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("rankwatch_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&p);
    fs::create_dir_all(&p).unwrap();
    p
}

/// Scripted site: per-world ranking instant, per (world, guild) rows,
/// per-player observations. Missing entries fail like a dead network.
#[derive(Default)]
pub struct FakeSite {
    pub status: Mutex<BTreeMap<String, Timestamp>>,
    pub rankings: Mutex<BTreeMap<(String, String), Vec<(String, i64)>>>,
    pub players: Mutex<BTreeMap<String, (i64, i64)>>,
    pub status_down: Mutex<bool>,
    pub ranking_calls: Mutex<usize>,
}

impl FakeSite {
    pub fn set_status(&self, world: &str, t: Timestamp) {
        self.status.lock().unwrap().insert(world.to_string(), t);
    }

    pub fn set_ranking(&self, world: &str, guild: &str, rows: &[(&str, i64)]) {
        self.rankings.lock().unwrap().insert(
            (world.to_string(), guild.to_string()),
            rows.iter().map(|(s, v)| (s.to_string(), *v)).collect(),
        );
    }

    pub fn drop_ranking(&self, world: &str, guild: &str) {
        self.rankings.lock().unwrap().remove(&(world.to_string(), guild.to_string()));
    }

    pub fn set_player(&self, name: &str, exp: i64, online: i64) {
        self.players.lock().unwrap().insert(name.to_string(), (exp, online));
    }

    pub fn drop_player(&self, name: &str) {
        self.players.lock().unwrap().remove(name);
    }
}

impl StatusSource for FakeSite {
    fn fetch_status(&self) -> Result<StatusMap> {
        if *self.status_down.lock().unwrap() {
            return Err(Error::fetch("fake://status", "down"));
        }
        Ok(self.status.lock().unwrap().iter()
            .map(|(w, t)| (w.clone(), BTreeMap::from([(Routine::Ranking, *t)])))
            .collect())
    }
}

impl RankingSource for FakeSite {
    fn fetch_ranking(&self, world: &str, guild: &str) -> Result<Vec<BatchRow>> {
        *self.ranking_calls.lock().unwrap() += 1;
        self.rankings.lock().unwrap()
            .get(&(world.to_string(), guild.to_string()))
            .map(|rows| rows.iter().map(|(s, v)| BatchRow::new(s.as_str(), guild, *v)).collect())
            .ok_or_else(|| Error::fetch(&format!("fake://{world}/{guild}"), "unreachable"))
    }
}

impl PlayerSource for FakeSite {
    fn fetch_player(&self, subject: &str) -> Result<PlayerObservation> {
        self.players.lock().unwrap()
            .get(subject)
            .map(|(exp, online)| PlayerObservation { subject: subject.to_string(), exp_today: *exp, online_minutes: *online })
            .ok_or_else(|| Error::fetch(&format!("fake://player/{subject}"), "unreachable"))
    }
}
