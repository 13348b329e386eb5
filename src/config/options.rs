// src/config/options.rs
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::consts::*;
use crate::error::{Error, Result};
use crate::reset::DailyReset;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppOptions {
    pub targets: Vec<WorldTarget>,
    pub schedule: ScheduleOptions,
    pub reset: ResetOptions,
    pub net: NetOptions,
    pub store: StoreOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            targets: vec![WorldTarget::new(DEFAULT_WORLD, [DEFAULT_GUILD])],
            schedule: ScheduleOptions::default(),
            reset: ResetOptions::default(),
            net: NetOptions::default(),
            store: StoreOptions::default(),
        }
    }
}

/// One world and the guilds polled in it, in priority order: a subject
/// listed in two guilds is attributed to the first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldTarget {
    pub world: String,
    pub guilds: Vec<String>,
}

impl WorldTarget {
    pub fn new<G: Into<String>>(world: impl Into<String>, guilds: impl IntoIterator<Item = G>) -> Self {
        Self { world: world.into(), guilds: guilds.into_iter().map(Into::into).collect() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleOptions {
    pub poll_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub restart_delay_secs: u64,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            poll_interval_secs: POLL_INTERVAL_SECS,
            error_backoff_secs: ERROR_BACKOFF_SECS,
            restart_delay_secs: RESTART_DELAY_SECS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetOptions {
    pub hour: u32,
    pub minute: u32,
    /// Source local time as a fixed offset from UTC, e.g. -3.
    pub utc_offset_hours: i32,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self { hour: RESET_HOUR, minute: RESET_MINUTE, utc_offset_hours: UTC_OFFSET_HOURS }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetOptions {
    pub base_url: String,
    pub timeout_secs: u64,
    pub proxy_timeout_secs: u64,
    pub proxy_pool: usize,
    /// Skip the direct attempt and always race proxies.
    pub force_proxy: bool,
    pub proxies: Vec<String>,
    pub user_agent: String,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            base_url: s!(BASE_URL),
            timeout_secs: TIMEOUT_SECS,
            proxy_timeout_secs: PROXY_TIMEOUT_SECS,
            proxy_pool: PROXY_POOL,
            force_proxy: false,
            proxies: Vec::new(),
            user_agent: s!(USER_AGENT),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Csv,
    Memory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    pub backend: BackendKind,
    pub data_dir: PathBuf,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { backend: BackendKind::Csv, data_dir: PathBuf::from(STORE_DIR) }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| Error::config(format!("{name}={value:?} is not a valid value")))
}

impl AppOptions {
    /// Read options from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match crate::file::read_optional(path)? {
            Some(text) => serde_json::from_str(&text)
                .map_err(|e| Error::config(format!("{}: {e}", path.display()))),
            None => {
                logd!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
        }
    }

    /// Load, apply process environment overrides, validate.
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut opts = Self::load(path)?;
        opts.apply_env_with(|k| std::env::var(k).ok())?;
        opts.validate()?;
        Ok(opts)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// `TIMEZONE_OFFSET_HOURS` counts hours *behind* UTC (3 means UTC-3).
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("DATA_FOLDER") {
            self.store.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TIMEZONE_OFFSET_HOURS") {
            let behind: i32 = parse_env("TIMEZONE_OFFSET_HOURS", &v)?;
            self.reset.utc_offset_hours = -behind;
        }
        if let Some(v) = lookup("DAILY_RESET_HOUR") {
            self.reset.hour = parse_env("DAILY_RESET_HOUR", &v)?;
        }
        if let Some(v) = lookup("DAILY_RESET_MINUTE") {
            self.reset.minute = parse_env("DAILY_RESET_MINUTE", &v)?;
        }
        if let Some(v) = lookup("FORCE_PROXY") {
            self.net.force_proxy = v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(v) = lookup("POLL_INTERVAL_SECS") {
            self.schedule.poll_interval_secs = parse_env("POLL_INTERVAL_SECS", &v)?;
        }

        let world = lookup("DEFAULT_WORLD");
        let guild = lookup("DEFAULT_GUILD");
        if world.is_some() || guild.is_some() {
            if self.targets.is_empty() {
                self.targets.push(WorldTarget::new(DEFAULT_WORLD, [DEFAULT_GUILD]));
            }
            let first = &mut self.targets[0];
            if let Some(w) = world {
                first.world = w;
            }
            if let Some(g) = guild {
                match first.guilds.first_mut() {
                    Some(slot) => *slot = g,
                    None => first.guilds.push(g),
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::config("no worlds configured"));
        }
        for t in &self.targets {
            if t.world.trim().is_empty() {
                return Err(Error::config("empty world name"));
            }
            if t.guilds.is_empty() || t.guilds.iter().any(|g| g.trim().is_empty()) {
                return Err(Error::config(format!("world {} needs at least one non-empty guild", t.world)));
            }
        }
        let mut worlds: Vec<&str> = self.targets.iter().map(|t| t.world.as_str()).collect();
        worlds.sort_unstable();
        if worlds.windows(2).any(|w| w[0] == w[1]) {
            return Err(Error::config("world listed twice in targets"));
        }

        if self.schedule.poll_interval_secs == 0 {
            return Err(Error::config("poll_interval_secs must be > 0"));
        }
        if !(-12..=14).contains(&self.reset.utc_offset_hours) {
            return Err(Error::config(format!("utc_offset_hours {} out of range", self.reset.utc_offset_hours)));
        }
        DailyReset::from_options(&self.reset)?;

        url::Url::parse(&self.net.base_url)
            .map_err(|e| Error::config(format!("base_url {:?}: {e}", self.net.base_url)))?;
        if self.net.proxy_pool == 0 {
            return Err(Error::config("proxy_pool must be > 0"));
        }
        for p in &self.net.proxies {
            url::Url::parse(p).map_err(|e| Error::config(format!("proxy {p:?}: {e}")))?;
        }
        Ok(())
    }
}
