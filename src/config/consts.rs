// src/config/consts.rs

// Net config
pub const BASE_URL: &str = "https://rubinothings.com.br";
pub const USER_AGENT: &str = concat!("rankwatch/", env!("CARGO_PKG_VERSION"));
pub const TIMEOUT_SECS: u64 = 10;
pub const PROXY_TIMEOUT_SECS: u64 = 30;
pub const PROXY_POOL: usize = 40;

// Local store
pub const STORE_DIR: &str = ".store";
pub const CONFIG_FILE: &str = "rankwatch.json";
pub const LOG_FILE: &str = "debug.log";

// Schedule
pub const POLL_INTERVAL_SECS: u64 = 60;
pub const ERROR_BACKOFF_SECS: u64 = 10;
pub const RESTART_DELAY_SECS: u64 = 1;
/// How far ahead of our clock a source instant may be before it is
/// treated as bogus.
pub const CLOCK_SKEW_SECS: i64 = 300;

// Daily reset, source local time (UTC-3, no DST)
pub const RESET_HOUR: u32 = 10;
pub const RESET_MINUTE: u32 = 2;
pub const UTC_OFFSET_HOURS: i32 = -3;

// Targets
pub const DEFAULT_WORLD: &str = "Auroria";
pub const DEFAULT_GUILD: &str = "Ascended Auroria";

// Page vocabulary
pub const COL_PLAYER: &str = "Jogador";
pub const COL_RAW: &str = "RAW no período";
pub const COL_RAW_TODAY: &str = "Raw XP no dia";
pub const COL_ONLINE: &str = "Online time";
