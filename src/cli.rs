// src/cli.rs
use std::{env, path::PathBuf, sync::Arc};

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

use crate::clock::{Clock, SystemClock};
use crate::config::consts::CONFIG_FILE;
use crate::config::options::{AppOptions, BackendKind};
use crate::error::{Error, Result};
use crate::export;
use crate::feed::LiveFeed;
use crate::model::{Timestamp, VipKey};
use crate::persist::{parse_ts, CsvBackend, STATUS_FILE};
use crate::scheduler::{CycleReport, PollScheduler, Sources};
use crate::source::site::Site;
use crate::source::StatusReport;
use crate::store::{DeltaQuery, SnapshotFilter, Store};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Watch,
    Once,
    Force,
    List,
    Deltas,
    Totals,
    ExportSnapshots(PathBuf),
    ExportDeltas(PathBuf),
    ExportVipDeltas(PathBuf),
    VipAdd(VipKey),
    VipRemove(VipKey),
    VipList,
    Status,
    Help,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Params {
    pub command: Command,
    pub config: PathBuf,
    pub data_dir: Option<PathBuf>,
    pub memory: bool,
    pub verbose: bool,
    pub world: Option<String>,
    pub guild: Option<String>,
    pub subject: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            command: Command::Watch,
            config: PathBuf::from(CONFIG_FILE),
            data_dir: None,
            memory: false,
            verbose: false,
            world: None,
            guild: None,
            subject: None,
            from: None,
            to: None,
        }
    }
}

impl Params {
    pub fn snapshot_filter(&self) -> SnapshotFilter {
        SnapshotFilter { world: self.world.clone(), guild: self.guild.clone() }
    }

    pub fn delta_query(&self) -> DeltaQuery {
        DeltaQuery {
            world: self.world.clone(),
            guild: self.guild.clone(),
            subject: self.subject.clone(),
            from: self.from,
            to: self.to,
        }
    }
}

fn missing(flag: &str) -> Error {
    Error::config(format!("Missing value for {flag}"))
}

/// "Name,World" -> VipKey. The name may itself contain commas; the world
/// is whatever follows the last one.
fn parse_vip(v: &str) -> Result<VipKey> {
    let (name, world) = v.rsplit_once(',').ok_or_else(|| Error::config(format!("Expected NAME,WORLD, got {v:?}")))?;
    let (name, world) = (name.trim(), world.trim());
    if name.is_empty() || world.is_empty() {
        return Err(Error::config(format!("Expected NAME,WORLD, got {v:?}")));
    }
    Ok(vip_key!(name, world))
}

/// RFC 3339, or a bare date: start of day for `--from`, end of day for `--to`.
fn parse_when(v: &str, end_of_day: bool) -> Result<Timestamp> {
    if let Ok(t) = parse_ts(v) {
        return Ok(t);
    }
    let date = NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
        .map_err(|_| Error::config(format!("Bad date/time {v:?}")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    };
    let time = time.ok_or_else(|| Error::config("bad time of day"))?;
    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Params> {
    let mut params = Params::default();
    let mut args = args.into_iter();

    while let Some(a) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| missing(flag));
        match a.as_str() {
            "--watch" => params.command = Command::Watch,
            "--once" => params.command = Command::Once,
            "--force" => params.command = Command::Force,
            "--list" => params.command = Command::List,
            "--deltas" => params.command = Command::Deltas,
            "--totals" => params.command = Command::Totals,
            "--export-snapshots" => params.command = Command::ExportSnapshots(PathBuf::from(value(&a)?)),
            "--export-deltas" => params.command = Command::ExportDeltas(PathBuf::from(value(&a)?)),
            "--export-vip-deltas" => params.command = Command::ExportVipDeltas(PathBuf::from(value(&a)?)),
            "--vip-add" => params.command = Command::VipAdd(parse_vip(&value(&a)?)?),
            "--vip-remove" => params.command = Command::VipRemove(parse_vip(&value(&a)?)?),
            "--vip-list" => params.command = Command::VipList,
            "--status" => params.command = Command::Status,

            "--world" => params.world = Some(value(&a)?),
            "--guild" => params.guild = Some(value(&a)?),
            "--subject" => params.subject = Some(value(&a)?),
            "--from" => params.from = Some(parse_when(&value(&a)?, false)?),
            "--to" => params.to = Some(parse_when(&value(&a)?, true)?),

            "-c" | "--config" => params.config = PathBuf::from(value(&a)?),
            "-d" | "--data-dir" => params.data_dir = Some(PathBuf::from(value(&a)?)),
            "--memory" => params.memory = true,
            "-v" | "--verbose" => params.verbose = true,
            "-h" | "--help" => params.command = Command::Help,
            _ => return Err(Error::config(format!("Unknown arg: {a}"))),
        }
    }
    Ok(params)
}

fn open_store(opts: &AppOptions, memory: bool) -> Result<Arc<Store>> {
    let store = match (memory, opts.store.backend) {
        (true, _) | (false, BackendKind::Memory) => Store::in_memory(),
        (false, BackendKind::Csv) => Store::open(CsvBackend::new(&opts.store.data_dir)?)?,
    };
    Ok(Arc::new(store))
}

fn build_scheduler(opts: &AppOptions, store: Arc<Store>) -> Result<Arc<PollScheduler>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let site = Arc::new(Site::from_options(opts, Arc::clone(&clock))?);
    let scheduler = PollScheduler::new(opts, store, Arc::new(LiveFeed::new()), Sources::from_site(site), clock)?;
    Ok(Arc::new(scheduler))
}

fn print_cycle(report: &CycleReport) {
    for w in &report.processed {
        println!(
            "{} @ {}: {} rows, {} recorded, {} corrected, {} suppressed, {} new{}",
            w.world,
            w.batch_time,
            w.rows,
            w.outcome.recorded,
            w.outcome.corrected,
            w.outcome.suppressed,
            w.outcome.new_keys,
            if w.reset_fired { " (daily reset)" } else { "" },
        );
    }
    for (world, reason) in &report.failed {
        println!("{world}: failed: {reason}");
    }
    for world in &report.skipped {
        println!("{world}: nothing new");
    }
}

pub fn run() -> Result<()> {
    run_with(env::args().skip(1))
}

pub fn run_with<I: IntoIterator<Item = String>>(args: I) -> Result<()> {
    let params = parse_args(args)?;
    if params.command == Command::Help {
        println!("{}", include_str!("cli_help.txt"));
        return Ok(());
    }

    let mut opts = AppOptions::resolve(&params.config)?;
    if let Some(dir) = &params.data_dir {
        opts.store.data_dir = dir.clone();
    }
    crate::log::init(&opts.store.data_dir, params.verbose)?;
    let store = open_store(&opts, params.memory)?;

    match &params.command {
        Command::Watch => {
            let scheduler = build_scheduler(&opts, store)?;
            let events = scheduler.feed().subscribe();
            let handle = Arc::clone(&scheduler).spawn()?;
            for ev in events {
                println!(
                    "{} {} {:+} ({} -> {})",
                    ev.batch_time.format("%Y-%m-%d %H:%M"), ev.key, ev.delta_value, ev.before, ev.after
                );
            }
            let _ = handle.join();
        }
        Command::Once => print_cycle(&build_scheduler(&opts, store)?.run_cycle()?),
        Command::Force => {
            let report = build_scheduler(&opts, store)?.trigger_update()?;
            print_cycle(&report);
        }
        Command::List => {
            for s in store.snapshots(&params.snapshot_filter()) {
                println!("{},{},{},{}", s.key.subject, s.key.world, s.key.guild, s.cumulative_value);
            }
        }
        Command::Deltas => {
            for d in store.deltas(&params.delta_query()) {
                println!("{} {} {:+} ({} -> {})", d.batch_time.format("%Y-%m-%d %H:%M"), d.key, d.delta_value, d.before, d.after);
            }
        }
        Command::Totals => {
            for (key, total) in export::totals(&store.deltas(&params.delta_query())) {
                println!("{key}: {total}");
            }
        }
        Command::ExportSnapshots(path) => {
            let n = export::write_snapshots(&store, &params.snapshot_filter(), path)?;
            println!("Wrote {n} rows to {}", path.display());
        }
        Command::ExportDeltas(path) => {
            let n = export::write_deltas(&store, &params.delta_query(), path)?;
            println!("Wrote {n} rows to {}", path.display());
        }
        Command::ExportVipDeltas(path) => {
            let n = export::write_vip_deltas(&store, &params.delta_query(), path)?;
            println!("Wrote {n} rows to {}", path.display());
        }
        Command::VipAdd(key) => {
            let added = store.add_vip(key.clone())?;
            println!("{key}: {}", if added { "added" } else { "already listed" });
        }
        Command::VipRemove(key) => {
            let removed = store.remove_vip(key)?;
            println!("{key}: {}", if removed { "removed" } else { "not listed" });
        }
        Command::VipList => {
            let snaps = store.vip_snapshots();
            for key in store.vips() {
                match snaps.iter().find(|s| s.key == key) {
                    Some(s) => println!("{key}: {} exp, {} min online", s.cumulative_value, s.online_minutes),
                    None => println!("{key}: not observed yet"),
                }
            }
        }
        Command::Status => {
            let status = build_scheduler(&opts, Arc::clone(&store))?.status();
            println!("{status}");
            match store.last_reset() {
                Some(date) => println!("last reset: {date}"),
                None => println!("last reset: never"),
            }
            if let Some(dir) = store.data_dir() {
                let path = dir.join(STATUS_FILE);
                if let Some(text) = crate::file::read_optional(&path)? {
                    let report: StatusReport = serde_json::from_str(&text)
                        .map_err(|e| Error::parse(format!("{}: {e}", path.display())))?;
                    for (world, routines) in &report.worlds {
                        for (routine, t) in routines {
                            println!("{world} {routine:?}: {}", t.format("%Y-%m-%d %H:%M"));
                        }
                    }
                }
            }
        }
        Command::Help => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s!(*s)).collect()
    }

    #[test]
    fn defaults_to_watch() {
        let p = parse_args(args(&[])).unwrap();
        assert_eq!(p.command, Command::Watch);
        assert_eq!(p.config, PathBuf::from(CONFIG_FILE));
    }

    #[test]
    fn filters_and_dates() {
        let p = parse_args(args(&["--deltas", "--world", "Auroria", "--from", "2025-03-01", "--to", "2025-03-01"])).unwrap();
        assert_eq!(p.command, Command::Deltas);
        let q = p.delta_query();
        assert_eq!(q.world.as_deref(), Some("Auroria"));
        assert_eq!(q.from, Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()));
        assert_eq!(q.to, Some(Utc.with_ymd_and_hms(2025, 3, 1, 23, 59, 59).unwrap()));
    }

    #[test]
    fn vip_args() {
        let p = parse_args(args(&["--vip-add", "Foo Bar, Auroria"])).unwrap();
        assert_eq!(p.command, Command::VipAdd(vip_key!("Foo Bar", "Auroria")));
        assert!(parse_args(args(&["--vip-add", "NoWorld"])).is_err());
    }

    #[test]
    fn status_command() {
        assert_eq!(parse_args(args(&["--status", "-d", "/tmp/x"])).unwrap().command, Command::Status);
    }

    #[test]
    fn rejects_unknown_and_missing() {
        assert!(parse_args(args(&["--bogus"])).is_err());
        assert!(parse_args(args(&["--world"])).is_err());
        assert!(parse_args(args(&["--from", "yesterday"])).is_err());
    }
}
