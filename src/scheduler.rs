// src/scheduler.rs
//
// PollScheduler: checking -> scraping -> idle, sleeping in between.
// One background thread drives it; a supervisor restarts the loop if it
// exits or panics. Cycles (background or manual) are serialized by the
// `progress` mutex.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::consts::CLOCK_SKEW_SECS;
use crate::config::options::{AppOptions, ScheduleOptions, WorldTarget};
use crate::delta::{apply_batch, BatchOutcome};
use crate::error::{self, Result};
use crate::feed::LiveFeed;
use crate::model::{Batch, Timestamp};
use crate::reset::DailyReset;
use crate::source::site::Site;
use crate::source::{ranking_time, PlayerSource, RankingSource, StatusReport, StatusSource};
use crate::store::{lock_recover, Store};
use crate::vip::{VipOutcome, VipTracker};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Checking,
    Scraping,
    Sleeping,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Checking => "checking",
            SchedulerState::Scraping => "scraping",
            SchedulerState::Sleeping => "sleeping",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    /// Background loop alive.
    pub running: bool,
    pub last_check: Option<Timestamp>,
    /// Last processed batch_time per world.
    pub last_batches: BTreeMap<String, Timestamp>,
    pub restarts: u32,
    pub last_error: Option<String>,
}

/// One line: `state=sleeping running=true restarts=0 last_check=.. A@.. B@..`.
impl fmt::Display for SchedulerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state={} running={} restarts={}", self.state, self.running, self.restarts)?;
        match self.last_check {
            Some(t) => write!(f, " last_check={}", t.format("%Y-%m-%d %H:%M:%S"))?,
            None => f.write_str(" last_check=never")?,
        }
        for (world, t) in &self.last_batches {
            write!(f, " {world}@{}", t.format("%Y-%m-%d %H:%M"))?;
        }
        if let Some(e) = &self.last_error {
            write!(f, " last_error={e:?}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("update already in progress ({0})")]
    Busy(SchedulerState),
    #[error("update failed: {0}")]
    Failed(String),
}

pub struct Sources {
    pub status: Arc<dyn StatusSource>,
    pub ranking: Arc<dyn RankingSource>,
    pub players: Arc<dyn PlayerSource>,
}

impl Sources {
    pub fn from_site(site: Arc<Site>) -> Self {
        Self { status: site.clone(), ranking: site.clone(), players: site }
    }
}

#[derive(Clone, Debug)]
pub struct WorldReport {
    pub world: String,
    pub batch_time: Timestamp,
    pub rows: usize,
    pub reset_fired: bool,
    pub outcome: BatchOutcome,
    pub vip: Option<VipOutcome>,
}

#[derive(Clone, Debug, Default)]
pub struct CycleReport {
    pub processed: Vec<WorldReport>,
    /// (world, reason) for worlds skipped because a fetch or write failed.
    pub failed: Vec<(String, String)>,
    /// Worlds with nothing new, missing from the status page, or reporting
    /// a batch_time ahead of our clock.
    pub skipped: Vec<String>,
}

type WorldProgress = BTreeMap<String, Timestamp>;

pub struct PollScheduler {
    targets: Vec<WorldTarget>,
    timing: ScheduleOptions,
    reset: DailyReset,
    store: Arc<Store>,
    feed: Arc<LiveFeed>,
    sources: Sources,
    vip: VipTracker,
    clock: Arc<dyn Clock>,
    progress: Mutex<WorldProgress>,
    status: Mutex<SchedulerStatus>,
    stop: AtomicBool,
}

impl PollScheduler {
    pub fn new(
        opts: &AppOptions,
        store: Arc<Store>,
        feed: Arc<LiveFeed>,
        sources: Sources,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let reset = DailyReset::from_options(&opts.reset)?;

        let progress: WorldProgress = opts.targets.iter()
            .filter_map(|t| store.latest_batch_time(&t.world).map(|ts| (t.world.clone(), ts)))
            .collect();
        for (world, ts) in &progress {
            logd!("Resuming {world} after batch {ts}");
        }

        let vip = VipTracker::new(Arc::clone(&store), Arc::clone(&sources.players), Arc::clone(&clock));
        let status = SchedulerStatus {
            state: SchedulerState::Idle,
            running: false,
            last_check: None,
            last_batches: progress.clone(),
            restarts: 0,
            last_error: None,
        };

        Ok(Self {
            targets: opts.targets.clone(),
            timing: opts.schedule.clone(),
            reset,
            store,
            feed,
            sources,
            vip,
            clock,
            progress: Mutex::new(progress),
            status: Mutex::new(status),
            stop: AtomicBool::new(false),
        })
    }

    pub fn status(&self) -> SchedulerStatus {
        lock_recover(&self.status).clone()
    }

    pub fn feed(&self) -> &Arc<LiveFeed> { &self.feed }

    pub fn store(&self) -> &Arc<Store> { &self.store }

    fn set_state(&self, state: SchedulerState) {
        let mut st = lock_recover(&self.status);
        if st.state != state {
            logd!("Scheduler {} -> {state}", st.state);
            st.state = state;
        }
    }

    /// One scheduled cycle: only worlds with a new batch_time are scraped.
    /// Waits for a running cycle to finish.
    pub fn run_cycle(&self) -> Result<CycleReport> {
        let mut progress = lock_recover(&self.progress);
        self.guarded_cycle(&mut progress, false)
    }

    /// Forced cycle over every configured world. Refuses to wait: if a cycle
    /// is already running, returns `Busy` with the current state.
    pub fn trigger_update(&self) -> std::result::Result<CycleReport, TriggerError> {
        let mut progress = match self.progress.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                let state = self.status().state;
                logw!("Manual update refused: scheduler is {state}");
                return Err(TriggerError::Busy(state));
            }
        };
        logf!("Manual update triggered");
        self.guarded_cycle(&mut progress, true).map_err(|e| TriggerError::Failed(e.to_string()))
    }

    fn guarded_cycle(&self, progress: &mut WorldProgress, force: bool) -> Result<CycleReport> {
        let out = self.cycle(progress, force);
        {
            let mut st = lock_recover(&self.status);
            st.last_error = match &out {
                Ok(r) if r.failed.is_empty() => None,
                Ok(r) => Some(r.failed.iter().map(|(w, e)| format!("{w}: {e}")).collect::<Vec<_>>().join("; ")),
                Err(e) => Some(e.to_string()),
            };
        }
        self.set_state(SchedulerState::Idle);
        out
    }

    fn cycle(&self, progress: &mut WorldProgress, force: bool) -> Result<CycleReport> {
        self.set_state(SchedulerState::Checking);
        let status = self.sources.status.fetch_status()?;
        let checked_at = self.clock.now();
        lock_recover(&self.status).last_check = Some(checked_at);

        if let Err(e) = self.store.save_status(&StatusReport::new(checked_at, &status)) {
            logw!("Could not save status report: {e}");
        }

        let max_skew = chrono::Duration::seconds(CLOCK_SKEW_SECS);
        let mut report = CycleReport::default();
        let mut due = Vec::new();
        for target in &self.targets {
            match ranking_time(&status, &target.world) {
                None => {
                    logw!("No ranking routine for world {}, skipping", target.world);
                    report.skipped.push(target.world.clone());
                }
                // A future batch_time would block every real batch until it passed.
                Some(t) if t > checked_at + max_skew => {
                    logw!("{}: batch {t} is ahead of now ({checked_at}), skipping", target.world);
                    report.skipped.push(target.world.clone());
                }
                Some(t) if force || progress.get(&target.world).is_none_or(|last| t > *last) => {
                    due.push((target, t));
                }
                Some(t) => {
                    logd!("{}: batch {t} already processed", target.world);
                    report.skipped.push(target.world.clone());
                }
            }
        }

        if due.is_empty() {
            self.set_state(SchedulerState::Sleeping);
            return Ok(report);
        }

        self.set_state(SchedulerState::Scraping);
        for (target, t) in due {
            match self.process_world(target, t) {
                Ok(world_report) => {
                    progress.insert(target.world.clone(), t);
                    lock_recover(&self.status).last_batches.insert(target.world.clone(), t);
                    report.processed.push(world_report);
                }
                Err(e) => {
                    loge!("World {} skipped this cycle: {e}", target.world);
                    report.failed.push((target.world.clone(), e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Fetch every guild of one world and commit the batch. Nothing is
    /// written unless all guild fetches succeeded.
    fn process_world(&self, target: &WorldTarget, batch_time: Timestamp) -> Result<WorldReport> {
        let world = target.world.as_str();

        let mut per_guild = Vec::with_capacity(target.guilds.len());
        for guild in &target.guilds {
            per_guild.push(self.sources.ranking.fetch_ranking(world, guild)?);
        }
        let batch = Batch::merge(world, batch_time, per_guild);

        let now = self.clock.now();
        let (reset_fired, outcome) = self.store.transaction(|tables| {
            let fired = self.reset.check_and_reset(tables, now);
            Ok((fired, apply_batch(tables, &batch, now)))
        })?;

        let reached = self.feed.publish(&outcome.events);
        if !outcome.events.is_empty() {
            logd!("Published {} events to {reached} subscribers", outcome.events.len());
        }

        let vip = match self.vip.refresh_world(world, batch_time) {
            Ok(v) => Some(v),
            Err(e) => {
                logw!("VIP refresh for {world} failed: {e}");
                None
            }
        };

        logf!(
            "{world} @ {batch_time}: {} rows, {} recorded, {} corrected, {} suppressed, {} new",
            batch.len(), outcome.recorded, outcome.corrected, outcome.suppressed, outcome.new_keys
        );
        Ok(WorldReport { world: s!(world), batch_time, rows: batch.len(), reset_fired, outcome, vip })
    }

    /* ---------------- Background loop ---------------- */

    /// Ask the loop (and its supervisor) to exit at the next sleep.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn sleep(&self, secs: u64) {
        self.set_state(SchedulerState::Sleeping);
        let slice = Duration::from_millis(100);
        let mut left = Duration::from_secs(secs);
        while !left.is_zero() && !self.stopped() {
            let step = left.min(slice);
            thread::sleep(step);
            left -= step;
        }
    }

    fn run_loop(&self) {
        while !self.stopped() {
            let out = self.run_cycle();
            logf!("Scheduler {}", self.status());
            match out {
                Ok(report) if report.failed.is_empty() => self.sleep(self.timing.poll_interval_secs),
                Ok(_) => self.sleep(self.timing.error_backoff_secs),
                Err(e) if e.is_fetch() => {
                    logw!("Source unreachable, retrying in {}s: {e}", self.timing.error_backoff_secs);
                    self.sleep(self.timing.error_backoff_secs);
                }
                Err(e) => {
                    loge!("Cycle failed: {e}");
                    self.sleep(self.timing.error_backoff_secs);
                }
            }
        }
    }

    fn supervise(&self) {
        lock_recover(&self.status).running = true;
        logf!("Scheduler started for {} worlds", self.targets.len());

        while !self.stopped() {
            match catch_unwind(AssertUnwindSafe(|| self.run_loop())) {
                Ok(()) if self.stopped() => break,
                Ok(()) => logw!("Scheduler loop exited, restarting"),
                Err(_) => loge!("Scheduler loop panicked, restarting"),
            }
            lock_recover(&self.status).restarts += 1;
            self.set_state(SchedulerState::Idle);
            thread::sleep(Duration::from_secs(self.timing.restart_delay_secs));
        }

        let mut st = lock_recover(&self.status);
        st.running = false;
        st.state = SchedulerState::Idle;
        logf!("Scheduler stopped");
    }

    /// Run the supervised loop on its own thread.
    pub fn spawn(self: Arc<Self>) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(s!("poll-scheduler"))
            .spawn(move || self.supervise())
            .map_err(|e| error::Error::spawn("scheduler", e))
    }
}
