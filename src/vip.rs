// src/vip.rs
//
// VIPTracker: the delta pattern for a curated list of (subject, world),
// fed from each VIP's own player page instead of the guild ranking.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::Result;
use crate::model::{PlayerObservation, Timestamp, VipDelta, VipKey, VipSnapshot};
use crate::source::PlayerSource;
use crate::store::{Store, Tables, Written};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VipOutcome {
    /// Zero-delta rows written on first sight or after a reset.
    pub baselines: usize,
    pub recorded: usize,
    pub corrected: usize,
    pub unchanged: usize,
    pub stale: usize,
    /// Observations for subjects not on the list.
    pub ignored: usize,
    /// Fetch failures (only set by `VipTracker::refresh_world`).
    pub failed: usize,
}

/// Apply player observations for `world` at `batch_time`.
pub fn observe(
    tables: &mut Tables,
    world: &str,
    batch_time: Timestamp,
    observations: &[PlayerObservation],
    now: Timestamp,
) -> VipOutcome {
    let mut out = VipOutcome::default();
    let t = batch_time;

    for obs in observations {
        let key = vip_key!(obs.subject.as_str(), world);
        if !tables.is_vip(&key) {
            out.ignored += 1;
            continue;
        }

        let snap = tables.get_vip_snapshot(&key).cloned();
        let fresh = |key: VipKey| VipSnapshot {
            key,
            cumulative_value: obs.exp_today,
            online_minutes: obs.online_minutes,
            last_source_timestamp: t,
            last_observed_at: now,
            rebaseline: false,
        };

        let snap = match snap {
            Some(s) if !s.rebaseline => s,
            _ => {
                tables.append_or_correct_vip_delta(VipDelta {
                    key: key.clone(),
                    batch_time: t,
                    delta_value: 0,
                    delta_online: 0,
                    before: obs.exp_today,
                    after: obs.exp_today,
                    recorded_at: now,
                });
                tables.upsert_vip_snapshot(fresh(key.clone()));
                logf!("VIP baseline for {key}: {} exp, {} min online", obs.exp_today, obs.online_minutes);
                out.baselines += 1;
                continue;
            }
        };

        if t < snap.last_source_timestamp {
            out.stale += 1;
            continue;
        }

        let existing = if snap.last_source_timestamp == t {
            tables.get_vip_delta(&key, t).cloned()
        } else {
            None
        };
        let (previous, previous_online) = match &existing {
            Some(rec) => (rec.before, snap.online_minutes - rec.delta_online),
            None => (snap.cumulative_value, snap.online_minutes),
        };

        let delta = obs.exp_today - previous;
        if delta == 0 && existing.is_none() {
            tables.upsert_vip_snapshot(VipSnapshot { last_source_timestamp: t, last_observed_at: now, ..snap });
            out.unchanged += 1;
            continue;
        }

        let written = tables.append_or_correct_vip_delta(VipDelta {
            key: key.clone(),
            batch_time: t,
            delta_value: delta,
            delta_online: obs.online_minutes - previous_online,
            before: previous,
            after: obs.exp_today,
            recorded_at: now,
        });
        match written {
            Written::Inserted => out.recorded += 1,
            Written::Corrected => out.corrected += 1,
        }
        tables.upsert_vip_snapshot(fresh(key));
    }
    out
}

pub struct VipTracker {
    store: Arc<Store>,
    source: Arc<dyn PlayerSource>,
    clock: Arc<dyn Clock>,
}

impl VipTracker {
    pub fn new(store: Arc<Store>, source: Arc<dyn PlayerSource>, clock: Arc<dyn Clock>) -> Self {
        Self { store, source, clock }
    }

    /// Fetch every listed VIP of `world` and record the results in one
    /// transaction. A failed fetch is logged and counted; the rest go on.
    pub fn refresh_world(&self, world: &str, batch_time: Timestamp) -> Result<VipOutcome> {
        let listed: Vec<VipKey> = self.store.vips().into_iter().filter(|k| k.world == world).collect();
        if listed.is_empty() {
            return Ok(VipOutcome::default());
        }

        let mut observations = Vec::with_capacity(listed.len());
        let mut failed = 0;
        for key in &listed {
            match self.source.fetch_player(&key.subject) {
                Ok(obs) => observations.push(obs),
                Err(e) => {
                    logw!("VIP fetch failed for {key}: {e}");
                    failed += 1;
                }
            }
        }

        let now = self.clock.now();
        let mut out = self.store.transaction(|t| Ok(observe(t, world, batch_time, &observations, now)))?;
        out.failed = failed;

        logf!(
            "VIPs {world}: {} baselines, {} recorded, {} corrected, {} unchanged, {} failed",
            out.baselines, out.recorded, out.corrected, out.unchanged, out.failed
        );
        Ok(out)
    }
}
