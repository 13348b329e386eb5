// src/reset.rs
//
// DailyResetCoordinator. The source zeroes its daily counters at a fixed
// local time; we mirror that so the first post-reset batch is not read as
// a huge negative (or bogus positive) delta.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};

use crate::config::options::ResetOptions;
use crate::error::{Error, Result};
use crate::model::Timestamp;
use crate::store::Tables;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DailyReset {
    at: NaiveTime,
    offset: FixedOffset,
}

impl DailyReset {
    /// `utc_offset_hours` is a fixed offset; DST is not modelled.
    pub fn new(hour: u32, minute: u32, utc_offset_hours: i32) -> Result<Self> {
        let at = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| Error::config(format!("invalid reset time {hour:02}:{minute:02}")))?;
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .ok_or_else(|| Error::config(format!("invalid UTC offset {utc_offset_hours}h")))?;
        Ok(Self { at, offset })
    }

    pub fn from_options(opts: &ResetOptions) -> Result<Self> {
        Self::new(opts.hour, opts.minute, opts.utc_offset_hours)
    }

    pub fn offset(&self) -> FixedOffset { self.offset }

    pub fn local_now(&self, now: Timestamp) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset)
    }

    /// Local date the reset belongs to, if `now` is at or past that day's
    /// reset instant.
    pub fn due_date(&self, now: Timestamp) -> Option<NaiveDate> {
        let local = self.local_now(now);
        (local.time() >= self.at).then(|| local.date_naive())
    }

    pub fn is_due(&self, now: Timestamp, marker: Option<NaiveDate>) -> bool {
        self.due_date(now).is_some_and(|today| marker != Some(today))
    }

    /// Zero all counters and arm the skip flag if today's reset has not run
    /// yet. Idempotent within a local day. Returns whether it fired.
    pub fn check_and_reset(&self, tables: &mut Tables, now: Timestamp) -> bool {
        let Some(today) = self.due_date(now) else {
            return false;
        };
        if tables.reset_marker() == Some(today) {
            return false;
        }

        let zeroed = tables.zero_snapshots();
        let vips = tables.zero_vip_snapshots();
        tables.set_reset_marker(today);
        tables.set_skip();

        logf!(
            "Daily reset for {today} (local {}): zeroed {zeroed} snapshots, {vips} VIP snapshots",
            self.local_now(now).format("%H:%M")
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn boundary_is_local_time() {
        let r = DailyReset::new(10, 2, -3).unwrap();
        // 13:01 UTC = 10:01 local.
        assert_eq!(r.due_date(Utc.with_ymd_and_hms(2025, 3, 1, 13, 1, 0).unwrap()), None);
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 13, 2, 0).unwrap();
        assert_eq!(r.due_date(at), NaiveDate::from_ymd_opt(2025, 3, 1));
        // 01:00 UTC next day is still the previous local date.
        let late = Utc.with_ymd_and_hms(2025, 3, 2, 1, 0, 0).unwrap();
        assert_eq!(r.due_date(late), NaiveDate::from_ymd_opt(2025, 3, 1));
    }

    #[test]
    fn rejects_bad_time() {
        assert!(DailyReset::new(24, 0, 0).is_err());
        assert!(DailyReset::new(10, 60, 0).is_err());
        assert!(DailyReset::new(10, 0, 30).is_err());
    }
}
