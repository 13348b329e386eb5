// src/source/site.rs
//
// Adapter for the public ranking site:
//   /status                      routine "last update" per world
//   /guild.php?guild=..&world=.. guild ranking ("Jogador", "RAW no período")
//   /player?name=..              VIP page ("Raw XP no dia", "Online time")
//
// Times on the site are local ("Hoje 12:34"); they are converted to UTC
// here, once.

use std::sync::Arc;

use chrono::{Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use url::Url;

use super::{PlayerSource, RankingSource, Routine, StatusMap, StatusSource};
use crate::clock::Clock;
use crate::config::consts::{CLOCK_SKEW_SECS, COL_ONLINE, COL_PLAYER, COL_RAW, COL_RAW_TODAY};
use crate::config::options::AppOptions;
use crate::core::html::{extract_tables, Table};
use crate::core::net::HttpFetcher;
use crate::core::sanitize::{keep_label_chars, parse_count, parse_online_minutes};
use crate::error::{Error, Result};
use crate::model::{BatchRow, PlayerObservation, Timestamp};

pub struct Site {
    http: HttpFetcher,
    base: Url,
    offset: FixedOffset,
    clock: Arc<dyn Clock>,
}

impl Site {
    pub fn new(http: HttpFetcher, base_url: &str, offset: FixedOffset, clock: Arc<dyn Clock>) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| Error::config(format!("base_url {base_url:?}: {e}")))?;
        Ok(Self { http, base, offset, clock })
    }

    pub fn from_options(opts: &AppOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        let offset = crate::reset::DailyReset::from_options(&opts.reset)?.offset();
        Self::new(HttpFetcher::from_options(&opts.net), &opts.net.base_url, offset, clock)
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<String> {
        let mut url = self.base.join(path).map_err(|e| Error::config(format!("{path}: {e}")))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url.into())
    }
}

impl StatusSource for Site {
    fn fetch_status(&self) -> Result<StatusMap> {
        let body = self.http.get(&self.url("status", &[])?)?;
        parse_status(&body, self.clock.now(), self.offset)
    }
}

impl RankingSource for Site {
    fn fetch_ranking(&self, world: &str, guild: &str) -> Result<Vec<BatchRow>> {
        let body = self.http.get(&self.url("guild.php", &[("guild", guild), ("world", world)])?)?;
        parse_ranking(&body, guild)
    }
}

impl PlayerSource for Site {
    fn fetch_player(&self, subject: &str) -> Result<PlayerObservation> {
        let body = self.http.get(&self.url("player", &[("name", subject)])?)?;
        parse_player(&body, subject)
    }
}

/* ---------------- Parsers ---------------- */

/// First `HH:MM` in `s`.
fn find_hhmm(s: &str) -> Option<NaiveTime> {
    let b = s.as_bytes();
    (0..b.len().saturating_sub(4)).find_map(|i| {
        let w = &b[i..i + 5];
        let digits = [w[0], w[1], w[3], w[4]].iter().all(u8::is_ascii_digit);
        if digits && w[2] == b':' {
            NaiveTime::parse_from_str(&s[i..i + 5], "%H:%M").ok()
        } else {
            None
        }
    })
}

/// "Hoje HH:MM", "Ontem HH:MM" or "dd/mm/yyyy HH:MM", read as local time
/// at `offset` relative to `now`. A "Hoje" time later than `now` belongs to
/// the previous day.
pub fn parse_source_time(text: &str, now: Timestamp, offset: FixedOffset) -> Option<Timestamp> {
    let text = text.trim();
    let today = now.with_timezone(&offset).date_naive();

    let local: NaiveDateTime = if text.contains("Hoje") {
        // Just after local midnight the page can still show yesterday's
        // "Hoje 23:58".
        let local = today.and_time(find_hhmm(text)?);
        let skew = Duration::seconds(CLOCK_SKEW_SECS);
        if local - now.with_timezone(&offset).naive_local() > skew {
            local - Duration::days(1)
        } else {
            local
        }
    } else if text.contains("Ontem") {
        (today - Duration::days(1)).and_time(find_hhmm(text)?)
    } else {
        let date_part = text.split_whitespace().next()?;
        let date = NaiveDate::parse_from_str(date_part, "%d/%m/%Y").ok()?;
        date.and_time(find_hhmm(text)?)
    };
    offset.from_local_datetime(&local).single().map(|t| t.with_timezone(&Utc))
}

/// Status page: one table whose blank rows separate per-world sections.
/// A section starts with "<World> Status ..." and continues with
/// `routine | last update | ...` rows.
pub fn parse_status(doc: &str, now: Timestamp, offset: FixedOffset) -> Result<StatusMap> {
    let mut map = StatusMap::new();

    for table in extract_tables(doc) {
        let mut lines: Vec<&Vec<String>> = Vec::new();
        if table.headers.first().is_some_and(|h| h.contains("Status")) {
            lines.push(&table.headers);
        }
        lines.extend(table.rows.iter());

        for section in lines.split(|r| r.iter().all(|c| c.trim().is_empty())) {
            let Some((title, body)) = section.split_first() else { continue };
            let Some(first) = title.first() else { continue };
            let world = first.split("Status").next().unwrap_or_default().trim();
            if world.is_empty() {
                continue;
            }

            let mut routines = std::collections::BTreeMap::new();
            for row in body {
                let (Some(label), Some(when)) = (row.first(), row.get(1)) else { continue };
                let label = keep_label_chars(&label.replace("Rotina de coleta", ""));
                let (Some(routine), Some(t)) = (Routine::classify(&label), parse_source_time(when, now, offset)) else {
                    continue;
                };
                routines.insert(routine, t);
            }
            if !routines.is_empty() {
                map.insert(s!(world), routines);
            }
        }
    }

    if map.is_empty() {
        return Err(Error::parse("status page has no world sections"));
    }
    Ok(map)
}

fn find_table<'a>(tables: &'a [Table], columns: &[&str]) -> Option<&'a Table> {
    tables.iter().find(|t| columns.iter().all(|c| t.column(c).is_some()))
}

/// Guild ranking page -> rows tagged with `guild`. Rows whose value does
/// not parse are dropped with a warning.
pub fn parse_ranking(doc: &str, guild: &str) -> Result<Vec<BatchRow>> {
    let tables = extract_tables(doc);
    let table = find_table(&tables, &[COL_PLAYER, COL_RAW])
        .ok_or_else(|| Error::parse(format!("no ranking table for guild {guild}")))?;
    let (pc, vc) = (table.column(COL_PLAYER), table.column(COL_RAW));
    let (Some(pc), Some(vc)) = (pc, vc) else {
        return Err(Error::parse("ranking columns vanished"));
    };

    let mut rows = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let name = row.get(pc).map(|s| s.trim()).unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        match row.get(vc).and_then(|v| parse_count(v)) {
            Some(value) => rows.push(BatchRow::new(name, guild, value)),
            None => logw!("Ranking {guild}: unreadable value for {name}: {:?}", row.get(vc)),
        }
    }
    Ok(rows)
}

/// Player page -> today's exp and online minutes. A missing table counts
/// as zero; a page with no tables at all is an error.
pub fn parse_player(doc: &str, subject: &str) -> Result<PlayerObservation> {
    let tables = extract_tables(doc);
    if tables.is_empty() {
        return Err(Error::parse(format!("player page for {subject} has no tables")));
    }

    let exp_today = match find_table(&tables, &[COL_RAW_TODAY]).and_then(|t| t.first(COL_RAW_TODAY)) {
        Some(v) => parse_count(v).ok_or_else(|| Error::parse(format!("{subject}: bad exp {v:?}")))?,
        None => 0,
    };
    let online_minutes = match find_table(&tables, &[COL_ONLINE]).and_then(|t| t.first(COL_ONLINE)) {
        Some(v) => parse_online_minutes(v).ok_or_else(|| Error::parse(format!("{subject}: bad online time {v:?}")))?,
        None => 0,
    };

    Ok(PlayerObservation { subject: s!(subject), exp_today, online_minutes })
}
