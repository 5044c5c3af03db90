//! Durable storage for regression memories.
//!
//! One SQLite table holds the records; an external-content FTS5 table
//! shadows `task_description`, `root_cause` and `prevention_rule` for
//! keyword search. All writes go through [`MemoryStore`], which keeps both in
//! step inside a single transaction.

use chrono::DateTime;
use chrono::Datelike;
use chrono::SecondsFormat;
use chrono::TimeDelta;
use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;

use crate::error::Result;

mod fts;
mod sqlite;

/// Handle over one memory database. Owned by the caller and passed by
/// reference to the matcher, tracker and lifecycle components.
#[derive(Debug)]
pub struct MemoryStore {
    conn: Connection,
    full_text: bool,
}

impl MemoryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        sqlite::init_db(&conn)?;
        let full_text = fts::init_index(&conn);
        Ok(Self { conn, full_text })
    }

    /// Whether the fts5 shadow index was created. A store without it still
    /// serves every operation except keyword ranking.
    pub fn has_full_text(&self) -> bool {
        self.full_text
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Which counter a reinforcement event bumps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Counter {
    Hits,
    TimesSaved,
}

impl Counter {
    fn column(self) -> &'static str {
        match self {
            Counter::Hits => "hit_count",
            Counter::TimesSaved => "times_saved",
        }
    }
}

const EARLIEST_TS: &str = "0000-01-01T00:00:00.000000Z";
const LATEST_TS: &str = "9999-12-31T23:59:59.999999Z";

// Fixed-width UTC so that lexical order in SQL equals chronological order.
// Years outside 0..=9999 gain a sign and would sort wrongly, so they clamp.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    match ts.year() {
        y if y < 0 => EARLIEST_TS.to_string(),
        y if y > 9999 => LATEST_TS.to_string(),
        _ => ts.to_rfc3339_opts(SecondsFormat::Micros, true),
    }
}

/// `now - age`, saturating at the representable bounds instead of panicking.
pub(crate) fn cutoff_before_now(age: TimeDelta) -> DateTime<Utc> {
    Utc::now().checked_sub_signed(age).unwrap_or(if age > TimeDelta::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

pub(crate) fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_lexically_even_at_the_extremes() {
        let now = format_ts(&Utc::now());
        let min = format_ts(&DateTime::<Utc>::MIN_UTC);
        let max = format_ts(&DateTime::<Utc>::MAX_UTC);
        assert_eq!(min, EARLIEST_TS);
        assert_eq!(max, LATEST_TS);
        assert!(min < now && now < max);
        assert_eq!(now.len(), min.len());
    }

    #[test]
    fn cutoff_saturates_instead_of_overflowing() {
        assert_eq!(
            cutoff_before_now(TimeDelta::days(200_000_000)),
            DateTime::<Utc>::MIN_UTC
        );
        assert_eq!(
            cutoff_before_now(TimeDelta::days(-200_000_000)),
            DateTime::<Utc>::MAX_UTC
        );
        assert!(cutoff_before_now(TimeDelta::days(1)) < Utc::now());
    }
}
