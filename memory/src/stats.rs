use std::collections::BTreeMap;

use chrono::TimeDelta;
use rusqlite::params;
use serde::Serialize;

use crate::error::Result;
use crate::reinforce::MINUTES_SAVED_PER_SAVE;
use crate::store::MemoryStore;
use crate::store::cutoff_before_now;
use crate::store::format_ts;

const TOP_MEMORIES: i64 = 5;
const TOP_CATEGORIES: i64 = 3;
const SIGNATURE_PREVIEW: usize = 80;
const ROOT_CAUSE_PREVIEW: usize = 100;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopMemory {
    pub id: i64,
    pub error_signature: String,
    pub error_category: String,
    pub hit_count: u64,
    pub times_saved: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemoryStats {
    pub total: u64,
    pub active: u64,
    pub archived: u64,
    pub total_hits: u64,
    pub total_saves: u64,
    /// Saves per hit, as a percentage with one decimal.
    pub save_rate: f64,
    pub top_memories: Vec<TopMemory>,
    pub categories: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemoryReport {
    pub period_days: u32,
    pub new_memories: u64,
    pub active: u64,
    pub archived: u64,
    pub total_hits: u64,
    pub total_saves: u64,
    pub save_rate: f64,
    pub top_memories: Vec<TopMemory>,
    pub top_categories: Vec<CategoryCount>,
    pub time_saved_minutes: u64,
    pub time_saved_hours: f64,
}

impl MemoryStore {
    pub fn stats(&self) -> Result<MemoryStats> {
        let (total, active, archived) = self.counts()?;
        let (total_hits, total_saves) = self.totals()?;
        let top_memories = self.top_memories(
            "SELECT id, error_signature, error_category, hit_count, times_saved, NULL
             FROM regression_memory
             WHERE archived = 0
             ORDER BY hit_count DESC, id
             LIMIT ?1",
        )?;
        let categories = self
            .category_counts(-1)?
            .into_iter()
            .map(|c| (c.category, c.count))
            .collect();
        Ok(MemoryStats {
            total,
            active,
            archived,
            total_hits,
            total_saves,
            save_rate: save_rate(total_hits, total_saves),
            top_memories,
            categories,
        })
    }

    /// Summary of the last `period_days`. Hit and save totals are lifetime
    /// values since individual hits are not timestamped.
    pub fn report(&self, period_days: u32) -> Result<MemoryReport> {
        let cutoff = format_ts(&cutoff_before_now(TimeDelta::days(i64::from(period_days))));
        let new_memories: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM regression_memory WHERE timestamp >= ?1",
            params![cutoff],
            |r| r.get(0),
        )?;
        let (_, active, archived) = self.counts()?;
        let (total_hits, total_saves) = self.totals()?;
        let top_memories = self.top_memories(
            "SELECT id, error_signature, error_category, hit_count, times_saved, root_cause
             FROM regression_memory
             WHERE archived = 0 AND hit_count > 0
             ORDER BY hit_count DESC, id
             LIMIT ?1",
        )?;
        let time_saved_minutes = total_saves.saturating_mul(MINUTES_SAVED_PER_SAVE);
        Ok(MemoryReport {
            period_days,
            new_memories: to_u64(new_memories),
            active,
            archived,
            total_hits,
            total_saves,
            save_rate: save_rate(total_hits, total_saves),
            top_memories,
            top_categories: self.category_counts(TOP_CATEGORIES)?,
            time_saved_minutes,
            time_saved_hours: round1(time_saved_minutes as f64 / 60.0),
        })
    }

    fn counts(&self) -> Result<(u64, u64, u64)> {
        let (total, active): (i64, i64) = self.conn().query_row(
            "SELECT COUNT(*), COALESCE(SUM(archived = 0), 0) FROM regression_memory",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok((to_u64(total), to_u64(active), to_u64(total - active)))
    }

    fn totals(&self) -> Result<(u64, u64)> {
        let (hits, saves): (i64, i64) = self.conn().query_row(
            "SELECT COALESCE(SUM(hit_count), 0), COALESCE(SUM(times_saved), 0)
             FROM regression_memory",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok((to_u64(hits), to_u64(saves)))
    }

    fn top_memories(&self, sql: &str) -> Result<Vec<TopMemory>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt
            .query_map(params![TOP_MEMORIES], |r| {
                let signature: String = r.get(1)?;
                let root_cause: Option<String> = r.get(5)?;
                Ok(TopMemory {
                    id: r.get(0)?,
                    error_signature: preview(&signature, SIGNATURE_PREVIEW),
                    error_category: r.get(2)?,
                    hit_count: to_u64(r.get(3)?),
                    times_saved: to_u64(r.get(4)?),
                    root_cause: root_cause.map(|c| preview(&c, ROOT_CAUSE_PREVIEW)),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // A negative limit means no limit in SQLite.
    fn category_counts(&self, limit: i64) -> Result<Vec<CategoryCount>> {
        let mut stmt = self.conn().prepare(
            "SELECT error_category, COUNT(*) AS n
             FROM regression_memory WHERE archived = 0
             GROUP BY error_category
             ORDER BY n DESC, error_category
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |r| {
                let category: String = r.get(0)?;
                Ok(CategoryCount {
                    category: if category.is_empty() {
                        "unknown".to_string()
                    } else {
                        category
                    },
                    count: to_u64(r.get(1)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn save_rate(hits: u64, saves: u64) -> f64 {
    if hits == 0 {
        return 0.0;
    }
    round1(saves as f64 / hits as f64 * 100.0)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn to_u64(v: i64) -> u64 {
    u64::try_from(v).unwrap_or_default()
}

fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
