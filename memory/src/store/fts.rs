//! FTS5 shadow index over the free-text fields, plus keyword search.

use rusqlite::Connection;
use rusqlite::params;

use super::MemoryStore;
use super::sqlite::RECORD_COLUMNS;
use super::sqlite::clamp_limit;
use crate::error::MemoryError;
use crate::error::Result;
use crate::types::MemoryRecord;
use crate::types::SearchQuery;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "not", "of",
    "on", "or", "that", "the", "this", "to", "was", "with",
];

/// Create the external-content index. Returns false when the SQLite build
/// has no fts5 module; the store then runs without keyword ranking.
///
/// An index created over a table that already holds records (first open of
/// an older database, or after the index was dropped) is filled right away.
pub(super) fn init_index(conn: &Connection) -> bool {
    match create_index(conn) {
        Ok(Some(rows)) => {
            tracing::info!(rows, "built full-text index over existing records");
            true
        }
        Ok(None) => true,
        Err(e) => {
            tracing::warn!("full-text index unavailable: {e}");
            false
        }
    }
}

// Some(rows) when a new index had to be populated.
fn create_index(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let existed: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = 'regression_memory_fts')",
        [],
        |r| r.get(0),
    )?;
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS regression_memory_fts USING fts5(
            task_description, root_cause, prevention_rule,
            content='regression_memory', content_rowid='id'
        );",
    )?;
    if existed {
        return Ok(None);
    }
    let rows: i64 = conn.query_row("SELECT COUNT(*) FROM regression_memory", [], |r| r.get(0))?;
    if rows == 0 {
        return Ok(None);
    }
    conn.execute(
        "INSERT INTO regression_memory_fts(regression_memory_fts) VALUES ('rebuild')",
        [],
    )?;
    Ok(Some(rows))
}

pub(super) fn index_insert(
    conn: &Connection,
    id: i64,
    task: &str,
    cause: &str,
    rule: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO regression_memory_fts(rowid, task_description, root_cause, prevention_rule)
         VALUES (?1, ?2, ?3, ?4)",
        params![id, task, cause, rule],
    )
    .map_err(MemoryError::from_index)?;
    Ok(())
}

// External-content tables need the previously indexed values to drop a row.
pub(super) fn index_delete(
    conn: &Connection,
    id: i64,
    task: &str,
    cause: &str,
    rule: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO regression_memory_fts(regression_memory_fts, rowid, task_description, root_cause, prevention_rule)
         VALUES ('delete', ?1, ?2, ?3, ?4)",
        params![id, task, cause, rule],
    )
    .map_err(MemoryError::from_index)?;
    Ok(())
}

/// Turn free text into an fts5 expression: quoted alphanumeric terms joined
/// with OR. Returns `None` when nothing searchable is left.
pub(crate) fn fts_query(text: &str) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let word = word.to_lowercase();
        if STOPWORDS.contains(&word.as_str()) || terms.contains(&word) {
            continue;
        }
        terms.push(word);
    }
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

fn like_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

impl MemoryStore {
    /// Rank active records by bm25 against `text`. Scores are negated bm25,
    /// so larger means more relevant.
    ///
    /// Fails with [`MemoryError::IndexUnavailable`] when the index is
    /// missing; callers treat that as "skip", not as a hard failure.
    pub fn full_text_search(
        &self,
        text: &str,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(MemoryRecord, f64)>> {
        if !self.full_text {
            return Err(MemoryError::IndexUnavailable);
        }
        let Some(query) = fts_query(text) else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {RECORD_COLUMNS}, bm25(regression_memory_fts) AS fts_score
             FROM regression_memory_fts
             JOIN regression_memory rm ON rm.id = regression_memory_fts.rowid
             WHERE regression_memory_fts MATCH ?1 AND rm.archived = 0
               AND (?2 IS NULL OR rm.project_name = ?2)
             ORDER BY fts_score
             LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(MemoryError::from_index)?;
        let rows = stmt
            .query_map(params![query, project, clamp_limit(limit)], |row| {
                let record = super::sqlite::row_to_record(row)?;
                let bm25: f64 = row.get(20)?;
                Ok((record, -bm25))
            })
            .map_err(MemoryError::from_index)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(MemoryError::from_index)?;
        Ok(rows)
    }

    /// Keyword search with an optional category filter.
    ///
    /// An empty query lists by recency. Without a usable index the keywords
    /// are matched with `LIKE` over the three text fields instead.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryRecord>> {
        let text = query.query.trim();
        let category = query.category.as_deref().filter(|c| !c.is_empty());
        let limit = clamp_limit(query.limit);

        if text.is_empty() {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM regression_memory rm
                 WHERE (?1 OR rm.archived = 0) AND (?2 IS NULL OR rm.error_category = ?2)
                 ORDER BY rm.timestamp DESC, rm.id DESC
                 LIMIT ?3"
            );
            return self.query_records(&sql, params![query.include_archived, category, limit]);
        }

        if self.full_text
            && let Some(fts) = fts_query(text)
        {
            let sql = format!(
                "SELECT {RECORD_COLUMNS}
                 FROM regression_memory_fts
                 JOIN regression_memory rm ON rm.id = regression_memory_fts.rowid
                 WHERE regression_memory_fts MATCH ?1
                   AND (?2 OR rm.archived = 0) AND (?3 IS NULL OR rm.error_category = ?3)
                 ORDER BY bm25(regression_memory_fts)
                 LIMIT ?4"
            );
            match self.query_records(&sql, params![fts, query.include_archived, category, limit]) {
                Ok(rows) => return Ok(rows),
                Err(MemoryError::Storage(e)) => match MemoryError::from_index(e) {
                    MemoryError::IndexUnavailable => {
                        tracing::warn!("full-text index missing; falling back to LIKE search");
                    }
                    other => return Err(other),
                },
                Err(e) => return Err(e),
            }
        }

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM regression_memory rm
             WHERE (rm.task_description LIKE ?1 ESCAPE '\\'
                    OR rm.root_cause LIKE ?1 ESCAPE '\\'
                    OR rm.prevention_rule LIKE ?1 ESCAPE '\\')
               AND (?2 OR rm.archived = 0) AND (?3 IS NULL OR rm.error_category = ?3)
             ORDER BY rm.hit_count DESC, rm.timestamp DESC
             LIMIT ?4"
        );
        self.query_records(
            &sql,
            params![like_pattern(text), query.include_archived, category, limit],
        )
    }

    /// Re-derive the whole shadow index from the content table.
    pub fn rebuild_index(&self) -> Result<()> {
        if !self.full_text {
            return Err(MemoryError::IndexUnavailable);
        }
        self.conn
            .execute(
                "INSERT INTO regression_memory_fts(regression_memory_fts) VALUES ('rebuild')",
                [],
            )
            .map_err(MemoryError::from_index)?;
        tracing::info!("rebuilt full-text index");
        Ok(())
    }
}
