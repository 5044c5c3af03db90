use chrono::DateTime;
use chrono::Utc;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use super::Counter;
use super::MemoryStore;
use super::format_ts;
use super::parse_ts;
use crate::error::MemoryError;
use crate::error::Result;
use crate::signature;
use crate::types::DEFAULT_SEVERITY;
use crate::types::MemoryRecord;
use crate::types::MemoryTextPatch;
use crate::types::NewMemory;

pub(super) fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA foreign_keys=ON;
        CREATE TABLE IF NOT EXISTS regression_memory (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            project_name TEXT NOT NULL DEFAULT '',
            error_signature TEXT NOT NULL DEFAULT '',
            error_category TEXT NOT NULL DEFAULT '',
            file_paths TEXT NOT NULL DEFAULT '[]',
            libraries TEXT NOT NULL DEFAULT '[]',
            tags TEXT NOT NULL DEFAULT '[]',
            task_description TEXT NOT NULL DEFAULT '',
            code_snippet TEXT NOT NULL DEFAULT '',
            fix_snippet TEXT NOT NULL DEFAULT '',
            root_cause TEXT NOT NULL DEFAULT '',
            prevention_rule TEXT NOT NULL DEFAULT '',
            negative_constraint TEXT NOT NULL DEFAULT '',
            severity INTEGER NOT NULL DEFAULT 3,
            hit_count INTEGER NOT NULL DEFAULT 0,
            times_saved INTEGER NOT NULL DEFAULT 0,
            archived INTEGER NOT NULL DEFAULT 0,
            stale_check_at TEXT,
            source_error_id TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_regression_signature ON regression_memory(error_signature);
        CREATE INDEX IF NOT EXISTS idx_regression_category ON regression_memory(error_category);
        CREATE INDEX IF NOT EXISTS idx_regression_archived ON regression_memory(archived);
        CREATE INDEX IF NOT EXISTS idx_regression_timestamp ON regression_memory(timestamp);
        "#,
    )?;
    Ok(())
}

/// Column list shared by every record query; the table is always aliased `rm`.
pub(super) const RECORD_COLUMNS: &str = "rm.id, rm.timestamp, rm.project_name, rm.error_signature,
    rm.error_category, rm.file_paths, rm.libraries, rm.tags,
    rm.task_description, rm.code_snippet, rm.fix_snippet,
    rm.root_cause, rm.prevention_rule, rm.negative_constraint,
    rm.severity, rm.hit_count, rm.times_saved, rm.archived,
    rm.stale_check_at, rm.source_error_id";

pub(super) fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    use rusqlite::types::Type;
    let conv_err = |idx: usize, msg: String| -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
        )
    };
    let parse_list = |idx: usize| -> rusqlite::Result<Vec<String>> {
        let raw: String = row.get(idx)?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    };

    let ts_s: String = row.get(1)?;
    let stale_s: Option<String> = row.get(18)?;

    Ok(MemoryRecord {
        id: row.get(0)?,
        timestamp: parse_ts(&ts_s).ok_or_else(|| conv_err(1, format!("invalid timestamp: {ts_s}")))?,
        project_name: row.get(2)?,
        error_signature: row.get(3)?,
        error_category: row.get(4)?,
        file_paths: parse_list(5)?,
        libraries: parse_list(6)?,
        tags: parse_list(7)?,
        task_description: row.get(8)?,
        code_snippet: row.get(9)?,
        fix_snippet: row.get(10)?,
        root_cause: row.get(11)?,
        prevention_rule: row.get(12)?,
        negative_constraint: row.get(13)?,
        severity: u8::try_from(row.get::<_, i64>(14)?).unwrap_or(DEFAULT_SEVERITY),
        hit_count: u64::try_from(row.get::<_, i64>(15)?).unwrap_or_default(),
        times_saved: u64::try_from(row.get::<_, i64>(16)?).unwrap_or_default(),
        archived: row.get(17)?,
        stale_check_at: match stale_s {
            Some(s) => Some(parse_ts(&s).ok_or_else(|| conv_err(18, format!("invalid stale_check_at: {s}")))?),
            None => None,
        },
        source_error_id: row.get(19)?,
    })
}

impl MemoryStore {
    /// Insert a new memory and its full-text shadow row atomically.
    ///
    /// The signature is re-normalized, which leaves already-normalized input
    /// unchanged. Duplicate signatures are kept as separate records.
    pub fn create(&self, new: NewMemory) -> Result<i64> {
        let signature = signature::normalize(&new.error_signature);
        let now = format_ts(&Utc::now());
        let file_paths = serde_json::to_string(&new.file_paths)?;
        let libraries = serde_json::to_string(&new.libraries)?;
        let tags = serde_json::to_string(&new.tags)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO regression_memory (
                    timestamp, project_name, error_signature, error_category,
                    file_paths, libraries, tags,
                    task_description, code_snippet, fix_snippet,
                    root_cause, prevention_rule, negative_constraint,
                    severity, source_error_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                now,
                new.project_name,
                signature,
                new.error_category,
                file_paths,
                libraries,
                tags,
                new.task_description,
                new.code_snippet,
                new.fix_snippet,
                new.root_cause,
                new.prevention_rule,
                new.negative_constraint,
                i64::from(new.severity),
                new.source_error_id.filter(|s| !s.is_empty()),
            ],
        )?;
        let id = tx.last_insert_rowid();
        if self.full_text {
            super::fts::index_insert(
                &tx,
                id,
                &new.task_description,
                &new.root_cause,
                &new.prevention_rule,
            )?;
        }
        tx.commit()?;

        tracing::info!(id, signature = %signature, "created regression memory");
        Ok(id)
    }

    pub fn get(&self, id: i64) -> Result<MemoryRecord> {
        self.find(id)?.ok_or(MemoryError::NotFound { id })
    }

    pub fn find(&self, id: i64) -> Result<Option<MemoryRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM regression_memory rm WHERE rm.id = ?1");
        let record = self
            .conn
            .query_row(&sql, params![id], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Most recent first. Archived records only appear when asked for.
    pub fn list(&self, include_archived: bool, limit: usize) -> Result<Vec<MemoryRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM regression_memory rm
             WHERE (?1 OR rm.archived = 0)
             ORDER BY rm.timestamp DESC, rm.id DESC
             LIMIT ?2"
        );
        self.query_records(&sql, params![include_archived, clamp_limit(limit)])
    }

    /// Active records whose stored signature equals `signature` exactly.
    pub fn find_by_signature(
        &self,
        signature: &str,
        project: Option<&str>,
    ) -> Result<Vec<MemoryRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM regression_memory rm
             WHERE rm.error_signature = ?1 AND rm.archived = 0
               AND (?2 IS NULL OR rm.project_name = ?2)
             ORDER BY rm.hit_count DESC, rm.timestamp DESC, rm.id DESC"
        );
        self.query_records(&sql, params![signature, project])
    }

    /// Every non-archived record, optionally scoped to one project.
    pub fn active_records(&self, project: Option<&str>) -> Result<Vec<MemoryRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM regression_memory rm
             WHERE rm.archived = 0 AND (?1 IS NULL OR rm.project_name = ?1)
             ORDER BY rm.timestamp DESC, rm.id DESC"
        );
        self.query_records(&sql, params![project])
    }

    /// Edit the indexed text fields and replace the shadow row in the same
    /// transaction, so the next keyword query sees the new text.
    pub fn update_text(&self, id: i64, patch: MemoryTextPatch) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let old: Option<(String, String, String)> = tx
            .query_row(
                "SELECT task_description, root_cause, prevention_rule
                 FROM regression_memory WHERE id = ?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((old_task, old_cause, old_rule)) = old else {
            return Err(MemoryError::NotFound { id });
        };
        if patch.is_empty() {
            return Ok(());
        }

        let task = patch.task_description.unwrap_or_else(|| old_task.clone());
        let cause = patch.root_cause.unwrap_or_else(|| old_cause.clone());
        let rule = patch.prevention_rule.unwrap_or_else(|| old_rule.clone());
        tx.execute(
            "UPDATE regression_memory
             SET task_description = ?2, root_cause = ?3, prevention_rule = ?4
             WHERE id = ?1",
            params![id, task, cause, rule],
        )?;
        if self.full_text {
            super::fts::index_delete(&tx, id, &old_task, &old_cause, &old_rule)?;
            super::fts::index_insert(&tx, id, &task, &cause, &rule)?;
        }
        tx.commit()?;
        tracing::debug!(id, "updated memory text");
        Ok(())
    }

    pub(crate) fn increment_counter(&self, id: i64, counter: Counter) -> Result<()> {
        let column = counter.column();
        let n = self.conn.execute(
            &format!("UPDATE regression_memory SET {column} = {column} + 1 WHERE id = ?1"),
            params![id],
        )?;
        if n == 0 {
            return Err(MemoryError::NotFound { id });
        }
        Ok(())
    }

    pub(crate) fn set_archived(&self, id: i64, archived: bool) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE regression_memory SET archived = ?2 WHERE id = ?1",
            params![id, archived],
        )?;
        if n == 0 {
            return Err(MemoryError::NotFound { id });
        }
        Ok(())
    }

    /// Stamp `stale_check_at` on every active, never-hit record created
    /// before `cutoff`, archiving them too when `archive` is set. Either
    /// every matching record is updated or none is. Returns the stamped ids
    /// in ascending order.
    pub(crate) fn stamp_stale(
        &self,
        cutoff: &DateTime<Utc>,
        checked_at: &DateTime<Utc>,
        archive: bool,
    ) -> Result<Vec<i64>> {
        let tx = self.conn.unchecked_transaction()?;
        let ids: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM regression_memory
                 WHERE archived = 0 AND hit_count = 0 AND timestamp < ?1
                 ORDER BY id",
            )?;
            stmt.query_map(params![format_ts(cutoff)], |r| r.get(0))?
                .collect::<rusqlite::Result<_>>()?
        };
        if !ids.is_empty() {
            let mut stmt = tx.prepare(if archive {
                "UPDATE regression_memory SET stale_check_at = ?2, archived = 1 WHERE id = ?1"
            } else {
                "UPDATE regression_memory SET stale_check_at = ?2 WHERE id = ?1"
            })?;
            let stamp = format_ts(checked_at);
            for id in &ids {
                stmt.execute(params![id, stamp])?;
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    pub(super) fn query_records<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<MemoryRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

pub(super) fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
