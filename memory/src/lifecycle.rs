//! Archival, promotion to the shared scope, and staleness sweeps.
//!
//! Records move between two visibility states, active and archived; nothing
//! is ever deleted. Staleness is an annotation on top of either state.

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use crate::error::MemoryError;
use crate::error::Result;
use crate::store::MemoryStore;
use crate::store::cutoff_before_now;
use crate::types::PromotedMemory;
use crate::types::StaleSweep;

pub const DEFAULT_STALE_DAYS: i64 = 60;

pub struct MemoryLifecycleManager<'a> {
    store: &'a MemoryStore,
}

impl<'a> MemoryLifecycleManager<'a> {
    pub fn new(store: &'a MemoryStore) -> Self {
        Self { store }
    }

    pub fn archive(&self, id: i64) -> Result<()> {
        self.store.set_archived(id, true)?;
        tracing::info!(id, "archived memory");
        Ok(())
    }

    pub fn unarchive(&self, id: i64) -> Result<()> {
        self.store.set_archived(id, false)?;
        tracing::info!(id, "unarchived memory");
        Ok(())
    }

    /// Extract the shareable part of a memory. Only memories that matched at
    /// least once qualify, and only the root cause and prevention rule leave
    /// the project: no error text, snippets or paths.
    pub fn promote_for_sharing(&self, id: i64) -> Result<PromotedMemory> {
        let record = self.store.get(id)?;
        if record.hit_count < 1 {
            return Err(MemoryError::NotEligible {
                id,
                reason: "memory has no hits yet".to_string(),
            });
        }
        tracing::info!(id, "promoted memory for sharing");
        Ok(PromotedMemory {
            root_cause: record.root_cause,
            prevention_rule: record.prevention_rule,
        })
    }

    /// Annotate active, never-hit memories older than `threshold`. Does not
    /// archive anything. Thresholds beyond the calendar saturate.
    pub fn mark_stale(&self, threshold: Duration) -> Result<StaleSweep> {
        self.mark_stale_before(cutoff_before_now(threshold))
    }

    pub fn mark_stale_before(&self, cutoff: DateTime<Utc>) -> Result<StaleSweep> {
        self.sweep(cutoff, false)
    }

    /// Sweep and archive what the sweep flagged, in one transaction.
    pub fn archive_stale(&self, threshold: Duration) -> Result<StaleSweep> {
        self.sweep(cutoff_before_now(threshold), true)
    }

    fn sweep(&self, cutoff: DateTime<Utc>, archive: bool) -> Result<StaleSweep> {
        let checked_at = Utc::now();
        let ids = self.store.stamp_stale(&cutoff, &checked_at, archive)?;
        tracing::info!(count = ids.len(), cutoff = %cutoff, archive, "stale sweep");
        Ok(StaleSweep { ids, checked_at })
    }
}
