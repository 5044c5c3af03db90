use crate::error::Result;
use crate::store::Counter;
use crate::store::MemoryStore;
use crate::types::MemoryRecord;

/// Rough cost of repeating a known mistake, used for "time saved" estimates.
pub const MINUTES_SAVED_PER_SAVE: u64 = 15;

/// Records that a stored memory proved useful.
pub struct ReinforcementTracker<'a> {
    store: &'a MemoryStore,
}

impl<'a> ReinforcementTracker<'a> {
    pub fn new(store: &'a MemoryStore) -> Self {
        Self { store }
    }

    /// The memory was surfaced and reused. Call once per genuine reuse.
    pub fn increment_hit(&self, id: i64) -> Result<()> {
        self.store.increment_counter(id, Counter::Hits)?;
        tracing::debug!(id, "memory hit");
        Ok(())
    }

    /// The caller confirmed the memory prevented a repeat mistake.
    pub fn increment_times_saved(&self, id: i64) -> Result<()> {
        self.store.increment_counter(id, Counter::TimesSaved)?;
        tracing::debug!(id, "memory saved a repeat");
        Ok(())
    }
}

pub fn time_saved_minutes(record: &MemoryRecord) -> u64 {
    record.times_saved.saturating_mul(MINUTES_SAVED_PER_SAVE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewMemory;

    #[test]
    fn hits_increase_by_exactly_n() {
        let store = MemoryStore::open_in_memory().unwrap();
        let id = store.create(NewMemory::new("E", "")).unwrap();
        let tracker = ReinforcementTracker::new(&store);
        for n in [0u64, 1, 4] {
            let before = store.get(id).unwrap().hit_count;
            for _ in 0..n {
                tracker.increment_hit(id).unwrap();
            }
            assert_eq!(store.get(id).unwrap().hit_count, before + n);
        }
        assert_eq!(store.get(id).unwrap().times_saved, 0);
    }

    #[test]
    fn saves_are_tracked_separately() {
        let store = MemoryStore::open_in_memory().unwrap();
        let id = store.create(NewMemory::new("E", "")).unwrap();
        let tracker = ReinforcementTracker::new(&store);
        tracker.increment_times_saved(id).unwrap();
        tracker.increment_times_saved(id).unwrap();

        let rec = store.get(id).unwrap();
        assert_eq!(rec.times_saved, 2);
        assert_eq!(rec.hit_count, 0);
        assert_eq!(time_saved_minutes(&rec), 30);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = MemoryStore::open_in_memory().unwrap();
        let tracker = ReinforcementTracker::new(&store);
        assert!(tracker.increment_hit(7).unwrap_err().is_not_found());
        assert!(tracker.increment_times_saved(7).unwrap_err().is_not_found());
    }
}
