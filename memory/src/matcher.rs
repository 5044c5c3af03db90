//! Three-level retrieval of stored memories for a new error.
//!
//! Level 1 looks for the exact normalized signature, level 2 scores tag,
//! library and category overlap, level 3 asks the full-text index. Levels
//! accumulate in that order and a record keeps the first (most precise)
//! level it was found at.

use std::collections::BTreeSet;
use std::collections::HashSet;

use crate::error::MemoryError;
use crate::error::Result;
use crate::signature;
use crate::similarity::NoSimilarity;
use crate::similarity::SimilaritySearch;
use crate::store::MemoryStore;
use crate::types::MatchCandidate;
use crate::types::MatchLevel;
use crate::types::MatchOutcome;
use crate::types::MemoryRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchConfig {
    /// Stop after level 1 when it found anything.
    pub short_circuit: bool,
    /// Level 3 only runs while fewer than this many candidates are known.
    pub min_results: usize,
    /// Default cap on returned candidates.
    pub limit: usize,
    /// How much of the error text feeds the full-text query when the caller
    /// gives no separate context.
    pub fts_query_chars: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            short_circuit: true,
            min_results: 1,
            limit: 5,
            fts_query_chars: 200,
        }
    }
}

impl MatchConfig {
    pub fn with_short_circuit(mut self, short_circuit: bool) -> Self {
        self.short_circuit = short_circuit;
        self
    }

    pub fn with_min_results(mut self, min_results: usize) -> Self {
        self.min_results = min_results;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchQuery {
    /// Raw error text; normalized for level 1.
    pub text: String,
    pub tags: Vec<String>,
    pub libraries: Vec<String>,
    /// Files involved in the new error. One stored path containing the other
    /// counts as shared.
    pub file_paths: Vec<String>,
    pub category: Option<String>,
    pub project_name: Option<String>,
    /// Search terms for level 3. Falls back to the head of `text`.
    pub context: Option<String>,
    /// Overrides [`MatchConfig::limit`].
    pub limit: Option<usize>,
}

impl MatchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    fn has_tags(&self) -> bool {
        !self.tags.is_empty()
            || !self.libraries.is_empty()
            || !self.file_paths.is_empty()
            || self.category.as_deref().is_some_and(|c| !c.is_empty())
    }
}

pub struct TieredMatcher<'a> {
    store: &'a MemoryStore,
    config: MatchConfig,
    similarity: Box<dyn SimilaritySearch + 'a>,
}

impl<'a> TieredMatcher<'a> {
    pub fn new(store: &'a MemoryStore) -> Self {
        Self::with_config(store, MatchConfig::default())
    }

    pub fn with_config(store: &'a MemoryStore, config: MatchConfig) -> Self {
        Self {
            store,
            config,
            similarity: Box::new(NoSimilarity),
        }
    }

    pub fn with_similarity(mut self, similarity: impl SimilaritySearch + 'a) -> Self {
        self.similarity = Box::new(similarity);
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Run the level cascade and return deduplicated candidates, most
    /// precise level first. Archived records never appear.
    pub fn find_matches(&self, query: &MatchQuery) -> Result<MatchOutcome> {
        let limit = query.limit.unwrap_or(self.config.limit);
        let project = query.project_name.as_deref().filter(|p| !p.is_empty());
        let mut acc = Accumulator::default();

        acc.levels.push(MatchLevel::ExactSignature);
        let signature = signature::normalize(&query.text);
        if !signature.is_empty() {
            for record in self.store.find_by_signature(&signature, project)? {
                acc.push(record, MatchLevel::ExactSignature, 1.0);
            }
        }
        tracing::debug!(signature = %signature, found = acc.candidates.len(), "level 1 exact match");

        if self.config.short_circuit && !acc.candidates.is_empty() {
            return Ok(acc.finish(limit));
        }

        if query.has_tags() {
            acc.levels.push(MatchLevel::TagOverlap);
            let before = acc.candidates.len();
            for (overlap, record) in self.tag_matches(query, project)? {
                acc.push(record, MatchLevel::TagOverlap, overlap as f64);
            }
            tracing::debug!(found = acc.candidates.len() - before, "level 2 tag overlap");
        }

        if acc.candidates.len() < self.config.min_results {
            acc.levels.push(MatchLevel::FullText);
            let terms = match query.context.as_deref().filter(|c| !c.trim().is_empty()) {
                Some(context) => context.to_string(),
                None => query.text.chars().take(self.config.fts_query_chars).collect(),
            };
            let fetch = limit.saturating_add(acc.candidates.len());
            match self.store.full_text_search(&terms, project, fetch) {
                Ok(rows) => {
                    let before = acc.candidates.len();
                    for (record, score) in rows {
                        acc.push(record, MatchLevel::FullText, score);
                    }
                    tracing::debug!(found = acc.candidates.len() - before, "level 3 full-text");
                }
                Err(MemoryError::IndexUnavailable) => {
                    tracing::warn!("full-text index unavailable; level 3 skipped");
                    acc.full_text_skipped = true;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(acc.finish(limit))
    }

    /// Ask the optional similarity backend and hydrate its ids into active
    /// records. Empty when no backend is available.
    pub fn find_similar(&self, text: &str, limit: usize) -> Result<Vec<(MemoryRecord, f64)>> {
        if !self.similarity.is_available() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for (id, score) in self.similarity.find_similar(text, limit)? {
            if let Some(record) = self.store.find(id)?
                && !record.archived
            {
                out.push((record, score));
            }
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    fn tag_matches(
        &self,
        query: &MatchQuery,
        project: Option<&str>,
    ) -> Result<Vec<(usize, MemoryRecord)>> {
        let mut scored: Vec<(usize, MemoryRecord)> = self
            .store
            .active_records(project)?
            .into_iter()
            .filter_map(|record| {
                let overlap = tag_overlap(query, &record);
                (overlap > 0).then_some((overlap, record))
            })
            .collect();
        scored.sort_by(|(oa, a), (ob, b)| {
            ob.cmp(oa)
                .then_with(|| b.hit_count.cmp(&a.hit_count))
                .then_with(|| b.timestamp.cmp(&a.timestamp))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(scored)
    }
}

/// Shared labels plus shared files between `query` and `record`.
///
/// Tags, libraries and the category form one case-insensitive label set on
/// each side, so a query tag `react` meets a stored library `react`. Each
/// query path that contains, or is contained in, a stored path adds one.
fn tag_overlap(query: &MatchQuery, record: &MemoryRecord) -> usize {
    fn labels<'a>(
        tags: &'a [String],
        libraries: &'a [String],
        category: Option<&'a str>,
    ) -> BTreeSet<String> {
        tags.iter()
            .chain(libraries)
            .map(String::as_str)
            .chain(category)
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect()
    }

    let wanted = labels(&query.tags, &query.libraries, query.category.as_deref());
    let have = labels(
        &record.tags,
        &record.libraries,
        Some(record.error_category.as_str()),
    );
    let shared_labels = wanted.intersection(&have).count();

    let wanted_files: BTreeSet<&str> = query
        .file_paths
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    let shared_files = wanted_files
        .iter()
        .filter(|fp| {
            record
                .file_paths
                .iter()
                .map(|mf| mf.trim())
                .filter(|mf| !mf.is_empty())
                .any(|mf| mf.contains(*fp) || fp.contains(mf))
        })
        .count();

    shared_labels + shared_files
}

#[derive(Default)]
struct Accumulator {
    candidates: Vec<MatchCandidate>,
    seen: HashSet<i64>,
    levels: Vec<MatchLevel>,
    full_text_skipped: bool,
}

impl Accumulator {
    fn push(&mut self, record: MemoryRecord, level: MatchLevel, score: f64) {
        if record.archived || !self.seen.insert(record.id) {
            return;
        }
        self.candidates.push(MatchCandidate {
            record,
            level,
            score,
        });
    }

    fn finish(mut self, limit: usize) -> MatchOutcome {
        self.candidates.truncate(limit);
        MatchOutcome {
            candidates: self.candidates,
            levels_evaluated: self.levels,
            full_text_skipped: self.full_text_skipped,
        }
    }
}
