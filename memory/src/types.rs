use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

pub const DEFAULT_SEVERITY: u8 = 3;

/// A stored error pattern together with what fixed it and how to avoid it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub project_name: String,
    pub error_signature: String,
    pub error_category: String,
    pub file_paths: Vec<String>,
    pub libraries: Vec<String>,
    pub tags: Vec<String>,
    pub task_description: String,
    pub code_snippet: String,
    pub fix_snippet: String,
    pub root_cause: String,
    pub prevention_rule: String,
    pub negative_constraint: String,
    pub severity: u8,
    pub hit_count: u64,
    pub times_saved: u64,
    pub archived: bool,
    pub stale_check_at: Option<DateTime<Utc>>,
    pub source_error_id: Option<String>,
}

/// Caller-supplied fields for a new memory. The store assigns `id` and
/// `timestamp`; counters start at zero.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NewMemory {
    pub project_name: String,
    pub error_signature: String,
    pub error_category: String,
    pub file_paths: Vec<String>,
    pub libraries: Vec<String>,
    pub tags: Vec<String>,
    pub task_description: String,
    pub code_snippet: String,
    pub fix_snippet: String,
    pub root_cause: String,
    pub prevention_rule: String,
    pub negative_constraint: String,
    pub severity: u8,
    pub source_error_id: Option<String>,
}

impl Default for NewMemory {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            error_signature: String::new(),
            error_category: String::new(),
            file_paths: Vec::new(),
            libraries: Vec::new(),
            tags: Vec::new(),
            task_description: String::new(),
            code_snippet: String::new(),
            fix_snippet: String::new(),
            root_cause: String::new(),
            prevention_rule: String::new(),
            negative_constraint: String::new(),
            severity: DEFAULT_SEVERITY,
            source_error_id: None,
        }
    }
}

impl NewMemory {
    pub fn new(error_signature: impl Into<String>, root_cause: impl Into<String>) -> Self {
        Self {
            error_signature: error_signature.into(),
            root_cause: root_cause.into(),
            ..Self::default()
        }
    }
}

/// Partial edit of the indexed text fields. `None` leaves a field untouched.
#[derive(Clone, Debug, Default)]
pub struct MemoryTextPatch {
    pub task_description: Option<String>,
    pub root_cause: Option<String>,
    pub prevention_rule: Option<String>,
}

impl MemoryTextPatch {
    pub fn is_empty(&self) -> bool {
        self.task_description.is_none() && self.root_cause.is_none() && self.prevention_rule.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct SearchQuery {
    pub query: String,
    pub category: Option<String>,
    pub include_archived: bool,
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            category: None,
            include_archived: false,
            limit: 20,
        }
    }
}

/// Which strategy produced a match. Lower is more precise.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchLevel {
    ExactSignature = 1,
    TagOverlap = 2,
    FullText = 3,
}

impl MatchLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchCandidate {
    pub record: MemoryRecord,
    pub level: MatchLevel,
    /// Level-relative: 1.0 for exact matches, overlap count for tag matches,
    /// negated bm25 for full-text matches.
    pub score: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchOutcome {
    pub candidates: Vec<MatchCandidate>,
    pub levels_evaluated: Vec<MatchLevel>,
    /// Level 3 was wanted but the full-text index could not be queried, so
    /// the result set may be incomplete.
    pub full_text_skipped: bool,
}

/// The only fields that leave the originating project on promotion.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct PromotedMemory {
    pub root_cause: String,
    pub prevention_rule: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct StaleSweep {
    pub ids: Vec<i64>,
    pub checked_at: DateTime<Utc>,
}
