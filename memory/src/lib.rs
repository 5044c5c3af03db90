//! Regression memory: a per-project store of past errors, their root causes
//! and the rules that prevent them, with tiered retrieval for new errors.

pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod matcher;
pub mod reinforce;
pub mod signature;
pub mod similarity;
pub mod stats;
pub mod store;
pub mod types;

pub use error::MemoryError;
pub use error::Result;
pub use factory::open_project_store;
pub use lifecycle::MemoryLifecycleManager;
pub use matcher::MatchConfig;
pub use matcher::MatchQuery;
pub use matcher::TieredMatcher;
pub use reinforce::ReinforcementTracker;
pub use signature::SignatureNormalizer;
pub use signature::normalize;
pub use similarity::NoSimilarity;
pub use similarity::SimilaritySearch;
pub use stats::MemoryReport;
pub use stats::MemoryStats;
pub use store::MemoryStore;
pub use types::MatchCandidate;
pub use types::MatchLevel;
pub use types::MatchOutcome;
pub use types::MemoryRecord;
pub use types::MemoryTextPatch;
pub use types::NewMemory;
pub use types::PromotedMemory;
pub use types::SearchQuery;
pub use types::StaleSweep;
