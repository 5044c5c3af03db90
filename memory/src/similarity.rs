//! Optional embedding-backed retrieval, behind a capability interface.

use crate::error::Result;

/// An external "find similar" service, such as a vector index over memory
/// embeddings. The engine never requires one to be present.
pub trait SimilaritySearch: Send + Sync {
    fn is_available(&self) -> bool;

    /// Memory ids with a similarity score, best first.
    fn find_similar(&self, text: &str, limit: usize) -> Result<Vec<(i64, f64)>>;
}

/// Stand-in used when no similarity backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSimilarity;

impl SimilaritySearch for NoSimilarity {
    fn is_available(&self) -> bool {
        false
    }

    fn find_similar(&self, _text: &str, _limit: usize) -> Result<Vec<(i64, f64)>> {
        Ok(Vec::new())
    }
}
