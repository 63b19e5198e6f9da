//! Normalization & merge engine.
//!
//! Pure functions that decide whether two candidates describe the same item,
//! plus the [`CanonicalIndex`] data structure the orchestrator mutates under
//! its lock.
//!
//! # Example
//!
//! ```ignore
//! use anisource::merge::{normalize, similarity, MergePolicy};
//!
//! let policy = MergePolicy::default();
//! let (a, b) = (normalize("Dan Da Dan"), normalize("Dandadan"));
//! assert!(policy.should_merge(similarity(&a, &b)));
//! ```

mod index;
mod normalize;

pub use index::{CanonicalIndex, MergeOutcome};
pub use normalize::{
    DEFAULT_SYNONYMS, NormalizedKey, Normalizer, SynonymError, SynonymTable, normalize, similarity,
};

/// Default similarity threshold (0-100) for merging candidates.
pub const DEFAULT_MERGE_THRESHOLD: u8 = 95;

/// When two normalized keys count as the same item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePolicy {
    /// Minimum similarity score, 0-100
    pub threshold: u8,
    /// Allow merging keys whose season/part numbers differ
    pub season_insensitive: bool,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MERGE_THRESHOLD,
            season_insensitive: false,
        }
    }
}

impl MergePolicy {
    /// Plain threshold comparison.
    pub fn should_merge(&self, score: f64) -> bool {
        score >= f64::from(self.threshold)
    }

    /// Score two keys and return the score if they should merge.
    ///
    /// Besides the threshold, keys must carry the same digit runs unless
    /// season-insensitive matching was requested: "X Season 2" and
    /// "X Season 3" stay apart even when the titles are long enough for the
    /// ratio alone to clear the threshold.
    pub fn matches(&self, a: &NormalizedKey, b: &NormalizedKey) -> Option<f64> {
        if !self.season_insensitive && a.digit_runs() != b.digit_runs() {
            return None;
        }
        let score = similarity(a, b);
        self.should_merge(score).then_some(score)
    }
}
