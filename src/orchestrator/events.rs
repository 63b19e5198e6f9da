//! Events and outcomes produced by a search.

use crate::model::{CanonicalRecord, SourceId};

/// A source that failed during a search or episode listing.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source_id: SourceId,
    /// Error text, truncated for display
    pub reason: String,
}

/// Incremental progress of a search.
#[derive(Debug, Clone)]
pub enum SearchEvent {
    /// A record was created or extended; carries a snapshot of it
    Record {
        /// Position of the record in the working set
        index: usize,
        record: CanonicalRecord,
        created: bool,
    },
    /// One source failed; its candidates count as zero
    SourceFailed(SourceFailure),
    /// The search is complete
    Finished(SearchSummary),
}

/// Final summary of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSummary {
    pub records: usize,
    pub failed_sources: usize,
    /// Served from the search cache without contacting any source
    pub from_cache: bool,
}

/// A drained search.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Records in creation order
    pub records: Vec<CanonicalRecord>,
    pub failures: Vec<SourceFailure>,
    pub from_cache: bool,
}

impl SearchOutcome {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A record with every available episode list attached.
#[derive(Debug, Clone)]
pub struct EpisodeListing {
    pub record: CanonicalRecord,
    pub failures: Vec<SourceFailure>,
}
