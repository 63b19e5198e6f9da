//! The canonical index: clusters of candidates keyed by normalized title.

use crate::model::{Candidate, CanonicalRecord, EpisodeSet, ExternalId, SourceId};

use super::{MergePolicy, NormalizedKey, Normalizer};

/// What happened to a candidate offered to the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeOutcome {
    /// No record was similar enough; a new one was created at this position
    Created(usize),
    /// Candidate was appended to an existing record
    Merged { index: usize, score: f64 },
    /// The same (source, locator) pair was already in the matching record
    Duplicate(usize),
}

impl MergeOutcome {
    /// Position of the affected record.
    pub fn index(&self) -> usize {
        match *self {
            MergeOutcome::Created(index)
            | MergeOutcome::Merged { index, .. }
            | MergeOutcome::Duplicate(index) => index,
        }
    }

    /// Whether the record changed.
    pub fn changed(&self) -> bool {
        !matches!(self, MergeOutcome::Duplicate(_))
    }
}

#[derive(Debug, Clone)]
struct Cluster {
    /// Key of the candidate that created the cluster
    key: NormalizedKey,
    record: CanonicalRecord,
}

/// Ordered set of canonical records.
///
/// Not synchronized on its own; the orchestrator wraps it in a mutex and
/// calls [`CanonicalIndex::merge_or_insert`] once per candidate so the
/// existence check and the insert happen under the same lock.
#[derive(Debug, Clone, Default)]
pub struct CanonicalIndex {
    clusters: Vec<Cluster>,
}

impl CanonicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a candidate into the best matching record, or insert a new one.
    ///
    /// The best score wins; on a tie the older record wins. The record that
    /// first claimed a key keeps its canonical title forever.
    pub fn merge_or_insert(
        &mut self,
        candidate: Candidate,
        normalizer: &Normalizer,
        policy: &MergePolicy,
    ) -> MergeOutcome {
        let key = normalizer.normalize(&candidate.display_title);

        let mut best: Option<(usize, f64)> = None;
        for (index, cluster) in self.clusters.iter().enumerate() {
            if let Some(score) = policy.matches(&key, &cluster.key)
                && best.is_none_or(|(_, best_score)| score > best_score)
            {
                best = Some((index, score));
            }
        }

        match best {
            Some((index, score)) => {
                if self.clusters[index].record.absorb(candidate) {
                    MergeOutcome::Merged { index, score }
                } else {
                    MergeOutcome::Duplicate(index)
                }
            }
            None => {
                self.clusters.push(Cluster {
                    key,
                    record: CanonicalRecord::new(candidate),
                });
                MergeOutcome::Created(self.clusters.len() - 1)
            }
        }
    }

    /// Insert a whole record (e.g. from the search cache) through the same
    /// merge path as fresh candidates.
    pub fn absorb_record(
        &mut self,
        record: CanonicalRecord,
        normalizer: &Normalizer,
        policy: &MergePolicy,
    ) -> Option<usize> {
        let CanonicalRecord {
            candidates,
            external_id,
            episodes,
            ..
        } = record;

        let mut position = None;
        for candidate in candidates {
            let outcome = self.merge_or_insert(candidate, normalizer, policy);
            position.get_or_insert(outcome.index());
        }

        if let Some(index) = position {
            let target = &mut self.clusters[index].record;
            if target.external_id.is_none() {
                target.external_id = external_id;
            }
            for (source_id, set) in episodes {
                target.episodes.entry(source_id).or_insert(set);
            }
        }
        position
    }

    pub fn get(&self, index: usize) -> Option<&CanonicalRecord> {
        self.clusters.get(index).map(|c| &c.record)
    }

    /// Locate a record by its canonical title and founding candidate.
    pub fn position_of(&self, record: &CanonicalRecord) -> Option<usize> {
        let founder = record.candidates.first()?;
        self.clusters.iter().position(|c| {
            c.record.canonical_title == record.canonical_title
                && c.record.candidates.first().is_some_and(|f| {
                    f.source_id == founder.source_id && f.locator == founder.locator
                })
        })
    }

    /// Attach an episode set to the record at `index`.
    pub fn set_episodes(&mut self, index: usize, source_id: SourceId, episodes: EpisodeSet) {
        if let Some(cluster) = self.clusters.get_mut(index) {
            cluster.record.episodes.insert(source_id, episodes);
        }
    }

    /// Record the external id of the record at `index`.
    pub fn set_external_id(&mut self, index: usize, external_id: ExternalId) {
        if let Some(cluster) = self.clusters.get_mut(index) {
            cluster.record.external_id = Some(external_id);
        }
    }

    /// Snapshot of all records in creation order.
    pub fn records(&self) -> Vec<CanonicalRecord> {
        self.clusters.iter().map(|c| c.record.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Drop the whole working set.
    pub fn clear(&mut self) {
        self.clusters.clear();
    }
}
