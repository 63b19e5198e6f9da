//! Stream resolution by racing every source that lists the episode.
//!
//! Each candidate source gets its own task. The first task to produce a
//! playable resource claims the result slot with a compare-and-swap and is
//! the only one allowed to deliver; the caller returns as soon as it does.
//! Losing tasks run to completion in the background and their results are
//! dropped.
//!
//! Resolved locators usually carry short-lived tokens, so nothing here
//! touches the TTL cache.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::model::{CanonicalRecord, PlayableResource, SourceId};
use crate::source::{MAX_DIAGNOSTIC_LEN, SourceRegistry, guarded, truncate};

/// Default per-source resolve timeout.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of a resolve race.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved {
        source_id: SourceId,
        resource: PlayableResource,
    },
    /// No source produced a stream; one reason per attempt
    NotFound { reasons: Vec<String> },
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }

    pub fn resource(&self) -> Option<&PlayableResource> {
        match self {
            Resolution::Resolved { resource, .. } => Some(resource),
            Resolution::NotFound { .. } => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Resolved { source_id, resource } => {
                write!(f, "{} (via {})", resource.locator, source_id)
            }
            Resolution::NotFound { .. } => f.write_str("no playable stream found"),
        }
    }
}

/// What one racing task reports back.
enum Attempt {
    Won {
        source_id: SourceId,
        resource: PlayableResource,
    },
    Lost {
        source_id: SourceId,
        reason: String,
    },
}

/// Races sources for a playable stream.
#[derive(Debug, Clone)]
pub struct StreamResolver {
    registry: SourceRegistry,
    timeout: Duration,
}

impl StreamResolver {
    pub fn new(registry: SourceRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Resolve episode `episode_index` of `record` to a playable stream.
    ///
    /// Only sources whose episode list for the record has an entry at that
    /// index take part. Must be called from within a tokio runtime.
    pub async fn resolve_playable(
        &self,
        record: &CanonicalRecord,
        episode_index: usize,
    ) -> Resolution {
        let mut reasons = Vec::new();
        let mut attempts = Vec::new();

        for (source_id, episodes) in &record.episodes {
            let Some(episode) = episodes.get(episode_index) else {
                continue;
            };
            match self.registry.get(source_id) {
                Some(source) => attempts.push((source_id.clone(), source, episode.locator.to_string())),
                None => reasons.push(format!("{}: source is not registered", source_id)),
            }
        }

        if attempts.is_empty() {
            tracing::debug!(
                title = %record.canonical_title,
                episode_index,
                "No source lists this episode"
            );
            reasons.push(format!("no source lists episode {}", episode_index + 1));
            return Resolution::NotFound { reasons };
        }

        let claimed = Arc::new(AtomicBool::new(false));
        // Room for every attempt, so no task ever blocks on send.
        let (tx, mut rx) = mpsc::channel(attempts.len());
        let timeout = self.timeout;

        for (source_id, source, locator) in attempts {
            let claimed = Arc::clone(&claimed);
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = guarded(timeout, async move { source.resolve(&locator).await }).await;
                let attempt = match result {
                    Ok(Some(resource)) => {
                        if claimed
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_err()
                        {
                            tracing::debug!(source = %source_id, "Resolved after the race was won");
                            return;
                        }
                        Attempt::Won {
                            source_id,
                            resource,
                        }
                    }
                    Ok(None) => Attempt::Lost {
                        source_id,
                        reason: "no playable stream".to_string(),
                    },
                    Err(e) => Attempt::Lost {
                        source_id,
                        reason: e.diagnostic(),
                    },
                };
                // The receiver is gone once a winner was delivered.
                let _ = tx.send(attempt).await;
            });
        }
        drop(tx);

        while let Some(attempt) = rx.recv().await {
            match attempt {
                Attempt::Won {
                    source_id,
                    resource,
                } => {
                    tracing::info!(
                        title = %record.canonical_title,
                        episode = episode_index + 1,
                        source = %source_id,
                        "Resolved stream"
                    );
                    return Resolution::Resolved {
                        source_id,
                        resource,
                    };
                }
                Attempt::Lost { source_id, reason } => {
                    tracing::debug!(source = %source_id, "Resolve attempt failed: {}", reason);
                    reasons.push(truncate(&format!("{}: {}", source_id, reason), MAX_DIAGNOSTIC_LEN));
                }
            }
        }

        tracing::warn!(
            title = %record.canonical_title,
            episode = episode_index + 1,
            attempts = reasons.len(),
            "No playable stream found"
        );
        Resolution::NotFound { reasons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceError;
    use crate::source::mocks::MockSource;
    use crate::test_utils::{record_listing, registry_of};
    use std::time::Instant;

    fn resolver(sources: Vec<Arc<MockSource>>, timeout: Duration) -> StreamResolver {
        StreamResolver::new(registry_of(sources), timeout)
    }

    #[tokio::test]
    async fn test_fastest_source_wins() {
        let slow = Arc::new(MockSource::new("slow").resolving("https://cdn/slow.m3u8", Duration::from_millis(300)));
        let fast = Arc::new(MockSource::new("fast").resolving("https://cdn/fast.m3u8", Duration::from_millis(100)));
        let slowest = Arc::new(
            MockSource::new("slowest").resolving("https://cdn/slowest.m3u8", Duration::from_millis(500)),
        );
        let record = record_listing(&["slow", "fast", "slowest"], 3);
        let resolver = resolver(vec![slow, fast.clone(), slowest], Duration::from_secs(2));

        let started = Instant::now();
        let resolution = resolver.resolve_playable(&record, 1).await;
        let elapsed = started.elapsed();

        assert_eq!(
            resolution,
            Resolution::Resolved {
                source_id: SourceId::from("fast"),
                resource: PlayableResource::new("https://cdn/fast.m3u8"),
            }
        );
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(290), "took {:?}", elapsed);
        assert_eq!(fast.calls(&fast.resolve_calls), 1);
    }

    #[tokio::test]
    async fn test_all_sources_fail() {
        let alpha = Arc::new(MockSource::new("alpha").failing_resolve(
            SourceError::Network("403 Forbidden".into()),
            Duration::from_millis(10),
        ));
        let beta = Arc::new(MockSource::new("beta"));
        let gamma = Arc::new(MockSource::new("gamma").failing_resolve(
            SourceError::Parse("player iframe missing".into()),
            Duration::from_millis(30),
        ));
        let record = record_listing(&["alpha", "beta", "gamma"], 2);
        let resolver = resolver(vec![alpha, beta, gamma.clone()], Duration::from_secs(1));

        let started = Instant::now();
        let resolution = resolver.resolve_playable(&record, 0).await;

        let Resolution::NotFound { reasons } = &resolution else {
            panic!("expected NotFound, got {:?}", resolution);
        };
        assert!(started.elapsed() < Duration::from_millis(900));
        assert_eq!(reasons.len(), 3);
        assert!(reasons.iter().any(|r| r.starts_with("alpha:") && r.contains("403")));
        assert!(reasons.iter().any(|r| r.starts_with("beta:")));
        assert!(reasons.iter().any(|r| r.starts_with("gamma:") && r.contains("iframe")));
        assert_eq!(gamma.calls(&gamma.resolve_calls), 1);
        assert_eq!(resolution.to_string(), "no playable stream found");
    }

    #[tokio::test]
    async fn test_empty_answer_does_not_win() {
        let nothing = Arc::new(MockSource::new("nothing"));
        let late = Arc::new(MockSource::new("late").resolving("https://cdn/late.m3u8", Duration::from_millis(50)));
        let record = record_listing(&["nothing", "late"], 1);
        let resolver = resolver(vec![nothing, late], Duration::from_secs(1));

        let resolution = resolver.resolve_playable(&record, 0).await;
        assert_eq!(resolution.resource().map(|r| r.locator.as_str()), Some("https://cdn/late.m3u8"));
    }

    #[tokio::test]
    async fn test_timed_out_source_is_a_reason() {
        let stuck = Arc::new(MockSource::new("stuck").resolving("https://cdn/never.m3u8", Duration::from_secs(5)));
        let record = record_listing(&["stuck"], 1);
        let resolver = resolver(vec![stuck], Duration::from_millis(50));

        let started = Instant::now();
        let resolution = resolver.resolve_playable(&record, 0).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        let Resolution::NotFound { reasons } = resolution else {
            panic!("expected NotFound");
        };
        assert!(reasons[0].contains("Timed out"));
    }

    #[tokio::test]
    async fn test_only_sources_listing_the_episode_race() {
        let short = Arc::new(MockSource::new("short").resolving("https://cdn/short.m3u8", Duration::ZERO));
        let long = Arc::new(MockSource::new("long").resolving("https://cdn/long.m3u8", Duration::from_millis(20)));
        let mut record = record_listing(&["long"], 12);
        record.episodes.extend(record_listing(&["short"], 3).episodes);
        let resolver = resolver(vec![short.clone(), long], Duration::from_secs(1));

        let resolution = resolver.resolve_playable(&record, 10).await;

        assert_eq!(resolution.resource().unwrap().locator, "https://cdn/long.m3u8");
        assert_eq!(short.calls(&short.resolve_calls), 0);
    }

    #[tokio::test]
    async fn test_episode_out_of_range() {
        let record = record_listing(&["alpha"], 2);
        let resolver = resolver(vec![Arc::new(MockSource::new("alpha"))], Duration::from_secs(1));

        let resolution = resolver.resolve_playable(&record, 7).await;
        assert!(!resolution.is_resolved());
    }
}
