//! Mock metadata service for testing.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{ExternalMatch, MetadataError, MetadataService};
use crate::model::ExternalId;

/// Mock metadata service that returns a predefined answer.
pub struct MockMetadata {
    /// Match to return from lookup
    pub result: Option<ExternalMatch>,
    /// Error to return (takes precedence over result)
    pub error: Option<MetadataError>,
    /// Never answer
    pub hang: bool,
    calls: AtomicUsize,
}

impl MockMetadata {
    /// A mock that finds nothing.
    pub fn no_match() -> Self {
        Self {
            result: None,
            error: None,
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// A mock that always matches `external_id` with `confidence`.
    pub fn matching(external_id: &str, confidence: f32) -> Self {
        Self {
            result: Some(ExternalMatch {
                external_id: ExternalId::new(external_id),
                confidence,
                matched_title: "Mock Title".to_string(),
            }),
            ..Self::no_match()
        }
    }

    /// A mock that returns an error.
    pub fn with_error(error: MetadataError) -> Self {
        Self {
            error: Some(error),
            ..Self::no_match()
        }
    }

    /// A mock that accepts the call and never answers.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::no_match()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataService for MockMetadata {
    async fn lookup_by_title(
        &self,
        _title: &str,
        _min_confidence: f32,
    ) -> Result<Option<ExternalMatch>, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(ref err) = self.error {
            return Err(err.clone());
        }
        Ok(self.result.clone())
    }
}
