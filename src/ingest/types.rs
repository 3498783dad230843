// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::LocationSeries;

/// External collaborator delivering raw samples per location.
///
/// Implementations return whatever the backend has for `[start, end)`;
/// gaps are expected and filled by the caller.
#[async_trait::async_trait]
pub trait SampleSource: Send + Sync {
    async fn fetch(
        &self,
        sensor_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocationSeries>>;

    fn name(&self) -> &'static str;
}
