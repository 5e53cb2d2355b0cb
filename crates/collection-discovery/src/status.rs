use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SourceConfig;

/// Outcome of the most recent runs for one source. Lives in memory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub source_id: String,
    pub enabled: bool,
    /// Time of the last successful run.
    pub last_sync_time: Option<DateTime<Utc>>,
    pub collections_found: usize,
    /// Current total minus the previous total; equals the total after the
    /// first successful run.
    pub new_collections_delta: i64,
    pub repositories_found: usize,
    pub last_error: Option<String>,
}

impl SyncStatus {
    pub fn new(source: &SourceConfig) -> Self {
        Self {
            source_id: source.source_id(),
            enabled: source.enabled,
            last_sync_time: None,
            collections_found: 0,
            new_collections_delta: 0,
            repositories_found: 0,
            last_error: None,
        }
    }

    pub(crate) fn record_success(
        &mut self,
        at: DateTime<Utc>,
        collections: usize,
        repositories: usize,
    ) {
        let previous = if self.last_sync_time.is_some() {
            self.collections_found as i64
        } else {
            0
        };

        self.last_sync_time = Some(at);
        self.new_collections_delta = collections as i64 - previous;
        self.collections_found = collections;
        self.repositories_found = repositories;
        self.last_error = None;
    }

    /// A failed run never advances `last_sync_time`.
    pub(crate) fn record_failure(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}

/// Status plus the fields that identify its source, for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub env: String,
    pub provider: String,
    pub host_name: String,
    pub organization: String,
    #[serde(flatten)]
    pub status: SyncStatus,
}

impl SourceStatus {
    pub fn new(source: &SourceConfig, status: SyncStatus) -> Self {
        Self {
            env: source.env.clone(),
            provider: source.provider.to_string(),
            host_name: source.host_name.clone(),
            organization: source.organization.clone(),
            status,
        }
    }
}
