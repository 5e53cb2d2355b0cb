//! On-demand sync of a chosen subset of sources.

use std::fmt;
use std::str::FromStr;

use futures::future::join_all;
use serde::Serialize;
use tracing::info;

use crate::config::{ProviderKind, SourceConfig};
use crate::orchestrator::OrchestratorHandle;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("filter names an organization without a host")]
    OrganizationWithoutHost,

    #[error("filter names a host without a provider")]
    HostWithoutProvider,

    #[error("unknown provider '{0}' in filter")]
    UnknownProvider(String),

    #[error("empty filter")]
    Empty,
}

/// Selects sources by provider, then host, then organization. Each level
/// narrows the previous one; unset levels match anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFilter {
    provider: Option<ProviderKind>,
    host: Option<String>,
    organization: Option<String>,
}

impl SyncFilter {
    pub fn new(
        provider: Option<ProviderKind>,
        host: Option<String>,
        organization: Option<String>,
    ) -> Result<Self, FilterError> {
        if organization.is_some() && host.is_none() {
            return Err(FilterError::OrganizationWithoutHost);
        }
        if host.is_some() && provider.is_none() {
            return Err(FilterError::HostWithoutProvider);
        }
        Ok(Self {
            provider,
            host,
            organization,
        })
    }

    pub fn provider(kind: ProviderKind) -> Self {
        Self {
            provider: Some(kind),
            host: None,
            organization: None,
        }
    }

    pub fn matches(&self, source: &SourceConfig) -> bool {
        self.provider.is_none_or(|p| p == source.provider)
            && self.host.as_ref().is_none_or(|h| *h == source.host_name)
            && self
                .organization
                .as_ref()
                .is_none_or(|o| *o == source.organization)
    }
}

/// `provider[/host[/organization]]`
impl FromStr for SyncFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(FilterError::Empty);
        }

        let mut parts = s.splitn(3, '/');
        let provider = parts
            .next()
            .map(|p| {
                p.parse::<ProviderKind>()
                    .map_err(|_| FilterError::UnknownProvider(p.to_owned()))
            })
            .transpose()?;
        let host = parts.next().filter(|h| !h.is_empty()).map(str::to_owned);
        let organization = parts.next().filter(|o| !o.is_empty()).map(str::to_owned);

        Self::new(provider, host, organization)
    }
}

impl fmt::Display for SyncFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let levels: Vec<String> = [
            self.provider.map(|p| p.to_string()),
            self.host.clone(),
            self.organization.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();
        f.write_str(&levels.join("/"))
    }
}

/// True if any filter matches; an empty filter list matches everything.
pub fn matches_any(filters: &[SyncFilter], source: &SourceConfig) -> bool {
    filters.is_empty() || filters.iter().any(|f| f.matches(source))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSyncResult {
    pub source_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectiveSyncReport {
    pub outcome: SyncOutcome,
    pub results: Vec<SourceSyncResult>,
}

impl SelectiveSyncReport {
    fn from_results(results: Vec<SourceSyncResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let outcome = if results.is_empty() || succeeded == 0 {
            SyncOutcome::Failure
        } else if succeeded == results.len() {
            SyncOutcome::Success
        } else {
            SyncOutcome::Partial
        };
        Self { outcome, results }
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Run every matching source now, concurrently, and report each outcome.
///
/// Failures stay isolated to their source. No matching source at all is
/// reported as a failure.
pub async fn sync_selected(
    handles: &[OrchestratorHandle],
    filters: &[SyncFilter],
) -> SelectiveSyncReport {
    let selected: Vec<&OrchestratorHandle> = handles
        .iter()
        .filter(|h| matches_any(filters, h.source()))
        .collect();

    info!(
        selected = selected.len(),
        configured = handles.len(),
        "starting selective sync"
    );

    let results = join_all(selected.into_iter().map(|handle| async move {
        let source_id = handle.source().source_id();
        match handle.try_run().await {
            Ok(_) => SourceSyncResult {
                source_id,
                success: true,
                error: None,
            },
            Err(e) => SourceSyncResult {
                source_id,
                success: false,
                error: Some(e.to_string()),
            },
        }
    }))
    .await;

    let report = SelectiveSyncReport::from_results(results);
    info!(
        outcome = ?report.outcome,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "selective sync finished"
    );
    report
}
