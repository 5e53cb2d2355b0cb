//! Drives discovery runs for one source and publishes the results.
//!
//! A run lists every repository of the source, crawls them in fixed-size
//! batches, and submits each batch's new collection records as an
//! incremental update. Once every batch is done, one full reconciliation
//! carrying all collection and repository records of the run is submitted;
//! the sink retires anything it previously held for the source that is not
//! in that set.
//!
//! Failures are absorbed at the smallest granularity available: a bad file
//! or repository is dropped inside the crawler, a failed batch is logged and
//! skipped. Only listing repositories, cancellation, or a rejected
//! reconciliation fail the whole run.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::config::SourceConfig;
use crate::crawler::{Crawler, DiscoveryOptions};
use crate::entity::{CatalogRecord, synthesize_collection_record, synthesize_repository_record};
use crate::identity::dedupe;
use crate::provider::{ProviderClient, ProviderError};
use crate::repository::RepositoryInfo;
use crate::scheduler::{ScheduledTask, Scheduler, SchedulerError};
use crate::sink::{CatalogSink, SinkError};
use crate::status::{SourceStatus, SyncStatus};

/// Repositories crawled between two incremental submissions.
pub const DEFAULT_BATCH_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Disconnected,
    Connected,
    Running,
    Idle,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("source {0} is not connected to a catalog sink")]
    NotConnected(String),

    #[error("source {0} is already connected")]
    AlreadyConnected(String),

    #[error("a sync is already in progress for {0}")]
    Busy(String),

    #[error("failed to list repositories: {0}")]
    ListRepositories(ProviderError),

    #[error("full reconciliation failed: {0}")]
    Reconciliation(SinkError),

    #[error("run cancelled")]
    Cancelled,

    #[error("failed to schedule recurring run: {0}")]
    Schedule(SchedulerError),
}

/// Counts from one successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub repositories_scanned: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub collections: usize,
    pub repositories: usize,
}

struct RepositoryTally {
    repo: RepositoryInfo,
    identifiers: Vec<String>,
}

/// State that lives for exactly one run.
#[derive(Default)]
struct RunAccumulator {
    seen: HashSet<String>,
    names: HashSet<String>,
    collections: Vec<CatalogRecord>,
    repositories: BTreeMap<String, RepositoryTally>,
}

impl RunAccumulator {
    fn repository_records(&self, source: &SourceConfig) -> Vec<CatalogRecord> {
        let mut names = HashSet::new();
        self.repositories
            .values()
            .map(|tally| {
                let record = synthesize_repository_record(
                    &tally.repo,
                    source,
                    tally.identifiers.len(),
                    &tally.identifiers,
                );
                if !names.insert(record.name().to_owned()) {
                    warn!(
                        record = record.name(),
                        repository = %tally.repo.full_path,
                        "repository record name already used in this run"
                    );
                }
                record
            })
            .collect()
    }
}

/// Runs discovery for one `SourceConfig`.
pub struct DiscoveryOrchestrator {
    source: SourceConfig,
    crawler: Crawler,
    sink: Option<Arc<dyn CatalogSink>>,
    state: OrchestratorState,
    status: Arc<Mutex<SyncStatus>>,
    batch_size: usize,
    cancel: CancellationToken,
    span: tracing::Span,
}

impl DiscoveryOrchestrator {
    pub fn new(
        source: SourceConfig,
        client: Arc<dyn ProviderClient>,
        cancel: CancellationToken,
    ) -> Self {
        let span = source.span();
        let status = Arc::new(Mutex::new(SyncStatus::new(&source)));

        Self {
            crawler: Crawler::new(client, span.clone()),
            source,
            sink: None,
            state: OrchestratorState::Disconnected,
            status,
            batch_size: DEFAULT_BATCH_SIZE,
            cancel,
            span,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn status(&self) -> SyncStatus {
        self.lock_status().clone()
    }

    fn lock_status(&self) -> MutexGuard<'_, SyncStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach the catalog sink. Allowed once.
    pub fn connect(&mut self, sink: Arc<dyn CatalogSink>) -> Result<(), DiscoveryError> {
        if self.sink.is_some() {
            return Err(DiscoveryError::AlreadyConnected(self.source.source_id()));
        }
        self.sink = Some(sink);
        self.state = OrchestratorState::Connected;
        Ok(())
    }

    /// Perform one discovery run and record its outcome in the status.
    pub async fn run(&mut self) -> Result<RunSummary, DiscoveryError> {
        self.run_until(CancellationToken::new()).await
    }

    /// Like `run`, but the run is also abandoned at its next checkpoint once
    /// `stop` is cancelled. Used for invocations with a deadline.
    pub async fn run_until(&mut self, stop: CancellationToken) -> Result<RunSummary, DiscoveryError> {
        let Some(sink) = self.sink.clone() else {
            return Err(DiscoveryError::NotConnected(self.source.source_id()));
        };

        self.state = OrchestratorState::Running;
        let span = self.span.clone();
        let result = self
            .execute(sink.as_ref(), &stop)
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        match &result {
            Ok(summary) => {
                self.lock_status()
                    .record_success(Utc::now(), summary.collections, summary.repositories);
                self.state = OrchestratorState::Idle;
                info!(
                    collections = summary.collections,
                    repositories = summary.repositories,
                    failed_batches = summary.failed_batches,
                    "discovery run completed"
                );
            }
            Err(e) => {
                self.lock_status().record_failure(e.to_string());
                self.state = OrchestratorState::Failed;
                error!(error = %e, "discovery run failed");
            }
        }

        result
    }

    fn cancelled(&self, stop: &CancellationToken) -> bool {
        self.cancel.is_cancelled() || stop.is_cancelled()
    }

    async fn execute(
        &self,
        sink: &dyn CatalogSink,
        stop: &CancellationToken,
    ) -> Result<RunSummary, DiscoveryError> {
        let source_id = self.source.source_id();
        let opts = self.source.discovery_options();

        info!("starting discovery run");
        let repos = self
            .crawler
            .client()
            .list_repositories()
            .await
            .map_err(DiscoveryError::ListRepositories)?;
        info!(repositories = repos.len(), batch_size = self.batch_size, "listed repositories");

        let mut run = RunAccumulator::default();
        let mut summary = RunSummary {
            repositories_scanned: repos.len(),
            ..Default::default()
        };

        for (index, batch) in repos.chunks(self.batch_size).enumerate() {
            if self.cancelled(stop) {
                warn!(batch = index, "cancellation requested; abandoning run");
                return Err(DiscoveryError::Cancelled);
            }

            summary.batches += 1;
            if let Err(error) = self
                .process_batch(index, batch, &opts, &mut run, sink, &source_id)
                .await
            {
                summary.failed_batches += 1;
                warn!(batch = index, %error, "batch failed; continuing with next batch");
            }
        }

        if self.cancelled(stop) {
            warn!("cancellation requested; skipping full reconciliation");
            return Err(DiscoveryError::Cancelled);
        }

        let repository_records = run.repository_records(&self.source);
        summary.collections = run.collections.len();
        summary.repositories = repository_records.len();

        let mut entities = run.collections;
        entities.extend(repository_records);

        sink.apply_full(&source_id, &entities)
            .await
            .map_err(DiscoveryError::Reconciliation)?;
        debug!(records = entities.len(), "submitted full reconciliation");

        Ok(summary)
    }

    async fn process_batch(
        &self,
        index: usize,
        batch: &[RepositoryInfo],
        opts: &DiscoveryOptions,
        run: &mut RunAccumulator,
        sink: &dyn CatalogSink,
        source_id: &str,
    ) -> Result<(), SinkError> {
        let occurrences = self.crawler.discover_in_repos(batch, opts).await;
        let found = occurrences.len();
        let unique = dedupe(occurrences, &self.source, &mut run.seen);

        let mut added = Vec::with_capacity(unique.len());
        for occurrence in &unique {
            let location = self.crawler.client().build_source_location(
                &occurrence.repository,
                &occurrence.git_ref,
                &occurrence.path,
            );
            let record = synthesize_collection_record(occurrence, &self.source, &location);
            if !run.names.insert(record.name().to_owned()) {
                warn!(
                    record = record.name(),
                    repository = %occurrence.repository.full_path,
                    git_ref = %occurrence.git_ref,
                    path = %occurrence.path,
                    "collection record name already used in this run; the sink keeps only one"
                );
            }

            run.repositories
                .entry(occurrence.repository.full_path.clone())
                .or_insert_with(|| RepositoryTally {
                    repo: occurrence.repository.clone(),
                    identifiers: Vec::new(),
                })
                .identifiers
                .push(record.name().to_owned());

            added.push(record);
        }
        run.collections.extend(added.iter().cloned());

        info!(
            batch = index,
            repositories = batch.len(),
            found,
            new_collections = added.len(),
            "processed batch"
        );

        if !added.is_empty() {
            sink.apply_delta(source_id, &added).await?;
        }
        Ok(())
    }
}

/// Shared handle to an orchestrator.
///
/// The inner lock doubles as the in-flight guard: a trigger that arrives
/// while a run holds it is rejected with `DiscoveryError::Busy`. Status can
/// be read at any time without waiting for the run.
#[derive(Clone)]
pub struct OrchestratorHandle {
    inner: Arc<tokio::sync::Mutex<DiscoveryOrchestrator>>,
    source: Arc<SourceConfig>,
    status: Arc<Mutex<SyncStatus>>,
}

impl OrchestratorHandle {
    pub fn new(orchestrator: DiscoveryOrchestrator) -> Self {
        Self {
            source: Arc::new(orchestrator.source.clone()),
            status: Arc::clone(&orchestrator.status),
            inner: Arc::new(tokio::sync::Mutex::new(orchestrator)),
        }
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub fn status(&self) -> SyncStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn source_status(&self) -> SourceStatus {
        SourceStatus::new(&self.source, self.status())
    }

    pub async fn state(&self) -> OrchestratorState {
        self.inner.lock().await.state()
    }

    /// Attach the sink without scheduling, for on-demand runs only.
    pub async fn attach(&self, sink: Arc<dyn CatalogSink>) -> Result<(), DiscoveryError> {
        self.inner.lock().await.connect(sink)
    }

    /// Attach the sink and register the recurring run with `scheduler`.
    /// Disabled sources are connected but never scheduled.
    pub async fn connect(
        &self,
        sink: Arc<dyn CatalogSink>,
        scheduler: &dyn Scheduler,
    ) -> Result<(), DiscoveryError> {
        self.attach(sink).await?;

        if !self.source.enabled {
            info!(source_id = %self.source.source_id(), "source disabled; not scheduling");
            return Ok(());
        }

        scheduler
            .schedule_recurring(self.scheduled_task())
            .map_err(DiscoveryError::Schedule)
    }

    /// Run now unless a run is already in flight.
    pub async fn try_run(&self) -> Result<RunSummary, DiscoveryError> {
        self.try_run_until(CancellationToken::new()).await
    }

    /// `try_run` that stops at the next checkpoint once `stop` is cancelled.
    pub async fn try_run_until(
        &self,
        stop: CancellationToken,
    ) -> Result<RunSummary, DiscoveryError> {
        let mut orchestrator = self
            .inner
            .try_lock()
            .map_err(|_| DiscoveryError::Busy(self.source.source_id()))?;
        orchestrator.run_until(stop).await
    }

    fn scheduled_task(&self) -> ScheduledTask {
        let handle = self.clone();
        let schedule = self.source.schedule;

        ScheduledTask {
            id: self.source.task_id(),
            frequency: schedule.frequency,
            timeout: schedule.timeout,
            initial_delay: schedule.initial_delay,
            run: Arc::new(move |stop| {
                let handle = handle.clone();
                Box::pin(async move {
                    match handle.try_run_until(stop).await {
                        Ok(_) => {}
                        Err(DiscoveryError::Busy(source_id)) => {
                            debug!(%source_id, "previous run still in progress; skipping tick");
                        }
                        Err(error) => {
                            warn!(
                                source_id = %handle.source.source_id(),
                                %error,
                                "scheduled discovery run failed"
                            );
                        }
                    }
                })
            }),
        }
    }
}

/// Current status of every source, in handle order.
pub fn status_snapshot(handles: &[OrchestratorHandle]) -> Vec<SourceStatus> {
    handles.iter().map(OrchestratorHandle::source_status).collect()
}
