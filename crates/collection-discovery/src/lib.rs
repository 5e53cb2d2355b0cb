pub mod config;
pub mod crawler;
pub mod descriptor;
pub mod entity;
pub mod filter;
pub mod identity;
pub mod orchestrator;
pub mod path;
pub mod pattern;
pub mod provider;
pub mod repository;
pub mod scheduler;
pub mod sink;
pub mod status;

pub use config::{
    load_sources, ConfigError, LoadedSources, ProviderKind, Schedule, SourceConfig, Token,
};
pub use crawler::{Crawler, DiscoveryOptions};
pub use descriptor::{parse_descriptor, validate, DescriptorError, DescriptorMetadata, ValidationError};
pub use entity::{
    sanitize_identifier, synthesize_collection_record, synthesize_repository_record,
    CatalogRecord, RecordKind,
};
pub use filter::{
    sync_selected, FilterError, SelectiveSyncReport, SourceSyncResult, SyncFilter, SyncOutcome,
};
pub use identity::{dedupe, identity_of, CollectionIdentity};
pub use orchestrator::{
    status_snapshot, DiscoveryError, DiscoveryOrchestrator, OrchestratorHandle, OrchestratorState,
    RunSummary, DEFAULT_BATCH_SIZE,
};
pub use pattern::TagPattern;
pub use provider::{ProviderClient, ProviderError};
pub use repository::{DescriptorOccurrence, DirectoryEntry, EntryKind, RefType, RepositoryInfo};
pub use scheduler::{ScheduledTask, Scheduler, SchedulerError, TaskFn, TokioScheduler};
pub use sink::{CatalogSink, SinkError};
pub use status::{SourceStatus, SyncStatus};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
