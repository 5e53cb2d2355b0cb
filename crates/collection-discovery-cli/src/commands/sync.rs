use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use collection_discovery::{
    CatalogSink, OrchestratorHandle, SyncFilter, SyncOutcome, status_snapshot, sync_selected,
};
use collection_discovery_store::CatalogStore;

use super::format;

pub fn parse_filters(raw: &[String]) -> Result<Vec<SyncFilter>> {
    raw.iter()
        .map(|f| {
            f.parse::<SyncFilter>()
                .with_context(|| format!("invalid filter '{f}'"))
        })
        .collect()
}

/// Exit code for a selective sync: 0 on success, 2 when only some
/// sources succeeded, 1 when none did.
pub fn exit_code(outcome: SyncOutcome) -> ExitCode {
    match outcome {
        SyncOutcome::Success => ExitCode::SUCCESS,
        SyncOutcome::Partial => ExitCode::from(2),
        SyncOutcome::Failure => ExitCode::FAILURE,
    }
}

/// Attach `sink` to every handle for on-demand runs.
pub async fn attach_all(handles: &[OrchestratorHandle], sink: Arc<dyn CatalogSink>) -> Result<()> {
    for handle in handles {
        handle
            .attach(sink.clone())
            .await
            .with_context(|| format!("failed to attach catalog to {}", handle.source().source_id()))?;
    }
    Ok(())
}

/// Run matching sources once against the store and print the results.
pub async fn run(
    handles: &[OrchestratorHandle],
    filters: &[SyncFilter],
    store: Arc<CatalogStore>,
) -> Result<ExitCode> {
    attach_all(handles, store).await?;

    if filters.is_empty() {
        println!("Syncing {} sources...", handles.len());
    } else {
        let shown: Vec<String> = filters.iter().map(ToString::to_string).collect();
        println!("Syncing sources matching {}...", shown.join(", "));
    }

    let report = sync_selected(handles, filters).await;

    format::print_report(&report);
    println!();
    format::print_status_table(&status_snapshot(handles));

    Ok(exit_code(report.outcome))
}
