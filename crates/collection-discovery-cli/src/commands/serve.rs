use std::sync::Arc;

use anyhow::{Context, Result};
use collection_discovery::{OrchestratorHandle, TokioScheduler, status_snapshot};
use collection_discovery_store::CatalogStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Connect every source, let the scheduler drive runs until Ctrl-C, then
/// print the final status of each source as JSON.
pub async fn run(
    handles: &[OrchestratorHandle],
    store: Arc<CatalogStore>,
    cancel: CancellationToken,
) -> Result<()> {
    let scheduler = TokioScheduler::new(cancel.child_token());

    for handle in handles {
        if let Err(e) = handle.connect(store.clone(), &scheduler).await {
            warn!(source_id = %handle.source().source_id(), error = %e, "failed to connect source");
        }
    }

    info!(scheduled = scheduler.task_ids().len(), "serving; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("shutting down");
    cancel.cancel();
    scheduler.shutdown().await;

    let snapshot = status_snapshot(handles);
    let json = serde_json::to_string_pretty(&snapshot).context("failed to encode status")?;
    println!("{json}");

    Ok(())
}
