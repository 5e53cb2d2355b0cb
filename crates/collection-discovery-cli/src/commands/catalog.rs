use anyhow::{Context, Result};
use collection_discovery_store::CatalogStore;

use super::format;

/// Without a source: one line per source held in the store. With a source:
/// its stored records.
pub fn run(store: &CatalogStore, source: Option<&str>) -> Result<()> {
    match source {
        Some(source_id) => {
            let records = store
                .records(source_id)
                .with_context(|| format!("failed to read records for {source_id}"))?;
            if records.is_empty() {
                println!("No records stored for {source_id}.");
                return Ok(());
            }
            format::print_records(&records)
        }
        None => {
            let ids = store.source_ids().context("failed to list stored sources")?;
            if ids.is_empty() {
                println!("Catalog is empty.");
                return Ok(());
            }

            let mut rows = Vec::with_capacity(ids.len());
            for id in ids {
                let count = store.record_count(Some(&id))?;
                let last = store.last_reconciliation(&id)?;
                rows.push((id, count, last));
            }
            format::print_catalog_summary(&rows);
            Ok(())
        }
    }
}
