use std::time::Duration;

use anyhow::{Context, Result};
use collection_discovery::{
    ProviderError, SelectiveSyncReport, SourceConfig, SourceStatus, SyncOutcome,
};
use collection_discovery_store::{Reconciliation, StoredRecord};

const MAX_ID_WIDTH: usize = 60;
const LINE_BUDGET: usize = 100;

pub fn print_sources(sources: &[SourceConfig]) {
    if sources.is_empty() {
        println!("No sources configured.");
        return;
    }

    let id_width = sources
        .iter()
        .map(|s| s.source_id().chars().count())
        .max()
        .unwrap_or(0)
        .min(MAX_ID_WIDTH);

    for source in sources {
        let id = truncate(&source.source_id(), id_width);
        let state = if source.enabled { "" } else { " (disabled)" };
        println!(
            "  {:<width$}  every {}{}",
            id,
            format_duration(source.schedule.frequency),
            state,
            width = id_width
        );

        let refs = describe_refs(source);
        if !refs.is_empty() {
            println!("  {:<width$}  {}", "", refs, width = id_width);
        }
    }

    println!("\n{} sources", sources.len());
}

pub fn print_client_failures(failures: &[(String, ProviderError)]) {
    for (source_id, error) in failures {
        eprintln!("warning: [{source_id}] {error}");
    }
}

pub fn print_report(report: &SelectiveSyncReport) {
    for result in &report.results {
        match &result.error {
            None => println!("  ok      {}", result.source_id),
            Some(error) => println!("  failed  {}: {}", result.source_id, error),
        }
    }

    println!(
        "{}: {} succeeded, {} failed",
        outcome_label(report.outcome),
        report.succeeded(),
        report.failed()
    );
}

pub fn print_status_table(statuses: &[SourceStatus]) {
    if statuses.is_empty() {
        return;
    }

    let id_width = statuses
        .iter()
        .map(|s| s.status.source_id.chars().count())
        .max()
        .unwrap_or(0)
        .min(MAX_ID_WIDTH);
    let error_budget = LINE_BUDGET.saturating_sub(2 + id_width + 2 + 25 + 2);

    for entry in statuses {
        let status = &entry.status;
        let id = truncate(&status.source_id, id_width);
        let last = status
            .last_sync_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_owned());
        let counts = format!(
            "{} collections ({:+}), {} repos",
            status.collections_found, status.new_collections_delta, status.repositories_found
        );

        println!("  {:<width$}  {:<19}  {}", id, last, counts, width = id_width);

        if let Some(error) = &status.last_error {
            println!(
                "  {:<width$}  error: {}",
                "",
                truncate(error, error_budget),
                width = id_width
            );
        }
    }
}

pub fn print_catalog_summary(rows: &[(String, usize, Option<Reconciliation>)]) {
    let id_width = rows
        .iter()
        .map(|(id, _, _)| id.chars().count())
        .max()
        .unwrap_or(0)
        .min(MAX_ID_WIDTH);

    for (id, count, last) in rows {
        let id = truncate(id, id_width);
        let last = last
            .as_ref()
            .map(|r| r.applied_at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never reconciled".to_owned());
        println!("  {:<width$}  {:>6} records  {}", id, count, last, width = id_width);
    }

    println!("\n{} sources", rows.len());
}

pub fn print_records(records: &[StoredRecord]) -> Result<()> {
    let name_width = records
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .min(MAX_ID_WIDTH);
    let title_budget = LINE_BUDGET.saturating_sub(2 + 10 + 2 + name_width + 2);

    for record in records {
        let body = record
            .json()
            .with_context(|| format!("stored record {} is not valid JSON", record.name))?;
        let title = record_title(&body);

        println!(
            "  {:<10}  {:<width$}  {}",
            record.kind,
            truncate(&record.name, name_width),
            truncate(title, title_budget),
            width = name_width
        );
    }

    println!("\n{} records", records.len());
    Ok(())
}

fn record_title(body: &serde_json::Value) -> &str {
    body["metadata"]["title"].as_str().unwrap_or("")
}

fn outcome_label(outcome: SyncOutcome) -> &'static str {
    match outcome {
        SyncOutcome::Success => "Success",
        SyncOutcome::Partial => "Partial",
        SyncOutcome::Failure => "Failure",
    }
}

fn describe_refs(source: &SourceConfig) -> String {
    let mut parts = Vec::new();
    if !source.branches.is_empty() {
        parts.push(format!("branches: {}", source.branches.join(", ")));
    }
    if !source.tag_patterns.is_empty() {
        let patterns: Vec<String> = source.tag_patterns.iter().map(ToString::to_string).collect();
        parts.push(format!("tags: {}", patterns.join(", ")));
    }
    if !source.path_filters.is_empty() {
        parts.push(format!("paths: {}", source.path_filters.join(", ")));
    }
    parts.join("; ")
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{truncated}…")
    }
}
