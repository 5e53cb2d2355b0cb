mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use collection_discovery::{
    DiscoveryOrchestrator, LoadedSources, OrchestratorHandle, ProviderError, SourceConfig,
};
use collection_discovery_store::CatalogStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "collection-discovery")]
#[command(about = "Discover collections across GitHub and GitLab organizations")]
struct Cli {
    /// Config file (defaults to ~/.config/collection-discovery/discovery.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Catalog database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured sources and configuration problems
    Sources,
    /// Run discovery now for every source, or only those matching a filter
    Sync {
        /// provider[/host[/organization]]; repeatable, any match selects
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// Run every enabled source on its schedule until interrupted
    Serve,
    /// Show what the catalog database holds
    Catalog {
        /// Source id whose records to list
        #[arg(long)]
        source: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(explicit: Option<&PathBuf>) -> Result<Arc<CatalogStore>> {
    let path = match explicit {
        Some(path) => path.clone(),
        None => config::database_path()?,
    };
    let store = CatalogStore::open(&path)
        .with_context(|| format!("failed to open catalog at {}", path.display()))?;
    Ok(Arc::new(store))
}

/// One handle per source whose client could be built.
fn build_handles(
    sources: &[SourceConfig],
    cancel: &CancellationToken,
) -> (Vec<OrchestratorHandle>, Vec<(String, ProviderError)>) {
    let mut handles = Vec::with_capacity(sources.len());
    let mut failures = Vec::new();

    for source in sources {
        match collection_discovery_providers::build_client(source) {
            Ok(client) => handles.push(OrchestratorHandle::new(DiscoveryOrchestrator::new(
                source.clone(),
                client,
                cancel.child_token(),
            ))),
            Err(e) => failures.push((source.source_id(), e)),
        }
    }

    (handles, failures)
}

fn load_sources(cli: &Cli) -> Result<LoadedSources> {
    let path = config::resolve_config_path(cli.config.as_deref())?;
    config::load(&path)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Sources => {
            let loaded = load_sources(&cli)?;
            commands::sources::run(&loaded);
            Ok(ExitCode::SUCCESS)
        }
        Command::Sync { filters } => {
            let filters = commands::sync::parse_filters(filters)?;
            let loaded = load_sources(&cli)?;
            let cancel = CancellationToken::new();
            let (handles, failures) = build_handles(&loaded.sources, &cancel);
            commands::format::print_client_failures(&failures);

            let store = open_store(cli.database.as_ref())?;
            commands::sync::run(&handles, &filters, store).await
        }
        Command::Serve => {
            let loaded = load_sources(&cli)?;
            let cancel = CancellationToken::new();
            let (handles, failures) = build_handles(&loaded.sources, &cancel);
            commands::format::print_client_failures(&failures);

            let store = open_store(cli.database.as_ref())?;
            commands::serve::run(&handles, store, cancel).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Catalog { source } => {
            let store = open_store(cli.database.as_ref())?;
            commands::catalog::run(&store, source.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
