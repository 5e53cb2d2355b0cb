use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use collection_discovery::{LoadedSources, load_sources};

/// Config file path: `~/.config/collection-discovery/discovery.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("collection-discovery").join("discovery.toml"))
}

/// Catalog database path: `~/.local/share/collection-discovery/catalog.db`
pub fn database_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("could not determine data directory")?;
    let dir = base.join("collection-discovery");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create data directory: {}", dir.display()))?;
    Ok(dir.join("catalog.db"))
}

/// Resolve the config file to use, preferring an explicit path.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => config_path().context("could not determine config directory; pass --config"),
    }
}

/// Read and resolve the sources in `path`.
///
/// A document that is not valid TOML is an error; problems confined to
/// one host or organization are returned in `LoadedSources::errors`.
pub fn load(path: &Path) -> Result<LoadedSources> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    load_sources(&contents).with_context(|| format!("invalid config at {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[schedule]
frequency = { hours = 1 }
timeout = { minutes = 15 }

[environments.production.github."github.com".orgs.ansible-collections]
tag_patterns = ["v*"]

[environments.production.gitlab."gitlab.example.com".orgs.platform]
crawl_depth = 0
"#;

    #[test]
    fn config_path_ends_with_expected_name() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("collection-discovery/discovery.toml"));
        }
    }

    #[test]
    fn explicit_path_wins() {
        let path = resolve_config_path(Some(Path::new("/tmp/custom.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/custom.toml"));
    }

    #[test]
    fn load_reports_per_source_errors() {
        let dir = std::env::temp_dir().join(format!("collection-discovery-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("discovery.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let loaded = load(&path).unwrap();

        assert_eq!(loaded.sources.len(), 1);
        assert_eq!(
            loaded.sources[0].source_id(),
            "production:github:github.com:ansible-collections"
        );
        assert_eq!(loaded.errors.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load(Path::new("/nonexistent/discovery.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
