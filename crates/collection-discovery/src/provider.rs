use std::sync::Arc;

use crate::config::ProviderKind;
use crate::repository::{DirectoryEntry, RepositoryInfo};

/// Errors that can occur when talking to a source-control provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Read-only access to the repositories of one organization on one host.
///
/// Implementations do not retry; errors propagate to the caller, which
/// decides at what granularity to recover.
#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Every repository visible to the configured organization.
    async fn list_repositories(&self) -> Result<Vec<RepositoryInfo>, ProviderError>;

    async fn list_branches(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ProviderError>;

    async fn list_tags(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ProviderError>;

    /// List entries of `path` at `git_ref`. An empty path is the repository root.
    async fn list_directory(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, ProviderError>;

    async fn read_file(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        path: &str,
    ) -> Result<String, ProviderError>;

    /// Locator for display and provenance only.
    fn build_source_location(&self, repo: &RepositoryInfo, git_ref: &str, path: &str) -> String;
}

#[async_trait::async_trait]
impl<T: ProviderClient + ?Sized> ProviderClient for Arc<T> {
    fn provider(&self) -> ProviderKind {
        (**self).provider()
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryInfo>, ProviderError> {
        (**self).list_repositories().await
    }

    async fn list_branches(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ProviderError> {
        (**self).list_branches(repo).await
    }

    async fn list_tags(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ProviderError> {
        (**self).list_tags(repo).await
    }

    async fn list_directory(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, ProviderError> {
        (**self).list_directory(repo, git_ref, path).await
    }

    async fn read_file(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        path: &str,
    ) -> Result<String, ProviderError> {
        (**self).read_file(repo, git_ref, path).await
    }

    fn build_source_location(&self, repo: &RepositoryInfo, git_ref: &str, path: &str) -> String {
        (**self).build_source_location(repo, git_ref, path)
    }
}
