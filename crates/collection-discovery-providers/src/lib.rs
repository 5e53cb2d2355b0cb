pub mod content;
pub mod github;
pub mod gitlab;
mod http;
pub mod project;

use std::sync::Arc;

use collection_discovery::{ProviderClient, ProviderError, ProviderKind, SourceConfig};

pub use github::GitHubClient;
pub use gitlab::GitLabClient;

/// Client for the provider a source names.
pub fn build_client(source: &SourceConfig) -> Result<Arc<dyn ProviderClient>, ProviderError> {
    Ok(match source.provider {
        ProviderKind::Github => Arc::new(GitHubClient::new(source)?),
        ProviderKind::Gitlab => Arc::new(GitLabClient::new(source)?),
    })
}
