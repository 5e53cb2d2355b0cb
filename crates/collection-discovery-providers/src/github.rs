use base64::Engine;
use tracing::debug;

use collection_discovery::{
    DirectoryEntry, ProviderClient, ProviderError, ProviderKind, RepositoryInfo, SourceConfig,
};

use crate::content::{ContentEntry, ContentResponse, NamedRef, RepoResponse};
use crate::http::{ApiClient, AuthScheme};

/// GitHub REST v3 client scoped to one organization (or user) on one host.
pub struct GitHubClient {
    api: ApiClient,
    host_name: String,
    organization: String,
}

impl GitHubClient {
    pub fn new(source: &SourceConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            api: ApiClient::new(&source.api_base_url(), source.token.clone(), AuthScheme::Bearer)?,
            host_name: source.host_name.clone(),
            organization: source.organization.clone(),
        })
    }

    fn repo_url<'a>(
        &self,
        repo: &'a RepositoryInfo,
        rest: impl IntoIterator<Item = &'a str>,
    ) -> reqwest::Url {
        let segments = std::iter::once("repos")
            .chain(repo.full_path.split('/'))
            .chain(rest);
        self.api.url(segments)
    }

    fn contents_url(&self, repo: &RepositoryInfo, git_ref: &str, path: &str) -> reqwest::Url {
        let mut url = self.repo_url(
            repo,
            std::iter::once("contents").chain(path.split('/').filter(|s| !s.is_empty())),
        );
        url.query_pairs_mut().append_pair("ref", git_ref);
        url
    }

    async fn list_owner_repos(&self, owner_kind: &str) -> Result<Vec<RepoResponse>, ProviderError> {
        let url = self
            .api
            .url([owner_kind, self.organization.as_str(), "repos"]);
        self.api.get_paged(url).await
    }

    async fn list_refs(
        &self,
        repo: &RepositoryInfo,
        kind: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let refs: Vec<NamedRef> = self.api.get_paged(self.repo_url(repo, [kind])).await?;
        Ok(refs.into_iter().map(|r| r.name).collect())
    }
}

fn decode_content(response: &ContentResponse) -> Result<String, ProviderError> {
    if response.encoding.as_deref().is_some_and(|e| e != "base64") {
        return Err(ProviderError::Parse(format!(
            "unsupported content encoding for {}",
            response.path
        )));
    }

    let encoded = response
        .content
        .as_deref()
        .ok_or_else(|| ProviderError::Parse(format!("no content in response for {}", response.path)))?;

    // GitHub returns base64 with newlines embedded
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&cleaned)
        .map_err(|e| ProviderError::Parse(format!("base64 decode failed: {e}")))?;

    String::from_utf8(bytes).map_err(|e| ProviderError::Parse(format!("invalid UTF-8: {e}")))
}

#[async_trait::async_trait]
impl ProviderClient for GitHubClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Github
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryInfo>, ProviderError> {
        let repos = match self.list_owner_repos("orgs").await {
            Err(ProviderError::NotFound(_)) => {
                debug!(owner = %self.organization, "no such organization; trying user account");
                self.list_owner_repos("users").await?
            }
            other => other?,
        };

        Ok(repos
            .into_iter()
            .filter_map(|r| {
                let Some(default_branch) = r.default_branch else {
                    debug!(repository = %r.full_name, "repository has no default branch; skipping");
                    return None;
                };
                Some(RepositoryInfo {
                    name: r.name,
                    full_path: r.full_name,
                    default_branch,
                    url: r.html_url,
                    description: r.description,
                })
            })
            .collect())
    }

    async fn list_branches(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ProviderError> {
        self.list_refs(repo, "branches").await
    }

    async fn list_tags(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ProviderError> {
        self.list_refs(repo, "tags").await
    }

    async fn list_directory(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, ProviderError> {
        let entries: Vec<ContentEntry> = self
            .api
            .get_json(self.contents_url(repo, git_ref, path))
            .await?;

        Ok(entries
            .into_iter()
            .filter_map(|e| match e.entry_type.as_str() {
                "file" => Some(DirectoryEntry::file(e.name, e.path)),
                "dir" => Some(DirectoryEntry::dir(e.name, e.path)),
                _ => None,
            })
            .collect())
    }

    async fn read_file(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        path: &str,
    ) -> Result<String, ProviderError> {
        let response: ContentResponse = self
            .api
            .get_json(self.contents_url(repo, git_ref, path))
            .await?;
        decode_content(&response)
    }

    fn build_source_location(&self, repo: &RepositoryInfo, git_ref: &str, path: &str) -> String {
        format!(
            "url:https://{}/{}/tree/{git_ref}/{path}",
            self.host_name, repo.full_path
        )
    }
}
