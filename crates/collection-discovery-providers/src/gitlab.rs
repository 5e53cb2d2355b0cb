use tracing::debug;

use collection_discovery::{
    DirectoryEntry, ProviderClient, ProviderError, ProviderKind, RepositoryInfo, SourceConfig,
};

use crate::http::{ApiClient, AuthScheme};
use crate::project::{ProjectResponse, RefResponse, TreeEntry};

/// GitLab REST v4 client scoped to one group (subgroups included) on one host.
pub struct GitLabClient {
    api: ApiClient,
    host_name: String,
    group: String,
}

impl GitLabClient {
    pub fn new(source: &SourceConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            api: ApiClient::new(
                &source.api_base_url(),
                source.token.clone(),
                AuthScheme::PrivateToken,
            )?,
            host_name: source.host_name.clone(),
            group: source.organization.clone(),
        })
    }

    /// Project ids are the URL-encoded `path_with_namespace`.
    fn project_url<'a>(
        &self,
        repo: &'a RepositoryInfo,
        rest: impl IntoIterator<Item = &'a str>,
    ) -> reqwest::Url {
        let segments = ["projects", repo.full_path.as_str()].into_iter().chain(rest);
        self.api.url(segments)
    }

    async fn list_refs(
        &self,
        repo: &RepositoryInfo,
        kind: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let url = self.project_url(repo, ["repository", kind]);
        let refs: Vec<RefResponse> = self.api.get_paged(url).await?;
        Ok(refs.into_iter().map(|r| r.name).collect())
    }
}

#[async_trait::async_trait]
impl ProviderClient for GitLabClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Gitlab
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryInfo>, ProviderError> {
        let mut url = self.api.url(["groups", self.group.as_str(), "projects"]);
        url.query_pairs_mut().append_pair("include_subgroups", "true");
        let projects: Vec<ProjectResponse> = self.api.get_paged(url).await?;

        Ok(projects
            .into_iter()
            .filter_map(|p| {
                if p.archived {
                    debug!(project = %p.path_with_namespace, "project archived; skipping");
                    return None;
                }
                let Some(default_branch) = p.default_branch else {
                    debug!(project = %p.path_with_namespace, "empty project; skipping");
                    return None;
                };
                Some(RepositoryInfo {
                    name: p.name,
                    full_path: p.path_with_namespace,
                    default_branch,
                    url: p.web_url,
                    description: p.description,
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
        let mut url = self.project_url(repo, ["repository", "tree"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("ref", git_ref);
            if !path.is_empty() {
                query.append_pair("path", path);
            }
        }
        let entries: Vec<TreeEntry> = self.api.get_paged(url).await?;

        Ok(entries
            .into_iter()
            .filter_map(|e| match e.entry_type.as_str() {
                "blob" => Some(DirectoryEntry::file(e.name, e.path)),
                "tree" => Some(DirectoryEntry::dir(e.name, e.path)),
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
        let mut url = self.project_url(repo, ["repository", "files", path, "raw"]);
        url.query_pairs_mut().append_pair("ref", git_ref);
        self.api.get_text(url).await
    }

    fn build_source_location(&self, repo: &RepositoryInfo, git_ref: &str, path: &str) -> String {
        format!(
            "url:https://{}/{}/-/tree/{git_ref}/{path}",
            self.host_name, repo.full_path
        )
    }
}
