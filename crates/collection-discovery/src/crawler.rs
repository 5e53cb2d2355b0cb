use std::sync::Arc;

use tracing::{Instrument, debug, info, warn};

use crate::descriptor::{DescriptorError, parse_descriptor};
use crate::path;
use crate::pattern::{TagPattern, matches_any};
use crate::provider::{ProviderClient, ProviderError};
use crate::repository::{DescriptorOccurrence, EntryKind, RefType, RepositoryInfo};

/// What to search inside each repository.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub branches: Vec<String>,
    pub tag_patterns: Vec<TagPattern>,
    pub path_filters: Vec<String>,
    pub crawl_depth: u32,
}

/// Walks repository trees of one source and collects valid descriptors.
pub struct Crawler {
    client: Arc<dyn ProviderClient>,
    span: tracing::Span,
}

impl Crawler {
    pub fn new(client: Arc<dyn ProviderClient>, span: tracing::Span) -> Self {
        Self { client, span }
    }

    pub fn client(&self) -> &Arc<dyn ProviderClient> {
        &self.client
    }

    /// Crawl every repository in `repos`.
    ///
    /// Never fails: a repository that errors is logged and contributes
    /// nothing, and a bad descriptor only drops that one file.
    pub async fn discover_in_repos(
        &self,
        repos: &[RepositoryInfo],
        opts: &DiscoveryOptions,
    ) -> Vec<DescriptorOccurrence> {
        async {
            let mut occurrences = Vec::new();

            for repo in repos {
                match self.discover_in_repo(repo, opts).await {
                    Ok(found) => {
                        if found.is_empty() {
                            debug!(repository = %repo.full_path, "no collections found");
                        } else {
                            info!(
                                repository = %repo.full_path,
                                count = found.len(),
                                "found collections"
                            );
                        }
                        occurrences.extend(found);
                    }
                    Err(error) => {
                        warn!(
                            repository = %repo.full_path,
                            %error,
                            "failed to crawl repository; skipping"
                        );
                    }
                }
            }

            occurrences
        }
        .instrument(self.span.clone())
        .await
    }

    async fn discover_in_repo(
        &self,
        repo: &RepositoryInfo,
        opts: &DiscoveryOptions,
    ) -> Result<Vec<DescriptorOccurrence>, ProviderError> {
        let refs = self.refs_to_search(repo, opts).await;
        let mut occurrences = Vec::new();

        for (git_ref, ref_type) in &refs {
            let descriptor_paths = self.find_descriptor_paths(repo, git_ref, opts).await?;

            if descriptor_paths.is_empty() {
                debug!(
                    repository = %repo.full_path,
                    git_ref = %git_ref,
                    "no descriptor files on ref"
                );
                continue;
            }

            for descriptor_path in descriptor_paths {
                if let Some(occurrence) = self
                    .read_descriptor(repo, git_ref, *ref_type, &descriptor_path)
                    .await?
                {
                    occurrences.push(occurrence);
                }
            }
        }

        Ok(occurrences)
    }

    /// The default branch, then configured branches that exist, then tags
    /// matching any configured pattern.
    async fn refs_to_search(
        &self,
        repo: &RepositoryInfo,
        opts: &DiscoveryOptions,
    ) -> Vec<(String, RefType)> {
        let mut refs = vec![(repo.default_branch.clone(), RefType::Branch)];

        if !opts.branches.is_empty() {
            match self.client.list_branches(repo).await {
                Ok(existing) => {
                    for branch in &opts.branches {
                        let already = refs.iter().any(|(r, _)| r == branch);
                        if !already && existing.contains(branch) {
                            refs.push((branch.clone(), RefType::Branch));
                        }
                    }
                }
                Err(error) => {
                    warn!(repository = %repo.full_path, %error, "failed to list branches");
                }
            }
        }

        if !opts.tag_patterns.is_empty() {
            match self.client.list_tags(repo).await {
                Ok(tags) => {
                    for tag in tags {
                        if matches_any(&opts.tag_patterns, &tag)
                            && !refs.iter().any(|(r, t)| *t == RefType::Tag && *r == tag)
                        {
                            refs.push((tag, RefType::Tag));
                        }
                    }
                }
                Err(error) => {
                    warn!(repository = %repo.full_path, %error, "failed to list tags");
                }
            }
        }

        refs
    }

    async fn find_descriptor_paths(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        opts: &DiscoveryOptions,
    ) -> Result<Vec<String>, ProviderError> {
        if opts.path_filters.is_empty() {
            return self.crawl(repo, git_ref, "", opts.crawl_depth).await;
        }

        let mut found = Vec::new();
        for filter in &opts.path_filters {
            let start = path::normalize(filter);
            match self.crawl(repo, git_ref, &start, opts.crawl_depth).await {
                Ok(paths) => {
                    for p in paths {
                        if !found.contains(&p) {
                            found.push(p);
                        }
                    }
                }
                Err(ProviderError::NotFound(_)) => {
                    debug!(
                        repository = %repo.full_path,
                        git_ref = %git_ref,
                        path = %start,
                        "path filter does not exist on ref"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    /// Depth-bounded walk starting at `start`. Entries of `start` itself are
    /// always inspected; a subdirectory is entered only while budget remains.
    async fn crawl(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        start: &str,
        depth: u32,
    ) -> Result<Vec<String>, ProviderError> {
        let mut found = Vec::new();
        let mut pending = vec![(start.to_owned(), depth)];

        while let Some((dir, remaining)) = pending.pop() {
            let entries = self.client.list_directory(repo, git_ref, &dir).await?;

            let mut subdirs = Vec::new();
            for entry in entries {
                match entry.kind {
                    EntryKind::File if path::is_descriptor_file(&entry.name) => {
                        found.push(entry.path);
                    }
                    EntryKind::File => {}
                    EntryKind::Dir if remaining > 0 && !path::is_skipped_directory(&entry.name) => {
                        subdirs.push((entry.path, remaining - 1));
                    }
                    EntryKind::Dir => {}
                }
            }

            // Reverse so the stack pops directories in listing order.
            pending.extend(subdirs.into_iter().rev());
        }

        Ok(found)
    }

    async fn read_descriptor(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        ref_type: RefType,
        descriptor_path: &str,
    ) -> Result<Option<DescriptorOccurrence>, ProviderError> {
        let raw_content = match self.client.read_file(repo, git_ref, descriptor_path).await {
            Ok(content) => content,
            Err(ProviderError::NotFound(_) | ProviderError::Parse(_)) => {
                warn!(
                    repository = %repo.full_path,
                    git_ref = %git_ref,
                    path = %descriptor_path,
                    "descriptor vanished or was unreadable; skipping file"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match parse_descriptor(&raw_content) {
            Ok(metadata) => Ok(Some(DescriptorOccurrence {
                repository: repo.clone(),
                git_ref: git_ref.to_owned(),
                ref_type,
                path: descriptor_path.to_owned(),
                raw_content,
                metadata,
            })),
            Err(error @ DescriptorError::InvalidYaml(_)) => {
                warn!(
                    repository = %repo.full_path,
                    git_ref = %git_ref,
                    path = %descriptor_path,
                    %error,
                    "skipping unparsable descriptor file"
                );
                Ok(None)
            }
            Err(error @ DescriptorError::Invalid(_)) => {
                warn!(
                    repository = %repo.full_path,
                    git_ref = %git_ref,
                    path = %descriptor_path,
                    %error,
                    "skipping invalid descriptor file"
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryProvider;

    const POSIX: &str = "namespace: ansible\nname: posix\nversion: 1.5.4\n";

    fn opts(depth: u32) -> DiscoveryOptions {
        DiscoveryOptions {
            crawl_depth: depth,
            ..Default::default()
        }
    }

    fn crawler(provider: InMemoryProvider) -> Crawler {
        Crawler::new(Arc::new(provider), tracing::Span::none())
    }

    #[tokio::test]
    async fn finds_root_descriptor_on_default_branch() {
        let mut provider = InMemoryProvider::new();
        let repo = provider.add_repository("posix", "main");
        provider.add_file(&repo, "main", "galaxy.yml", POSIX);

        let found = crawler(provider).discover_in_repos(&[repo], &opts(5)).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].git_ref, "main");
        assert_eq!(found[0].ref_type, RefType::Branch);
        assert_eq!(found[0].path, "galaxy.yml");
        assert_eq!(found[0].metadata.name, "posix");
    }

    #[tokio::test]
    async fn depth_bounds_recursion() {
        let mut provider = InMemoryProvider::new();
        let repo = provider.add_repository("deep", "main");
        provider.add_file(&repo, "main", "a/galaxy.yml", "namespace: ns\nname: one\n");
        provider.add_file(&repo, "main", "a/b/galaxy.yml", "namespace: ns\nname: two\n");
        let crawler = crawler(provider);

        let root_only = crawler.discover_in_repos(&[repo.clone()], &opts(0)).await;
        assert!(root_only.is_empty());

        let one = crawler.discover_in_repos(&[repo.clone()], &opts(1)).await;
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].path, "a/galaxy.yml");

        let two = crawler.discover_in_repos(&[repo], &opts(2)).await;
        assert_eq!(two.len(), 2);
    }

    #[tokio::test]
    async fn skipped_directories_are_not_entered() {
        let mut provider = InMemoryProvider::new();
        let repo = provider.add_repository("skips", "main");
        provider.add_file(&repo, "main", "tests/galaxy.yml", "namespace: ns\nname: t\n");
        provider.add_file(&repo, "main", "node_modules/x/galaxy.yml", "namespace: ns\nname: n\n");
        provider.add_file(&repo, "main", "collections/galaxy.yml", "namespace: ns\nname: c\n");

        let found = crawler(provider).discover_in_repos(&[repo], &opts(5)).await;

        let names: Vec<&str> = found.iter().map(|o| o.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["c"]);
    }

    #[tokio::test]
    async fn path_filters_restrict_search() {
        let mut provider = InMemoryProvider::new();
        let repo = provider.add_repository("mono", "main");
        provider.add_file(&repo, "main", "galaxy.yml", "namespace: ns\nname: root\n");
        provider.add_file(&repo, "main", "collections/a/galaxy.yml", "namespace: ns\nname: a\n");

        let options = DiscoveryOptions {
            path_filters: vec!["/collections/".into(), "missing".into()],
            crawl_depth: 2,
            ..Default::default()
        };
        let found = crawler(provider).discover_in_repos(&[repo], &options).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "collections/a/galaxy.yml");
    }

    #[tokio::test]
    async fn configured_branches_and_matching_tags_are_searched() {
        let mut provider = InMemoryProvider::new();
        let repo = provider.add_repository("multi", "main");
        provider.add_branch(&repo, "stable-1");
        provider.add_tag(&repo, "v1.0.0");
        provider.add_tag(&repo, "nightly");
        provider.add_file(&repo, "main", "galaxy.yml", "namespace: ns\nname: c\nversion: 2.0.0\n");
        provider.add_file(&repo, "stable-1", "galaxy.yml", "namespace: ns\nname: c\nversion: 1.1.0\n");
        provider.add_file(&repo, "v1.0.0", "galaxy.yml", "namespace: ns\nname: c\nversion: 1.0.0\n");
        provider.add_file(&repo, "nightly", "galaxy.yml", "namespace: ns\nname: c\nversion: 9.9.9\n");

        let options = DiscoveryOptions {
            branches: vec!["stable-1".into(), "does-not-exist".into(), "main".into()],
            tag_patterns: vec![TagPattern::new("v*").unwrap()],
            crawl_depth: 1,
            ..Default::default()
        };
        let found = crawler(provider).discover_in_repos(&[repo], &options).await;

        let refs: Vec<(&str, RefType)> = found
            .iter()
            .map(|o| (o.git_ref.as_str(), o.ref_type))
            .collect();
        assert_eq!(
            refs,
            vec![
                ("main", RefType::Branch),
                ("stable-1", RefType::Branch),
                ("v1.0.0", RefType::Tag),
            ]
        );
    }

    #[tokio::test]
    async fn bad_descriptor_does_not_stop_other_repositories() {
        let mut provider = InMemoryProvider::new();
        let broken = provider.add_repository("broken", "main");
        provider.add_file(&broken, "main", "galaxy.yml", "namespace: [oops\n");
        let invalid = provider.add_repository("invalid", "main");
        provider.add_file(&invalid, "main", "galaxy.yml", "namespace: 9bad\nname: x\n");
        let good = provider.add_repository("good", "main");
        provider.add_file(&good, "main", "galaxy.yml", POSIX);

        let found = crawler(provider)
            .discover_in_repos(&[broken, invalid, good], &opts(5))
            .await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].repository.name, "good");
    }

    #[tokio::test]
    async fn failing_repository_contributes_nothing() {
        let mut provider = InMemoryProvider::new();
        let flaky = provider.add_repository("flaky", "main");
        provider.fail_repository(&flaky, ProviderError::Unavailable("503".into()));
        let good = provider.add_repository("good", "main");
        provider.add_file(&good, "main", "galaxy.yml", POSIX);

        let found = crawler(provider).discover_in_repos(&[flaky, good], &opts(5)).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].repository.name, "good");
    }

    #[tokio::test]
    async fn repository_without_descriptors_is_not_an_error() {
        let mut provider = InMemoryProvider::new();
        let repo = provider.add_repository("empty", "main");
        provider.add_file(&repo, "main", "README.md", "# hi");

        let found = crawler(provider).discover_in_repos(&[repo], &opts(5)).await;
        assert!(found.is_empty());
    }
}
