use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::config::ProviderKind;
use crate::descriptor::{DEFAULT_README, DescriptorMetadata, UNKNOWN_AUTHOR};
use crate::entity::CatalogRecord;
use crate::path;
use crate::provider::{ProviderClient, ProviderError};
use crate::repository::{DescriptorOccurrence, DirectoryEntry, RefType, RepositoryInfo};
use crate::scheduler::{ScheduledTask, Scheduler, SchedulerError};
use crate::sink::{CatalogSink, SinkError};

const ORGANIZATION: &str = "ansible";

/// In-memory provider for testing. Repositories live under the `ansible`
/// organization; directory listings are derived from the stored file paths.
pub struct InMemoryProvider {
    repositories: Vec<RepositoryInfo>,
    branches: HashMap<String, Vec<String>>,
    tags: HashMap<String, Vec<String>>,
    files: HashMap<(String, String), BTreeMap<String, String>>,
    failing: HashMap<String, ProviderError>,
    list_failure: Option<ProviderError>,
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self {
            repositories: Vec::new(),
            branches: HashMap::new(),
            tags: HashMap::new(),
            files: HashMap::new(),
            failing: HashMap::new(),
            list_failure: None,
        }
    }

    pub fn add_repository(&mut self, name: &str, default_branch: &str) -> RepositoryInfo {
        let repo = RepositoryInfo::new(name, format!("{ORGANIZATION}/{name}"), default_branch);
        self.repositories.push(repo.clone());
        repo
    }

    pub fn add_branch(&mut self, repo: &RepositoryInfo, branch: &str) {
        self.branches
            .entry(repo.full_path.clone())
            .or_default()
            .push(branch.to_owned());
    }

    pub fn add_tag(&mut self, repo: &RepositoryInfo, tag: &str) {
        self.tags
            .entry(repo.full_path.clone())
            .or_default()
            .push(tag.to_owned());
    }

    pub fn add_file(&mut self, repo: &RepositoryInfo, git_ref: &str, path: &str, content: &str) {
        self.files
            .entry((repo.full_path.clone(), git_ref.to_owned()))
            .or_default()
            .insert(path.to_owned(), content.to_owned());
    }

    /// Make every tree operation on `repo` fail with `error`.
    pub fn fail_repository(&mut self, repo: &RepositoryInfo, error: ProviderError) {
        self.failing.insert(repo.full_path.clone(), error);
    }

    pub fn fail_list_repositories(&mut self, error: ProviderError) {
        self.list_failure = Some(error);
    }

    fn check(&self, repo: &RepositoryInfo) -> Result<(), ProviderError> {
        match self.failing.get(&repo.full_path) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ProviderClient for InMemoryProvider {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Github
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryInfo>, ProviderError> {
        if let Some(error) = &self.list_failure {
            return Err(error.clone());
        }
        Ok(self.repositories.clone())
    }

    async fn list_branches(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ProviderError> {
        self.check(repo)?;
        let mut branches = vec![repo.default_branch.clone()];
        branches.extend(self.branches.get(&repo.full_path).cloned().unwrap_or_default());
        Ok(branches)
    }

    async fn list_tags(&self, repo: &RepositoryInfo) -> Result<Vec<String>, ProviderError> {
        self.check(repo)?;
        Ok(self.tags.get(&repo.full_path).cloned().unwrap_or_default())
    }

    async fn list_directory(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        dir: &str,
    ) -> Result<Vec<DirectoryEntry>, ProviderError> {
        self.check(repo)?;
        let dir = path::normalize(dir);
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };

        let mut children: BTreeMap<String, bool> = BTreeMap::new();
        if let Some(files) = self.files.get(&(repo.full_path.clone(), git_ref.to_owned())) {
            for file in files.keys() {
                let Some(rest) = file.strip_prefix(&prefix) else {
                    continue;
                };
                match rest.split_once('/') {
                    Some((child, _)) => children.insert(child.to_owned(), true),
                    None => children.insert(rest.to_owned(), false),
                };
            }
        }

        if children.is_empty() && !dir.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "{}@{git_ref}:{dir}",
                repo.full_path
            )));
        }

        Ok(children
            .into_iter()
            .map(|(name, is_dir)| {
                let child_path = path::join(&dir, &name);
                if is_dir {
                    DirectoryEntry::dir(name, child_path)
                } else {
                    DirectoryEntry::file(name, child_path)
                }
            })
            .collect())
    }

    async fn read_file(
        &self,
        repo: &RepositoryInfo,
        git_ref: &str,
        file: &str,
    ) -> Result<String, ProviderError> {
        self.check(repo)?;
        self.files
            .get(&(repo.full_path.clone(), git_ref.to_owned()))
            .and_then(|files| files.get(file))
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("{}@{git_ref}:{file}", repo.full_path)))
    }

    fn build_source_location(&self, repo: &RepositoryInfo, git_ref: &str, file: &str) -> String {
        format!("url:memory://{}/{git_ref}/{file}", repo.full_path)
    }
}

/// Sink that records every submission.
#[derive(Default)]
pub struct RecordingSink {
    deltas: Mutex<Vec<(String, Vec<CatalogRecord>)>>,
    fulls: Mutex<Vec<(String, Vec<CatalogRecord>)>>,
    fail_deltas: AtomicBool,
    fail_fulls: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deltas(&self, fail: bool) {
        self.fail_deltas.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fulls(&self, fail: bool) {
        self.fail_fulls.store(fail, Ordering::SeqCst);
    }

    /// Successful incremental submissions, in order.
    pub fn deltas(&self) -> Vec<Vec<CatalogRecord>> {
        self.deltas
            .lock()
            .unwrap()
            .iter()
            .map(|(_, records)| records.clone())
            .collect()
    }

    /// Successful full reconciliations, in order.
    pub fn fulls(&self) -> Vec<Vec<CatalogRecord>> {
        self.fulls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, records)| records.clone())
            .collect()
    }

    /// Source ids of successful full reconciliations, in order.
    pub fn full_sources(&self) -> Vec<String> {
        self.fulls
            .lock()
            .unwrap()
            .iter()
            .map(|(source_id, _)| source_id.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl CatalogSink for RecordingSink {
    async fn apply_delta(&self, source_id: &str, added: &[CatalogRecord]) -> Result<(), SinkError> {
        if self.fail_deltas.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("delta rejected by test sink".into()));
        }
        self.deltas
            .lock()
            .unwrap()
            .push((source_id.to_owned(), added.to_vec()));
        Ok(())
    }

    async fn apply_full(
        &self,
        source_id: &str,
        entities: &[CatalogRecord],
    ) -> Result<(), SinkError> {
        if self.fail_fulls.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("full rejected by test sink".into()));
        }
        self.fulls
            .lock()
            .unwrap()
            .push((source_id.to_owned(), entities.to_vec()));
        Ok(())
    }
}

/// Scheduler that only runs tasks when told to.
#[derive(Default)]
pub struct ManualScheduler {
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.id.clone())
            .collect()
    }

    /// Run the task registered as `id` once and wait for it.
    pub async fn trigger(&self, id: &str) {
        let task = self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned();
        match task {
            Some(task) => (task.run)(CancellationToken::new()).await,
            None => panic!("no task registered as {id}"),
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_recurring(&self, task: ScheduledTask) -> Result<(), SchedulerError> {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.iter().any(|t| t.id == task.id) {
            return Err(SchedulerError::Duplicate(task.id));
        }
        tasks.push(task);
        Ok(())
    }
}

/// A branch occurrence of `namespace.name@version` at the root of
/// `ansible/<repo_name>`.
pub fn occurrence(
    repo_name: &str,
    git_ref: &str,
    namespace: &str,
    name: &str,
    version: &str,
) -> DescriptorOccurrence {
    DescriptorOccurrence {
        repository: RepositoryInfo::new(repo_name, format!("{ORGANIZATION}/{repo_name}"), "main"),
        git_ref: git_ref.to_owned(),
        ref_type: RefType::Branch,
        path: "galaxy.yml".to_owned(),
        raw_content: format!("namespace: {namespace}\nname: {name}\nversion: {version}\n"),
        metadata: DescriptorMetadata {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            version: version.to_owned(),
            authors: vec![UNKNOWN_AUTHOR.to_owned()],
            description: None,
            license: None,
            tags: Vec::new(),
            dependencies: BTreeMap::new(),
            repository: None,
            documentation: None,
            homepage: None,
            issues: None,
            readme: DEFAULT_README.to_owned(),
        },
    }
}
