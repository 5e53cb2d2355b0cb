use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::SourceConfig;
use crate::repository::{DescriptorOccurrence, RepositoryInfo};

pub const API_VERSION: &str = "collection-discovery.io/v1alpha1";

const ANNOTATION_PREFIX: &str = "collection-discovery.io";

/// Catalog identifiers are DNS-label sized.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Hex characters of digest kept by `unique_identifier`.
const DIGEST_SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RecordKind {
    Collection,
    Repository,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "Collection",
            Self::Repository => "Repository",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record submitted to the catalog sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    pub api_version: String,
    pub kind: RecordKind,
    pub metadata: RecordMetadata,
    pub spec: RecordSpec,
}

impl CatalogRecord {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// `collection:<name>` or `repository:<name>`.
    pub fn reference(&self) -> String {
        entity_ref(self.kind, &self.metadata.name)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub name: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub annotations: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RecordSpec {
    Collection(CollectionSpec),
    Repository(RepositorySpec),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSpec {
    #[serde(rename = "type")]
    pub record_type: String,
    pub lifecycle: String,
    pub owner: String,
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    pub dependencies: BTreeMap<String, String>,
    pub source_location: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub ref_type: String,
    pub path: String,
    pub readme: String,
    /// Reference to the owning repository record.
    pub part_of: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySpec {
    #[serde(rename = "type")]
    pub record_type: String,
    pub owner: String,
    pub provider: String,
    pub host: String,
    pub organization: String,
    pub full_path: String,
    pub default_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub collection_count: usize,
    /// References to child collection records.
    pub contains: Vec<String>,
}

pub fn entity_ref(kind: RecordKind, name: &str) -> String {
    format!("{}:{name}", kind.as_str().to_lowercase())
}

/// Lower-case, collapse every run of characters outside `[a-z0-9-]` (and
/// repeated hyphens) into one hyphen, trim hyphens, cap at 63 characters.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out = collapse(raw);
    out.truncate(MAX_IDENTIFIER_LEN);
    out.trim_end_matches('-').to_owned()
}

/// `sanitize_identifier`, except that a name too long for the cap keeps a
/// prefix and ends in a digest of the whole sanitized name, so two inputs
/// that only differ past the cap still get different identifiers.
pub fn unique_identifier(raw: &str) -> String {
    let full = collapse(raw);
    if full.len() <= MAX_IDENTIFIER_LEN {
        return full;
    }

    let digest = Sha256::digest(full.as_bytes());
    let suffix: String = digest
        .iter()
        .take(DIGEST_SUFFIX_LEN / 2)
        .map(|b| format!("{b:02x}"))
        .collect();

    let head = &full[..MAX_IDENTIFIER_LEN - DIGEST_SUFFIX_LEN - 1];
    format!("{}-{suffix}", head.trim_end_matches('-'))
}

fn collapse(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_end_matches('-').len();
    out.truncate(trimmed);
    out
}

/// Name of the collection record for an occurrence.
pub fn collection_identifier(occurrence: &DescriptorOccurrence, source: &SourceConfig) -> String {
    let meta = &occurrence.metadata;
    sanitize_identifier(&format!(
        "{}-{}-{}-{}-{}",
        meta.namespace, meta.name, meta.version, source.provider, source.host_name
    ))
}

/// Name of the repository record for a repository. Unique per full path
/// within a source, since collection records point at it.
pub fn repository_identifier(repo: &RepositoryInfo, source: &SourceConfig) -> String {
    unique_identifier(&format!(
        "{}-{}-{}",
        source.provider, source.host_name, repo.full_path
    ))
}

fn annotation(key: &str) -> String {
    format!("{ANNOTATION_PREFIX}/{key}")
}

fn sanitized_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = sanitize_identifier(tag);
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

pub fn synthesize_collection_record(
    occurrence: &DescriptorOccurrence,
    source: &SourceConfig,
    source_location: &str,
) -> CatalogRecord {
    let meta = &occurrence.metadata;
    let repo = &occurrence.repository;

    let annotations = BTreeMap::from([
        (annotation("provider"), source.provider.to_string()),
        (annotation("host"), source.host_name.clone()),
        (annotation("organization"), source.organization.clone()),
        (annotation("repository"), repo.full_path.clone()),
        (annotation("ref"), occurrence.git_ref.clone()),
        (annotation("ref-type"), occurrence.ref_type.to_string()),
        (annotation("path"), occurrence.path.clone()),
        (annotation("discovery-source-id"), source.source_id()),
        (annotation("source-location"), source_location.to_owned()),
    ]);

    let mut links = Vec::new();
    for (url, title) in [
        (&meta.repository, "Repository"),
        (&meta.documentation, "Documentation"),
        (&meta.homepage, "Homepage"),
        (&meta.issues, "Issues"),
    ] {
        if let Some(url) = url {
            links.push(Link {
                url: url.clone(),
                title: title.to_owned(),
            });
        }
    }

    let mut tags = sanitized_tags(&meta.tags);
    let lifecycle_tag = occurrence.ref_type.lifecycle().to_owned();
    if !tags.contains(&lifecycle_tag) {
        tags.push(lifecycle_tag);
    }

    CatalogRecord {
        api_version: API_VERSION.to_owned(),
        kind: RecordKind::Collection,
        metadata: RecordMetadata {
            name: collection_identifier(occurrence, source),
            title: meta.fqcn(),
            description: meta.description.clone(),
            annotations,
            tags,
            links,
        },
        spec: RecordSpec::Collection(CollectionSpec {
            record_type: "ansible-collection".to_owned(),
            lifecycle: occurrence.ref_type.lifecycle().to_owned(),
            owner: source.organization.clone(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
            version: meta.version.clone(),
            authors: meta.authors.clone(),
            license: meta.license.clone(),
            dependencies: meta.dependencies.clone(),
            source_location: source_location.to_owned(),
            git_ref: occurrence.git_ref.clone(),
            ref_type: occurrence.ref_type.to_string(),
            path: occurrence.path.clone(),
            readme: meta.readme.clone(),
            part_of: entity_ref(RecordKind::Repository, &repository_identifier(repo, source)),
        }),
    }
}

pub fn synthesize_repository_record(
    repo: &RepositoryInfo,
    source: &SourceConfig,
    collection_count: usize,
    collection_identifiers: &[String],
) -> CatalogRecord {
    let annotations = BTreeMap::from([
        (annotation("provider"), source.provider.to_string()),
        (annotation("host"), source.host_name.clone()),
        (annotation("organization"), source.organization.clone()),
        (annotation("repository"), repo.full_path.clone()),
        (annotation("discovery-source-id"), source.source_id()),
    ]);

    let links = repo
        .url
        .iter()
        .map(|url| Link {
            url: url.clone(),
            title: "Repository".to_owned(),
        })
        .collect();

    CatalogRecord {
        api_version: API_VERSION.to_owned(),
        kind: RecordKind::Repository,
        metadata: RecordMetadata {
            name: repository_identifier(repo, source),
            title: repo.full_path.clone(),
            description: repo.description.clone(),
            annotations,
            tags: vec![source.provider.to_string()],
            links,
        },
        spec: RecordSpec::Repository(RepositorySpec {
            record_type: "git-repository".to_owned(),
            owner: source.organization.clone(),
            provider: source.provider.to_string(),
            host: source.host_name.clone(),
            organization: source.organization.clone(),
            full_path: repo.full_path.clone(),
            default_branch: repo.default_branch.clone(),
            url: repo.url.clone(),
            collection_count,
            contains: collection_identifiers
                .iter()
                .map(|id| entity_ref(RecordKind::Collection, id))
                .collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::repository::RefType;
    use crate::test_support::occurrence;

    fn source() -> SourceConfig {
        SourceConfig::new("dev", ProviderKind::Github, "github.com", "ansible")
    }

    #[test]
    fn sanitize_collapses_and_trims() {
        assert_eq!(sanitize_identifier("Ansible.Posix@1.5.4"), "ansible-posix-1-5-4");
        assert_eq!(sanitize_identifier("--a__b--"), "a-b");
        assert_eq!(sanitize_identifier("a - b"), "a-b");
        assert_eq!(sanitize_identifier("..."), "");
    }

    #[test]
    fn sanitize_truncates_to_63() {
        let long = "a".repeat(100);
        assert_eq!(sanitize_identifier(&long).len(), MAX_IDENTIFIER_LEN);

        // A hyphen landing at the cut is trimmed.
        let edge = format!("{}-b", "a".repeat(62));
        assert_eq!(sanitize_identifier(&edge), "a".repeat(62));
    }

    #[test]
    fn long_repository_names_stay_distinct() {
        let src = source();
        let first = RepositoryInfo::new(
            "community.library_inventory_filtering",
            "ansible/community.library_inventory_filtering",
            "main",
        );
        let second = RepositoryInfo::new(
            "community.library_inventory_filtering_v2",
            "ansible/community.library_inventory_filtering_v2",
            "main",
        );

        let a = repository_identifier(&first, &src);
        let b = repository_identifier(&second, &src);

        assert_ne!(a, b);
        assert!(a.len() <= MAX_IDENTIFIER_LEN && b.len() <= MAX_IDENTIFIER_LEN);
        assert!(a.starts_with("github-github-com-ansible-community-library"));
        assert_eq!(a, repository_identifier(&first, &src));
    }

    #[test]
    fn unique_identifier_leaves_short_names_alone() {
        assert_eq!(unique_identifier("GitHub/ansible.posix"), "github-ansible-posix");
        assert_eq!(unique_identifier("trailing--"), "trailing");
    }

    #[test]
    fn collection_record_fields() {
        let occ = occurrence("ansible.posix", "main", "ansible", "posix", "1.5.4");
        let record = synthesize_collection_record(&occ, &source(), "url:https://x");

        assert_eq!(record.kind, RecordKind::Collection);
        assert_eq!(record.name(), "ansible-posix-1-5-4-github-github-com");
        assert_eq!(record.metadata.title, "ansible.posix");
        assert_eq!(
            record.metadata.annotations["collection-discovery.io/discovery-source-id"],
            "dev:github:github.com:ansible"
        );
        assert_eq!(record.metadata.annotations["collection-discovery.io/ref-type"], "branch");

        let RecordSpec::Collection(spec) = &record.spec else {
            panic!("expected collection spec");
        };
        assert_eq!(spec.lifecycle, "development");
        assert_eq!(spec.source_location, "url:https://x");
        assert_eq!(spec.part_of, "repository:github-github-com-ansible-ansible-posix");
    }

    #[test]
    fn tag_ref_is_production() {
        let mut occ = occurrence("ansible.posix", "v1.5.4", "ansible", "posix", "1.5.4");
        occ.ref_type = RefType::Tag;
        let record = synthesize_collection_record(&occ, &source(), "loc");

        let RecordSpec::Collection(spec) = &record.spec else {
            panic!("expected collection spec");
        };
        assert_eq!(spec.lifecycle, "production");
        assert!(record.metadata.tags.contains(&"production".to_owned()));
    }

    #[test]
    fn collection_record_is_deterministic() {
        let occ = occurrence("ansible.posix", "main", "ansible", "posix", "1.5.4");
        let a = synthesize_collection_record(&occ, &source(), "loc").to_json().unwrap();
        let b = synthesize_collection_record(&occ, &source(), "loc").to_json().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn repository_record_lists_children() {
        let occ = occurrence("ansible.posix", "main", "ansible", "posix", "1.5.4");
        let child = synthesize_collection_record(&occ, &source(), "loc");
        let record = synthesize_repository_record(
            &occ.repository,
            &source(),
            1,
            &[child.name().to_owned()],
        );

        assert_eq!(record.kind, RecordKind::Repository);
        let RecordSpec::Repository(spec) = &record.spec else {
            panic!("expected repository spec");
        };
        assert_eq!(spec.collection_count, 1);
        assert_eq!(spec.contains, vec![child.reference()]);

        let RecordSpec::Collection(child_spec) = &child.spec else {
            panic!("expected collection spec");
        };
        assert_eq!(child_spec.part_of, record.reference());
    }

    #[test]
    fn serialized_shape_uses_camel_case() {
        let occ = occurrence("ansible.posix", "main", "ansible", "posix", "1.5.4");
        let json = synthesize_collection_record(&occ, &source(), "loc").to_json().unwrap();

        assert!(json.contains("\"apiVersion\""));
        assert!(json.contains("\"kind\":\"Collection\""));
        assert!(json.contains("\"sourceLocation\":\"loc\""));
        assert!(json.contains("\"ref\":\"main\""));
    }
}
