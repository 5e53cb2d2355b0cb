use std::fmt;

use serde::Serialize;

use crate::descriptor::DescriptorMetadata;

/// One repository within a provider/host/organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryInfo {
    pub name: String,
    /// Owner-qualified path, e.g. `ansible-collections/ansible.posix`.
    pub full_path: String,
    pub default_branch: String,
    pub url: Option<String>,
    pub description: Option<String>,
}

impl RepositoryInfo {
    pub fn new(
        name: impl Into<String>,
        full_path: impl Into<String>,
        default_branch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            full_path: full_path.into(),
            default_branch: default_branch.into(),
            url: None,
            description: None,
        }
    }
}

/// Whether a ref names a branch or a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    Branch,
    Tag,
}

impl RefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::Tag => "tag",
        }
    }

    /// Tags are release points; branches are work in progress.
    pub fn lifecycle(&self) -> &'static str {
        match self {
            Self::Branch => "development",
            Self::Tag => "production",
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// A single entry returned from a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    /// Path relative to the repository root.
    pub path: String,
    pub kind: EntryKind,
}

impl DirectoryEntry {
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn dir(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: EntryKind::Dir,
        }
    }
}

/// A valid descriptor file found while crawling one ref of one repository.
#[derive(Debug, Clone)]
pub struct DescriptorOccurrence {
    pub repository: RepositoryInfo,
    pub git_ref: String,
    pub ref_type: RefType,
    pub path: String,
    pub raw_content: String,
    pub metadata: DescriptorMetadata,
}

impl DescriptorOccurrence {
    /// `full_path@ref:path`, used in log lines.
    pub fn location(&self) -> String {
        format!("{}@{}:{}", self.repository.full_path, self.git_ref, self.path)
    }
}
