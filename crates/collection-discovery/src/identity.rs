use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::config::{ProviderKind, SourceConfig};
use crate::repository::DescriptorOccurrence;

/// What makes a collection unique within one source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionIdentity {
    pub provider: ProviderKind,
    pub host_name: String,
    pub organization: String,
    pub namespace: String,
    pub name: String,
    pub version: String,
}

impl CollectionIdentity {
    /// `provider:hostName:organization:namespace.name@version`
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// `namespace.name@version`, for humans.
    pub fn display_key(&self) -> String {
        format!("{}.{}@{}", self.namespace, self.name, self.version)
    }
}

impl fmt::Display for CollectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}.{}@{}",
            self.provider, self.host_name, self.organization, self.namespace, self.name, self.version
        )
    }
}

pub fn identity_of(occurrence: &DescriptorOccurrence, source: &SourceConfig) -> CollectionIdentity {
    CollectionIdentity {
        provider: source.provider,
        host_name: source.host_name.clone(),
        organization: source.organization.clone(),
        namespace: occurrence.metadata.namespace.clone(),
        name: occurrence.metadata.name.clone(),
        version: occurrence.metadata.version.clone(),
    }
}

/// Keep the first occurrence of every identity, in input order.
///
/// `seen` carries keys across calls so duplicates in later batches of the
/// same run are dropped too.
pub fn dedupe(
    occurrences: Vec<DescriptorOccurrence>,
    source: &SourceConfig,
    seen: &mut HashSet<String>,
) -> Vec<DescriptorOccurrence> {
    occurrences
        .into_iter()
        .filter(|occurrence| {
            let identity = identity_of(occurrence, source);
            let fresh = seen.insert(identity.key());
            if !fresh {
                debug!(
                    collection = %identity.display_key(),
                    location = %occurrence.location(),
                    "dropping duplicate collection"
                );
            }
            fresh
        })
        .collect()
}
