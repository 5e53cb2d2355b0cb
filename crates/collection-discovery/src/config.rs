use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crawler::DiscoveryOptions;
use crate::pattern::TagPattern;

pub const DEFAULT_CRAWL_DEPTH: u32 = 5;

/// Prefix for scheduler task ids owned by this engine.
pub const TASK_PREFIX: &str = "collection-discovery";

/// Hosting provider family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Github,
    Gitlab,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
        }
    }

    /// REST API root used when a host entry does not set `host` explicitly.
    pub fn default_api_base(&self, host_name: &str) -> String {
        match self {
            Self::Github if host_name == "github.com" => "https://api.github.com".to_owned(),
            Self::Github => format!("https://{host_name}/api/v3"),
            Self::Gitlab => format!("https://{host_name}/api/v4"),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(Self::Github),
            "gitlab" => Ok(Self::Gitlab),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

/// How often a source is crawled, and how long one run may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub frequency: Duration,
    pub timeout: Duration,
    pub initial_delay: Option<Duration>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            frequency: Duration::from_secs(60 * 60),
            timeout: Duration::from_secs(15 * 60),
            initial_delay: None,
        }
    }
}

/// An API credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// One configured (provider, host, organization) combination.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub env: String,
    pub enabled: bool,
    pub provider: ProviderKind,
    pub host_name: String,
    /// Explicit API base URL; derived from `host_name` when absent.
    pub host: Option<String>,
    pub organization: String,
    pub branches: Vec<String>,
    pub tag_patterns: Vec<TagPattern>,
    pub path_filters: Vec<String>,
    pub crawl_depth: u32,
    pub schedule: Schedule,
    pub token: Option<Token>,
}

impl SourceConfig {
    pub fn new(
        env: impl Into<String>,
        provider: ProviderKind,
        host_name: impl Into<String>,
        organization: impl Into<String>,
    ) -> Self {
        Self {
            env: env.into(),
            enabled: true,
            provider,
            host_name: host_name.into(),
            host: None,
            organization: organization.into(),
            branches: Vec::new(),
            tag_patterns: Vec::new(),
            path_filters: Vec::new(),
            crawl_depth: DEFAULT_CRAWL_DEPTH,
            schedule: Schedule::default(),
            token: None,
        }
    }

    /// `env:provider:host:organization`
    pub fn source_id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.env, self.provider, self.host_name, self.organization
        )
    }

    pub fn task_id(&self) -> String {
        format!("{TASK_PREFIX}:{}:run", self.source_id())
    }

    pub fn api_base_url(&self) -> String {
        match &self.host {
            Some(host) => host.trim_end_matches('/').to_owned(),
            None => self.provider.default_api_base(&self.host_name),
        }
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            branches: self.branches.clone(),
            tag_patterns: self.tag_patterns.clone(),
            path_filters: self.path_filters.clone(),
            crawl_depth: self.crawl_depth,
        }
    }

    /// Logging scope for every component bound to this source.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "source",
            source_id = %self.source_id(),
            provider = %self.provider,
            host = %self.host_name,
            organization = %self.organization,
        )
    }
}

/// Configuration problems. Each one disables a single source (or host),
/// except `Parse`, which rejects the whole document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("[{env}] unknown provider '{provider}'")]
    UnknownProvider { env: String, provider: String },

    #[error("[{env}:{provider}:{host}] malformed host entry: {reason}")]
    MalformedHost {
        env: String,
        provider: String,
        host: String,
        reason: String,
    },

    #[error("[{source_id}] malformed organization entry: {reason}")]
    MalformedOrganization { source_id: String, reason: String },

    #[error(
        "[{source_id}] no schedule configured for this organization or any of its parents (host, environment, root)"
    )]
    MissingSchedule { source_id: String },

    #[error("[{source_id}] invalid schedule: {reason}")]
    InvalidSchedule { source_id: String, reason: String },

    #[error("[{source_id}] crawl_depth must be a positive integer, got {depth}")]
    InvalidCrawlDepth { source_id: String, depth: i64 },

    #[error("[{source_id}] invalid tag pattern '{pattern}': {reason}")]
    InvalidTagPattern {
        source_id: String,
        pattern: String,
        reason: String,
    },
}

/// `{ days = 0, hours = 1, minutes = 30, seconds = 0 }`
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DurationConfig {
    #[serde(default)]
    pub days: u64,
    #[serde(default)]
    pub hours: u64,
    #[serde(default)]
    pub minutes: u64,
    #[serde(default)]
    pub seconds: u64,
}

impl DurationConfig {
    pub fn to_duration(self) -> Duration {
        Duration::from_secs(
            self.days * 86_400 + self.hours * 3_600 + self.minutes * 60 + self.seconds,
        )
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    pub frequency: DurationConfig,
    pub timeout: DurationConfig,
    pub initial_delay: Option<DurationConfig>,
}

impl ScheduleConfig {
    fn resolve(&self, source_id: &str) -> Result<Schedule, ConfigError> {
        let frequency = self.frequency.to_duration();
        let timeout = self.timeout.to_duration();

        if frequency.is_zero() {
            return Err(ConfigError::InvalidSchedule {
                source_id: source_id.to_owned(),
                reason: "frequency must be greater than zero".into(),
            });
        }
        if timeout.is_zero() {
            return Err(ConfigError::InvalidSchedule {
                source_id: source_id.to_owned(),
                reason: "timeout must be greater than zero".into(),
            });
        }

        Ok(Schedule {
            frequency,
            timeout,
            initial_delay: self.initial_delay.map(DurationConfig::to_duration),
        })
    }
}

/// Top-level configuration document:
/// environment → provider → host → organization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    /// Provider name → host name → host entry; decoded lazily so one bad
    /// entry does not reject its siblings.
    #[serde(flatten)]
    pub providers: BTreeMap<String, toml::Table>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// Name of an environment variable holding the token.
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    #[serde(default)]
    pub orgs: BTreeMap<String, toml::Value>,
}

impl HostConfig {
    fn resolve_token(&self) -> Option<Token> {
        if let Some(token) = &self.token {
            return Some(Token::new(token.clone()));
        }
        self.token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|t| !t.is_empty())
            .map(Token::new)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrganizationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub tag_patterns: Vec<String>,
    #[serde(default)]
    pub path_filters: Vec<String>,
    #[serde(default = "default_crawl_depth")]
    pub crawl_depth: i64,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
}

fn default_true() -> bool {
    true
}

fn default_crawl_depth() -> i64 {
    i64::from(DEFAULT_CRAWL_DEPTH)
}

/// Result of resolving configuration: the sources that loaded, and one
/// error per entry that did not.
#[derive(Debug, Default)]
pub struct LoadedSources {
    pub sources: Vec<SourceConfig>,
    pub errors: Vec<ConfigError>,
}

impl DiscoveryConfig {
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Flatten the hierarchy into one `SourceConfig` per organization.
    pub fn resolve(&self) -> LoadedSources {
        let mut loaded = LoadedSources::default();

        for (env, environment) in &self.environments {
            for (provider_name, hosts) in &environment.providers {
                let provider = match provider_name.parse::<ProviderKind>() {
                    Ok(p) => p,
                    Err(_) => {
                        loaded.errors.push(ConfigError::UnknownProvider {
                            env: env.clone(),
                            provider: provider_name.clone(),
                        });
                        continue;
                    }
                };

                for (host_name, host_value) in hosts {
                    let host: HostConfig = match host_value.clone().try_into() {
                        Ok(h) => h,
                        Err(e) => {
                            loaded.errors.push(ConfigError::MalformedHost {
                                env: env.clone(),
                                provider: provider_name.clone(),
                                host: host_name.clone(),
                                reason: e.to_string(),
                            });
                            continue;
                        }
                    };

                    let inherited = host
                        .schedule
                        .or(environment.schedule)
                        .or(self.schedule);

                    for (organization, org_value) in &host.orgs {
                        let mut source =
                            SourceConfig::new(env.clone(), provider, host_name.clone(), organization.clone());
                        source.host = host.host.clone();
                        source.token = host.resolve_token();

                        match apply_organization(source, org_value, inherited) {
                            Ok(source) => loaded.sources.push(source),
                            Err(e) => loaded.errors.push(e),
                        }
                    }
                }
            }
        }

        for error in &loaded.errors {
            tracing::warn!(%error, "skipping source with invalid configuration");
        }

        loaded
    }
}

fn apply_organization(
    mut source: SourceConfig,
    org_value: &toml::Value,
    inherited: Option<ScheduleConfig>,
) -> Result<SourceConfig, ConfigError> {
    let source_id = source.source_id();

    let org: OrganizationConfig =
        org_value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::MalformedOrganization {
                source_id: source_id.clone(),
                reason: e.to_string(),
            })?;

    let schedule = org
        .schedule
        .or(inherited)
        .ok_or_else(|| ConfigError::MissingSchedule {
            source_id: source_id.clone(),
        })?
        .resolve(&source_id)?;

    let crawl_depth = u32::try_from(org.crawl_depth)
        .ok()
        .filter(|d| *d > 0)
        .ok_or_else(|| ConfigError::InvalidCrawlDepth {
            source_id: source_id.clone(),
            depth: org.crawl_depth,
        })?;

    let tag_patterns = org
        .tag_patterns
        .iter()
        .map(|p| {
            TagPattern::new(p).map_err(|e| ConfigError::InvalidTagPattern {
                source_id: source_id.clone(),
                pattern: p.clone(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    source.enabled = org.enabled;
    source.branches = org.branches;
    source.tag_patterns = tag_patterns;
    source.path_filters = org.path_filters;
    source.crawl_depth = crawl_depth;
    source.schedule = schedule;

    Ok(source)
}

/// Parse a TOML document and resolve it into sources.
pub fn load_sources(contents: &str) -> Result<LoadedSources, ConfigError> {
    Ok(DiscoveryConfig::from_toml(contents)?.resolve())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[schedule]
frequency = { hours = 1 }
timeout = { minutes = 15 }

[environments.production.github."github.com"]
token = "secret"

[environments.production.github."github.com".orgs.ansible-collections]
branches = ["main", "stable-2"]
tag_patterns = ["v*"]
path_filters = ["collections/"]
crawl_depth = 3

[environments.production.gitlab."gitlab.example.com"]
host = "https://gitlab.example.com/api/v4/"
schedule = { frequency = { minutes = 30 }, timeout = { minutes = 5 }, initial_delay = { seconds = 10 } }

[environments.production.gitlab."gitlab.example.com".orgs.platform]
enabled = false
"#;

    #[test]
    fn resolves_every_organization() {
        let loaded = load_sources(FULL).unwrap();
        assert!(loaded.errors.is_empty(), "unexpected errors: {:?}", loaded.errors);
        assert_eq!(loaded.sources.len(), 2);

        let gh = &loaded.sources[0];
        assert_eq!(gh.provider, ProviderKind::Github);
        assert_eq!(gh.host_name, "github.com");
        assert_eq!(gh.organization, "ansible-collections");
        assert_eq!(gh.branches, vec!["main", "stable-2"]);
        assert_eq!(gh.tag_patterns[0].as_str(), "v*");
        assert_eq!(gh.path_filters, vec!["collections/"]);
        assert_eq!(gh.crawl_depth, 3);
        assert_eq!(gh.token.as_ref().map(Token::expose), Some("secret"));
        assert_eq!(gh.schedule.frequency, Duration::from_secs(3600));
        assert!(gh.enabled);

        let gl = &loaded.sources[1];
        assert_eq!(gl.provider, ProviderKind::Gitlab);
        assert!(!gl.enabled);
        assert_eq!(gl.crawl_depth, DEFAULT_CRAWL_DEPTH);
        assert_eq!(gl.schedule.frequency, Duration::from_secs(1800));
        assert_eq!(gl.schedule.initial_delay, Some(Duration::from_secs(10)));
        assert_eq!(gl.api_base_url(), "https://gitlab.example.com/api/v4");
    }

    #[test]
    fn source_and_task_ids() {
        let source = SourceConfig::new("dev", ProviderKind::Github, "github.com", "ansible");
        assert_eq!(source.source_id(), "dev:github:github.com:ansible");
        assert_eq!(
            source.task_id(),
            "collection-discovery:dev:github:github.com:ansible:run"
        );
    }

    #[test]
    fn default_api_bases() {
        let gh = SourceConfig::new("dev", ProviderKind::Github, "github.com", "o");
        assert_eq!(gh.api_base_url(), "https://api.github.com");

        let ghe = SourceConfig::new("dev", ProviderKind::Github, "ghe.corp", "o");
        assert_eq!(ghe.api_base_url(), "https://ghe.corp/api/v3");

        let gl = SourceConfig::new("dev", ProviderKind::Gitlab, "gitlab.com", "o");
        assert_eq!(gl.api_base_url(), "https://gitlab.com/api/v4");
    }

    #[test]
    fn missing_schedule_fails_only_that_organization() {
        let toml_str = r#"
[environments.dev.github."github.com".orgs.unscheduled]

[environments.dev.github."ghe.corp"]
schedule = { frequency = { minutes = 10 }, timeout = { minutes = 2 } }

[environments.dev.github."ghe.corp".orgs.scheduled]
"#;
        let loaded = load_sources(toml_str).unwrap();

        assert_eq!(loaded.sources.len(), 1);
        assert_eq!(loaded.sources[0].organization, "scheduled");
        assert_eq!(
            loaded.errors,
            vec![ConfigError::MissingSchedule {
                source_id: "dev:github:github.com:unscheduled".into()
            }]
        );
    }

    #[test]
    fn environment_schedule_is_inherited() {
        let toml_str = r#"
[environments.dev.schedule]
frequency = { minutes = 45 }
timeout = { minutes = 5 }

[environments.dev.gitlab."gitlab.com".orgs.group]
"#;
        let loaded = load_sources(toml_str).unwrap();
        assert_eq!(loaded.sources[0].schedule.frequency, Duration::from_secs(45 * 60));
    }

    #[test]
    fn organization_schedule_overrides_parents() {
        let toml_str = r#"
[schedule]
frequency = { hours = 6 }
timeout = { minutes = 30 }

[environments.dev.github."github.com".orgs.fast]
schedule = { frequency = { minutes = 5 }, timeout = { minutes = 1 } }
"#;
        let loaded = load_sources(toml_str).unwrap();
        assert_eq!(loaded.sources[0].schedule.frequency, Duration::from_secs(300));
    }

    #[test]
    fn malformed_organization_is_isolated() {
        let toml_str = r#"
[schedule]
frequency = { hours = 1 }
timeout = { minutes = 15 }

[environments.dev.github."github.com".orgs.good]

[environments.dev.github."github.com".orgs.bad]
branches = "main"
"#;
        let loaded = load_sources(toml_str).unwrap();

        assert_eq!(loaded.sources.len(), 1);
        assert_eq!(loaded.sources[0].organization, "good");
        assert!(matches!(
            &loaded.errors[0],
            ConfigError::MalformedOrganization { source_id, .. } if source_id == "dev:github:github.com:bad"
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let toml_str = r#"
[schedule]
frequency = { hours = 1 }
timeout = { minutes = 15 }

[environments.dev.github."github.com".orgs.typo]
crawl_dept = 4
"#;
        let loaded = load_sources(toml_str).unwrap();
        assert!(loaded.sources.is_empty());
        assert_eq!(loaded.errors.len(), 1);
    }

    #[test]
    fn zero_crawl_depth_is_rejected() {
        let toml_str = r#"
[schedule]
frequency = { hours = 1 }
timeout = { minutes = 15 }

[environments.dev.github."github.com".orgs.flat]
crawl_depth = 0
"#;
        let loaded = load_sources(toml_str).unwrap();
        assert!(matches!(
            loaded.errors[0],
            ConfigError::InvalidCrawlDepth { depth: 0, .. }
        ));
    }

    #[test]
    fn zero_frequency_is_rejected() {
        let toml_str = r#"
[schedule]
frequency = { minutes = 0 }
timeout = { minutes = 15 }

[environments.dev.github."github.com".orgs.never]
"#;
        let loaded = load_sources(toml_str).unwrap();
        assert!(matches!(loaded.errors[0], ConfigError::InvalidSchedule { .. }));
    }

    #[test]
    fn unknown_provider_is_reported() {
        let toml_str = r#"
[schedule]
frequency = { hours = 1 }
timeout = { minutes = 15 }

[environments.dev.bitbucket."bitbucket.org".orgs.team]
"#;
        let loaded = load_sources(toml_str).unwrap();
        assert!(loaded.sources.is_empty());
        assert!(matches!(
            &loaded.errors[0],
            ConfigError::UnknownProvider { provider, .. } if provider == "bitbucket"
        ));
    }

    #[test]
    fn invalid_document_is_a_parse_error() {
        let result = load_sources("[environments\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn empty_document_has_no_sources() {
        let loaded = load_sources("").unwrap();
        assert!(loaded.sources.is_empty());
        assert!(loaded.errors.is_empty());
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = Token::new("ghp_supersecret");
        assert_eq!(format!("{token:?}"), "Token(***)");
    }
}
