use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_yaml_ng::Value;

/// Version recorded when a descriptor does not pin one.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Author recorded when a descriptor lists none.
pub const UNKNOWN_AUTHOR: &str = "unknown";

pub const DEFAULT_README: &str = "README.md";

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9]*(?:[_.][A-Za-z0-9]+)*$").expect("static regex is valid")
});

/// Normalized contents of a `galaxy.yml` descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorMetadata {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub license: Option<String>,
    pub tags: Vec<String>,
    pub dependencies: BTreeMap<String, String>,
    pub repository: Option<String>,
    pub documentation: Option<String>,
    pub homepage: Option<String>,
    pub issues: Option<String>,
    pub readme: String,
}

impl DescriptorMetadata {
    /// `namespace.name`, the collection's fully qualified name.
    pub fn fqcn(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

/// One rejected field, addressed by dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("invalid YAML: {0}")]
    InvalidYaml(String),

    #[error("invalid descriptor: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// True if `value` is a legal collection namespace or name.
pub fn is_valid_name(value: &str) -> bool {
    NAME_PATTERN.is_match(value)
}

/// Parse raw descriptor text as YAML and validate it.
pub fn parse_descriptor(content: &str) -> Result<DescriptorMetadata, DescriptorError> {
    let value: Value = serde_yaml_ng::from_str(content)
        .map_err(|e| DescriptorError::InvalidYaml(e.to_string()))?;

    validate(&value).map_err(DescriptorError::Invalid)
}

/// Validate an already-parsed descriptor document.
pub fn validate(value: &Value) -> Result<DescriptorMetadata, Vec<ValidationError>> {
    let Value::Mapping(mapping) = value else {
        return Err(vec![ValidationError::new("", "descriptor must be a mapping")]);
    };

    if mapping.is_empty() {
        return Err(vec![ValidationError::new("", "descriptor is empty")]);
    }

    let mut errors = Vec::new();
    let namespace = required_name(value, "namespace", &mut errors);
    let name = required_name(value, "name", &mut errors);

    let version = match value.get("version") {
        None | Some(Value::Null) => Some(UNKNOWN_VERSION.to_owned()),
        Some(Value::String(s)) if s.trim().is_empty() => Some(UNKNOWN_VERSION.to_owned()),
        Some(Value::String(s)) => Some(s.trim().to_owned()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(_) => {
            errors.push(ValidationError::new("version", "must be a string"));
            None
        }
    };

    let (Some(namespace), Some(name), Some(version)) = (namespace, name, version) else {
        return Err(errors);
    };

    let mut authors = string_list(value.get("authors"));
    if authors.is_empty() {
        authors.push(UNKNOWN_AUTHOR.to_owned());
    }

    let license = match value.get("license") {
        Some(Value::Sequence(_)) => {
            let licenses = string_list(value.get("license"));
            (!licenses.is_empty()).then(|| licenses.join(", "))
        }
        other => optional_string(other),
    };

    Ok(DescriptorMetadata {
        namespace,
        name,
        version,
        authors,
        description: optional_string(value.get("description")),
        license,
        tags: string_list(value.get("tags")),
        dependencies: dependency_map(value.get("dependencies")),
        repository: optional_string(value.get("repository")),
        documentation: optional_string(value.get("documentation")),
        homepage: optional_string(value.get("homepage")),
        issues: optional_string(value.get("issues")),
        readme: optional_string(value.get("readme")).unwrap_or_else(|| DEFAULT_README.to_owned()),
    })
}

fn required_name(value: &Value, field: &str, errors: &mut Vec<ValidationError>) -> Option<String> {
    match value.get(field) {
        None | Some(Value::Null) => {
            errors.push(ValidationError::new(field, "is required"));
            None
        }
        Some(Value::String(s)) if is_valid_name(s) => Some(s.clone()),
        Some(Value::String(s)) => {
            errors.push(ValidationError::new(
                field,
                format!(
                    "'{s}' must start with a letter and contain only letters, digits and single '_' or '.' separators"
                ),
            ));
            None
        }
        Some(_) => {
            errors.push(ValidationError::new(field, "must be a string"));
            None
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn optional_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(scalar_to_string)
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

/// Accepts either a sequence of scalars or a single scalar.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(scalar_to_string)
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect(),
        other => optional_string(other).into_iter().collect(),
    }
}

fn dependency_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Mapping(mapping)) = value else {
        return BTreeMap::new();
    };

    mapping
        .iter()
        .filter_map(|(k, v)| {
            let name = scalar_to_string(k)?;
            let spec = scalar_to_string(v).unwrap_or_else(|| "*".to_owned());
            Some((name, spec))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(content: &str) -> Value {
        serde_yaml_ng::from_str(content).unwrap()
    }

    #[test]
    fn parses_full_descriptor() {
        let content = "\
namespace: ansible
name: posix
version: 1.5.4
authors:
  - Ansible (github.com/ansible)
description: POSIX collection
license:
  - GPL-3.0-or-later
tags: [posix, system]
dependencies:
  ansible.utils: '>=2.0.0'
repository: https://github.com/ansible-collections/ansible.posix
documentation: https://docs.ansible.com
homepage: https://github.com/ansible-collections/ansible.posix
issues: https://github.com/ansible-collections/ansible.posix/issues
readme: docs/README.md
";
        let meta = parse_descriptor(content).unwrap();

        assert_eq!(meta.namespace, "ansible");
        assert_eq!(meta.name, "posix");
        assert_eq!(meta.version, "1.5.4");
        assert_eq!(meta.authors, vec!["Ansible (github.com/ansible)"]);
        assert_eq!(meta.description.as_deref(), Some("POSIX collection"));
        assert_eq!(meta.license.as_deref(), Some("GPL-3.0-or-later"));
        assert_eq!(meta.tags, vec!["posix", "system"]);
        assert_eq!(
            meta.dependencies.get("ansible.utils").map(String::as_str),
            Some(">=2.0.0")
        );
        assert_eq!(meta.readme, "docs/README.md");
        assert_eq!(meta.fqcn(), "ansible.posix");
    }

    #[test]
    fn null_version_becomes_unknown() {
        let meta = validate(&yaml("namespace: ns\nname: coll\nversion: null\n")).unwrap();
        assert_eq!(meta.version, UNKNOWN_VERSION);
    }

    #[test]
    fn missing_version_becomes_unknown() {
        let meta = validate(&yaml("namespace: ns\nname: coll\n")).unwrap();
        assert_eq!(meta.version, UNKNOWN_VERSION);
    }

    #[test]
    fn numeric_version_is_rendered_as_text() {
        let meta = validate(&yaml("namespace: ns\nname: coll\nversion: 2\n")).unwrap();
        assert_eq!(meta.version, "2");
    }

    #[test]
    fn optional_fields_get_defaults() {
        let meta = validate(&yaml("namespace: ns\nname: coll\nversion: 1.0.0\n")).unwrap();

        assert_eq!(meta.authors, vec![UNKNOWN_AUTHOR]);
        assert_eq!(meta.readme, DEFAULT_README);
        assert!(meta.tags.is_empty());
        assert!(meta.dependencies.is_empty());
        assert_eq!(meta.description, None);
        assert_eq!(meta.license, None);
    }

    #[test]
    fn single_author_string_is_accepted() {
        let meta = validate(&yaml("namespace: ns\nname: coll\nauthors: Jane Doe\n")).unwrap();
        assert_eq!(meta.authors, vec!["Jane Doe"]);
    }

    #[test]
    fn wrong_typed_optional_fields_fall_back() {
        let meta = validate(&yaml(
            "namespace: ns\nname: coll\ntags: {a: b}\ndependencies: [x]\nreadme: [a]\n",
        ))
        .unwrap();

        assert!(meta.tags.is_empty());
        assert!(meta.dependencies.is_empty());
        assert_eq!(meta.readme, DEFAULT_README);
    }

    #[test]
    fn rejects_list_version() {
        let errors = validate(&yaml("namespace: ns\nname: coll\nversion: [1]\n")).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "version");
    }

    #[test]
    fn rejects_non_mapping() {
        let errors = validate(&yaml("- just\n- a list\n")).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "");
    }

    #[test]
    fn rejects_scalar_document() {
        assert!(validate(&yaml("hello")).is_err());
    }

    #[test]
    fn rejects_empty_mapping() {
        let errors = validate(&yaml("{}")).unwrap_err();
        assert_eq!(errors[0].message, "descriptor is empty");
    }

    #[test]
    fn reports_each_missing_name_field() {
        let errors = validate(&yaml("version: 1.0.0\n")).unwrap_err();
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["namespace", "name"]);
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in ["1abc", "_abc", "a__b", "a._b", "ab.", "has-dash", "with space", ""] {
            let doc = format!("namespace: ok\nname: '{bad}'\n");
            let errors = validate(&yaml(&doc)).unwrap_err();
            assert!(
                errors.iter().any(|e| e.path == "name"),
                "expected name error for {bad:?}"
            );

            let doc = format!("namespace: '{bad}'\nname: ok\n");
            let errors = validate(&yaml(&doc)).unwrap_err();
            assert!(
                errors.iter().any(|e| e.path == "namespace"),
                "expected namespace error for {bad:?}"
            );
        }
    }

    #[test]
    fn accepts_single_separators() {
        for good in ["a", "abc", "a_b", "a.b", "a1_b2.c3", "Community"] {
            assert!(is_valid_name(good), "expected {good:?} to be valid");
        }
    }

    #[test]
    fn invalid_yaml_is_reported() {
        let result = parse_descriptor("namespace: [unclosed\n");
        assert!(matches!(result, Err(DescriptorError::InvalidYaml(_))));
    }

    #[test]
    fn validation_is_deterministic() {
        let doc = yaml("namespace: ns\nname: coll\ndependencies: {b.c: '1', a.b: '2'}\n");
        assert_eq!(validate(&doc).unwrap(), validate(&doc).unwrap());
    }
}
