use std::fmt;

use regex::Regex;

/// A glob-style tag pattern, compiled to an anchored regex.
///
/// `?` matches exactly one character and `*` matches any run of characters.
///
/// A `*` that directly follows a letter will not continue that word: the
/// match either ends there or resumes at a non-letter. So `v*` selects
/// `v1.2.0` and `v2` but not `version1`, and `feat*` selects `feat` and
/// `feat-x` but not `feature-x`. To let the word continue, put a `?` before
/// the star: `feat?*` selects `feature-x`.
///
/// ```
/// use collection_discovery::TagPattern;
///
/// let pattern = TagPattern::new("feat*").unwrap();
/// assert!(pattern.matches("feat-x"));
/// assert!(!pattern.matches("feature-x"));
/// assert!(TagPattern::new("feat?*").unwrap().matches("feature-x"));
/// ```
#[derive(Debug, Clone)]
pub struct TagPattern {
    source: String,
    regex: Regex,
}

impl TagPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let mut expr = String::with_capacity(pattern.len() * 2 + 2);
        expr.push('^');

        let mut literal = String::new();
        let mut previous: Option<char> = None;

        for c in pattern.chars() {
            match c {
                '*' | '?' => {
                    expr.push_str(&regex::escape(&literal));
                    literal.clear();

                    if c == '?' {
                        expr.push('.');
                    } else if previous.is_some_and(|p| p.is_ascii_alphabetic()) {
                        expr.push_str("(?:[^A-Za-z].*)?");
                    } else {
                        expr.push_str(".*");
                    }
                }
                other => literal.push(other),
            }
            previous = Some(c);
        }

        expr.push_str(&regex::escape(&literal));
        expr.push('$');

        Ok(Self {
            source: pattern.to_owned(),
            regex: Regex::new(&expr)?,
        })
    }

    pub fn matches(&self, tag: &str) -> bool {
        self.regex.is_match(tag)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for TagPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for TagPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for TagPattern {}

/// True if `tag` matches any of `patterns`.
pub fn matches_any(patterns: &[TagPattern], tag: &str) -> bool {
    patterns.iter().any(|p| p.matches(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(p: &str) -> TagPattern {
        TagPattern::new(p).unwrap()
    }

    #[test]
    fn star_after_letter_does_not_continue_the_word() {
        let p = TagPattern::new("feat*").unwrap();
        assert!(p.matches("feat"));
        assert!(p.matches("feat-x"));
        assert!(!p.matches("feature-x"));

        assert!(TagPattern::new("feat?*").unwrap().matches("feature-x"));
        assert!(TagPattern::new("release-*").unwrap().matches("release-candidate"));
    }

    #[test]
    fn star_after_prefix_matches_versions() {
        let p = pattern("v*");
        assert!(p.matches("v1.0.0"));
        assert!(p.matches("v2"));
        assert!(p.matches("v"));
        assert!(!p.matches("version1"));
        assert!(!p.matches("1.0.0"));
    }

    #[test]
    fn question_mark_matches_exactly_one_char() {
        let p = pattern("release-?");
        assert!(p.matches("release-1"));
        assert!(!p.matches("release-10"));
        assert!(!p.matches("release-"));
    }

    #[test]
    fn bare_star_matches_everything() {
        let p = pattern("*");
        assert!(p.matches(""));
        assert!(p.matches("anything-at-all"));
    }

    #[test]
    fn star_after_separator_matches_any_run() {
        let p = pattern("release-*");
        assert!(p.matches("release-"));
        assert!(p.matches("release-candidate"));
        assert!(!p.matches("prerelease-1"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let p = pattern("1.0.(x)");
        assert!(p.matches("1.0.(x)"));
        assert!(!p.matches("1a0b(x)"));
    }

    #[test]
    fn match_is_anchored() {
        let p = pattern("1.*");
        assert!(p.matches("1.2.3"));
        assert!(!p.matches("v1.2.3"));
    }

    #[test]
    fn matches_any_is_or() {
        let patterns = vec![pattern("v*"), pattern("stable-?")];
        assert!(matches_any(&patterns, "stable-2"));
        assert!(matches_any(&patterns, "v3.1"));
        assert!(!matches_any(&patterns, "nightly"));
        assert!(!matches_any(&[], "v1"));
    }
}
