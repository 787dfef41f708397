//! Path matching for index documents.
//!
//! # Responsibilities
//! - Match path prefix (case-sensitive)
//! - Exclude static asset suffixes
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Matching works on the path info (mount prefix already stripped)
//! - No regex: prefix and suffix comparisons only

/// Static asset suffixes that are never treated as index documents.
pub const EXCLUDED_SUFFIXES: &[&str] = &[".css", ".js", ".ico", ".png", ".img", ".map"];

/// Default path prefix of index documents.
pub const DEFAULT_INDEX_PREFIX: &str = "/ui/";

/// Trait for matching a request path against a condition.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the path matches this condition.
    fn matches(&self, path: &str) -> bool;
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }
}

/// Matches paths that end in none of the given suffixes.
#[derive(Debug, Clone)]
pub struct SuffixExclusionMatcher {
    suffixes: Vec<String>,
}

impl SuffixExclusionMatcher {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            suffixes: suffixes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Matcher for SuffixExclusionMatcher {
    fn matches(&self, path: &str) -> bool {
        !self.suffixes.iter().any(|s| path.ends_with(s.as_str()))
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, path: &str) -> bool {
        self.matchers.iter().all(|m| m.matches(path))
    }
}

/// Identifies index documents and derives the base-URL marker they carry.
#[derive(Debug)]
pub struct IndexRewriteRule {
    prefix: String,
    matcher: AndMatcher,
}

impl IndexRewriteRule {
    /// Rule for index documents under `prefix` (e.g. "/ui/").
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let matcher = AndMatcher::new(vec![
            Box::new(PathPrefixMatcher::new(prefix.clone())),
            Box::new(SuffixExclusionMatcher::new(EXCLUDED_SUFFIXES.iter().copied())),
        ]);
        Self { prefix, matcher }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether `path_info` names an index document.
    pub fn is_index(&self, path_info: &str) -> bool {
        self.matcher.matches(path_info)
    }

    /// The marker embedded by the backend, e.g. `<base href="/ui/">`.
    pub fn marker(&self) -> String {
        format!("<base href=\"{}\">", self.prefix)
    }

    /// The marker as seen through `mount_prefix`.
    pub fn replacement(&self, mount_prefix: &str) -> String {
        format!("<base href=\"{}{}\">", mount_prefix, self.prefix)
    }
}

impl Default for IndexRewriteRule {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/ui/");
        assert!(matcher.matches("/ui/index.html"));
        assert!(!matcher.matches("/api/ui/index.html"));
        assert!(!matcher.matches("/UI/index.html"));
    }

    #[test]
    fn test_suffix_exclusion() {
        let matcher = SuffixExclusionMatcher::new([".js", ".css"]);
        assert!(matcher.matches("/ui/index.html"));
        assert!(!matcher.matches("/ui/app.js"));
        assert!(!matcher.matches("/ui/theme.css"));
    }

    #[test]
    fn index_detection() {
        let rule = IndexRewriteRule::default();
        assert!(rule.is_index("/ui/index.html"));
        assert!(rule.is_index("/ui/"));
        assert!(rule.is_index("/ui/jobs/42"));
        for asset in [
            "/ui/app.js",
            "/ui/app.css",
            "/ui/favicon.ico",
            "/ui/logo.png",
            "/ui/disk.img",
            "/ui/app.js.map",
        ] {
            assert!(!rule.is_index(asset), "{asset} should pass through");
        }
        assert!(!rule.is_index("/api/status"));
    }

    #[test]
    fn marker_and_replacement() {
        let rule = IndexRewriteRule::default();
        assert_eq!(rule.marker(), r#"<base href="/ui/">"#);
        assert_eq!(
            rule.replacement("/views/myview/1.0.0"),
            r#"<base href="/views/myview/1.0.0/ui/">"#
        );
    }
}
