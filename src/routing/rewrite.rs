//! Backend target rewriting.
//!
//! # Responsibilities
//! - Hold the single pattern → replacement rule loaded at startup
//! - Substitute every literal occurrence of the pattern in a target URI
//!
//! # Design Decisions
//! - Literal substring substitution, no regex and no anchoring. A pattern
//!   that also appears elsewhere in the URI (query string included) is
//!   rewritten there too.
//! - Immutable after construction, shared read-only via `Arc`

use thiserror::Error;

/// Error building a [`RouteRule`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("uri replace pattern must not be empty")]
pub struct EmptyPattern;

/// Rewrites one literal path fragment into another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pattern: String,
    replacement: String,
}

impl RouteRule {
    /// Create a rule. The pattern must be non-empty.
    pub fn new(
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Result<Self, EmptyPattern> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(EmptyPattern);
        }
        Ok(Self {
            pattern,
            replacement: replacement.into(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Replace every occurrence of the pattern in `uri`.
    pub fn rewrite(&self, uri: &str) -> String {
        uri.replace(&self.pattern, &self.replacement)
    }
}

impl Default for RouteRule {
    fn default() -> Self {
        Self {
            pattern: "/proxied/".to_string(),
            replacement: "/".to_string(),
        }
    }
}

/// Apply `rule` to `uri`.
pub fn rewrite(uri: &str, rule: &RouteRule) -> String {
    rule.rewrite(uri)
}
