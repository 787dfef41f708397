//! Index document rewriting.
//!
//! The backend serves its UI under `/ui/` and anchors relative links with
//! `<base href="/ui/">`. Seen through a mount prefix that anchor is wrong,
//! so index documents get the prefix spliced in.

use axum::body::Bytes;

use crate::routing::IndexRewriteRule;

#[derive(Debug, Default)]
pub struct ContentRewriter {
    rule: IndexRewriteRule,
}

impl ContentRewriter {
    pub fn new(rule: IndexRewriteRule) -> Self {
        Self { rule }
    }

    /// Whether responses for `path_info` are rewritten.
    pub fn applies_to(&self, path_info: &str) -> bool {
        self.rule.is_index(path_info)
    }

    /// Replace every base-URL marker in `body`. Bodies that are not UTF-8
    /// or carry no marker come back untouched.
    pub fn rewrite(&self, body: Bytes, mount_prefix: &str) -> Bytes {
        if mount_prefix.is_empty() {
            return body;
        }
        let Ok(text) = std::str::from_utf8(&body) else {
            return body;
        };
        let marker = self.rule.marker();
        if !text.contains(&marker) {
            return body;
        }
        Bytes::from(text.replace(&marker, &self.rule.replacement(mount_prefix)))
    }
}
