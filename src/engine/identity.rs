//! Stable identity for feed items.
//!
//! Priority: platform URN, then the element's structural id, then a SHA-1 of
//! the normalized author and snippet. The hash fallback collides for distinct
//! posts with identical (or empty) visible text; that is accepted.

use crate::ui::types::ContentItem;
use ring::digest::{digest, SHA1_FOR_LEGACY_USE_ONLY};
use std::fmt;

/// Characters of snippet text that participate in the hash.
const SNIPPET_WINDOW: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PostKey {
    Urn(String),
    Dom(String),
    Hash(String),
}

impl PostKey {
    pub fn urn(&self) -> Option<&str> {
        match self {
            PostKey::Urn(urn) => Some(urn),
            _ => None,
        }
    }
}

impl fmt::Display for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostKey::Urn(v) => write!(f, "urn:{}", v),
            PostKey::Dom(v) => write!(f, "dom:{}", v),
            PostKey::Hash(v) => write!(f, "hash:{}", v),
        }
    }
}

pub fn resolve(item: &ContentItem) -> PostKey {
    if let Some(urn) = non_empty(item.urn.as_deref()) {
        return PostKey::Urn(urn.to_string());
    }
    if let Some(dom_id) = non_empty(item.dom_id.as_deref()) {
        return PostKey::Dom(dom_id.to_string());
    }
    PostKey::Hash(content_hash(&item.author_name, &item.text_snippet))
}

/// Author+snippet hash, only when there is some visible text to hash.
pub fn fingerprint(item: &ContentItem) -> Option<String> {
    if normalize(&item.author_name).is_empty() && normalize(&item.text_snippet).is_empty() {
        return None;
    }
    Some(content_hash(&item.author_name, &item.text_snippet))
}

/// Lowercase and collapse runs of whitespace to single spaces.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn content_hash(author: &str, snippet: &str) -> String {
    let snippet: String = normalize(snippet).chars().take(SNIPPET_WINDOW).collect();
    let src = format!("{}|{}", normalize(author), snippet);
    hex::encode(digest(&SHA1_FOR_LEGACY_USE_ONLY, src.as_bytes()).as_ref())
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::types::DomHandle;

    fn item(urn: Option<&str>, dom_id: Option<&str>, author: &str, text: &str) -> ContentItem {
        ContentItem {
            urn: urn.map(String::from),
            dom_id: dom_id.map(String::from),
            author_name: author.to_string(),
            text_snippet: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_urn_has_priority() {
        let key = resolve(&item(Some("urn:li:activity:1"), Some("d1"), "A", "t"));
        assert_eq!(key, PostKey::Urn("urn:li:activity:1".into()));
        assert_eq!(key.to_string(), "urn:urn:li:activity:1");
    }

    #[test]
    fn test_dom_id_fallback() {
        let key = resolve(&item(None, Some("d1"), "A", "t"));
        assert_eq!(key.to_string(), "dom:d1");
        assert_eq!(key.urn(), None);
    }

    #[test]
    fn test_blank_identifiers_fall_through() {
        let key = resolve(&item(Some("  "), Some(""), "A", "t"));
        assert!(matches!(key, PostKey::Hash(_)));
    }

    #[test]
    fn test_same_urn_same_key_regardless_of_other_signals() {
        let mut a = item(Some("urn:1"), None, "Jane", "first render");
        let mut b = item(Some("urn:1"), Some("x"), "Jane Doe", "second render");
        a.dom_handle = DomHandle(1);
        b.dom_handle = DomHandle(42);
        assert_eq!(resolve(&a), resolve(&b));
    }

    #[test]
    fn test_hash_normalizes_case_and_whitespace() {
        let a = resolve(&item(None, None, "Jane  Doe", "Hello\n  World"));
        let b = resolve(&item(None, None, "jane doe", "hello world"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_is_sha1_of_normalized_pair() {
        let key = resolve(&item(None, None, "Jane Doe", "Hello World"));
        assert_eq!(key.to_string(), "hash:6a0e131aa86688b746e0eb6796fc1e1747008218");
    }

    #[test]
    fn test_empty_item_still_gets_key() {
        // sha1("|")
        let key = resolve(&item(None, None, "", ""));
        assert_eq!(key, PostKey::Hash("3eb416223e9e69e6bb8ee19793911ad1ad2027d8".into()));
    }

    #[test]
    fn test_hash_distinguishes_text() {
        let a = resolve(&item(None, None, "Jane", "post one"));
        let b = resolve(&item(None, None, "Jane", "post two"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_absent_for_empty_item() {
        assert!(fingerprint(&item(Some("urn:1"), None, " ", "")).is_none());
        assert!(fingerprint(&item(Some("urn:1"), None, "Jane", "")).is_some());
    }

    #[test]
    fn test_fingerprint_matches_hash_key() {
        let with_urn = item(Some("urn:1"), None, "Jane", "Same post");
        let without = item(None, None, "Jane", "Same post");
        let PostKey::Hash(h) = resolve(&without) else {
            panic!("expected hash key");
        };
        assert_eq!(fingerprint(&with_urn), Some(h));
    }

    #[test]
    fn test_snippet_window_truncates() {
        let base = "x".repeat(SNIPPET_WINDOW);
        let a = resolve(&item(None, None, "A", &format!("{}tail-one", base)));
        let b = resolve(&item(None, None, "A", &format!("{}tail-two", base)));
        assert_eq!(a, b);
    }
}
