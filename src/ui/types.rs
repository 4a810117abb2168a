use std::fmt;

/// Opaque reference to a rendered feed element.
///
/// Only valid for the traversal pass that produced it. Never persisted and
/// never used as identity across calls; use `PostKey` for that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DomHandle(pub u64);

/// Comment editor opened inside one item's subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EditorHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Like,
    Comment,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Like => write!(f, "like"),
            ActionKind::Comment => write!(f, "comment"),
        }
    }
}

/// Caret target inside a comment editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caret {
    Start,
    End,
}

/// A selectable entry from the platform's name-suggestion tray.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub display_name: String,
    pub entity_id: String,
}

/// A comment currently rendered under a feed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleComment {
    pub by_self: bool,
    pub text: String,
}

/// One feed entry as currently rendered.
#[derive(Debug, Clone, Default)]
pub struct ContentItem {
    pub dom_handle: DomHandle,
    /// Platform-stable identifier (e.g. `urn:li:activity:...`), when exposed.
    pub urn: Option<String>,
    /// Local structural identifier such as a `data-id` attribute.
    pub dom_id: Option<String>,
    pub author_name: String,
    /// Truncated visible post text.
    pub text_snippet: String,
    pub is_promoted: bool,
    pub already_liked: bool,
    pub visible_comments: Vec<VisibleComment>,
}
