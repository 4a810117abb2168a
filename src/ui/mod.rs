pub mod content;
pub mod error;
pub mod replay;
pub mod types;

pub use error::{UiError, UiResult};

use async_trait::async_trait;
use types::{ActionKind, Caret, ContentItem, EditorHandle, Suggestion};

/// The browser automation surface the engine drives.
///
/// Implementations own the live page; the engine never holds an element
/// reference beyond the pass that produced it.
#[async_trait]
pub trait FeedSurface: Send {
    async fn find_visible_items(&mut self) -> UiResult<Vec<ContentItem>>;
    async fn scroll_to_bottom(&mut self) -> UiResult<()>;
    /// Send an end-of-content key press to the focused element.
    async fn send_end_key(&mut self) -> UiResult<()>;
    /// Scroll by a fraction of the viewport height; negative scrolls up.
    async fn scroll_by_viewport(&mut self, fraction: f64) -> UiResult<()>;
    async fn page_height(&mut self) -> UiResult<u64>;
    async fn dismiss_overlay(&mut self) -> UiResult<()>;

    async fn click_like(&mut self, item: &ContentItem) -> UiResult<()>;
    /// Open the comment editor scoped strictly to `item`'s subtree.
    async fn open_comment_editor(&mut self, item: &ContentItem) -> UiResult<EditorHandle>;
    async fn type_text(&mut self, editor: &EditorHandle, text: &str) -> UiResult<()>;
    async fn move_caret(&mut self, editor: &EditorHandle, caret: Caret) -> UiResult<()>;
    async fn select_suggestion(&mut self, editor: &EditorHandle, suggestion: &Suggestion) -> UiResult<()>;
    async fn submit_comment(&mut self, editor: &EditorHandle) -> UiResult<()>;
    async fn verify_action_succeeded(&mut self, kind: ActionKind, item: &ContentItem) -> UiResult<bool>;
}

/// Produces comment text for an item. May be static, rotating, or model-backed.
#[async_trait]
pub trait ContentSource: Send {
    async fn produce_comment_text(&mut self, item: &ContentItem) -> anyhow::Result<String>;
}

/// Resolves a typed `@Name` against the platform's suggestion tray.
#[async_trait]
pub trait MentionResolver: Send {
    async fn resolve_mention(&mut self, typed_name: &str) -> Option<Suggestion>;
}
