//! Scripted feed surface driven by a JSON fixture.
//!
//! Pages are revealed lazily: the first page is visible immediately, each
//! later page starts loading when the feed is scrolled and appears after
//! `polls_to_load` page-height measurements. This reproduces the stall
//! patterns of a throttled infinite feed without a browser.

use super::error::{UiError, UiResult};
use super::types::*;
use super::{FeedSurface, MentionResolver};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const POST_HEIGHT_PX: u64 = 600;

// ── Fixture format ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReplayFixture {
    #[serde(default)]
    pub pages: Vec<ReplayPage>,
    /// Names the suggestion tray can resolve.
    #[serde(default)]
    pub known_names: Vec<String>,
    /// Fail with `AuthenticationLost` once this many likes/comments were submitted.
    #[serde(default)]
    pub auth_lost_after_actions: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayPage {
    #[serde(default = "default_polls_to_load")]
    pub polls_to_load: u32,
    #[serde(default)]
    pub posts: Vec<ReplayPost>,
}

fn default_polls_to_load() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReplayPost {
    #[serde(default)]
    pub urn: Option<String>,
    #[serde(default)]
    pub dom_id: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub promoted: bool,
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub comments: Vec<ReplayComment>,
    /// Submissions go through but the success signal never shows.
    #[serde(default)]
    pub unverifiable: bool,
    /// Every interaction fails with a stale element reference.
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub no_editor: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayComment {
    #[serde(default)]
    pub by_self: bool,
    pub text: String,
}

// ── Recorded interactions ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    ScrollToBottom,
    EndKey,
    ScrollBy(f64),
    DismissOverlay,
    Like(DomHandle),
    OpenEditor(DomHandle),
    Caret(Caret),
    Type(String),
    SelectSuggestion(String),
    Submit { handle: DomHandle, text: String },
}

/// A comment submitted through the replay surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedComment {
    pub urn: Option<String>,
    pub text: String,
    pub linked_mentions: Vec<String>,
}

struct PostState {
    post: ReplayPost,
    liked: bool,
    comments: Vec<VisibleComment>,
}

struct EditorState {
    post: usize,
    buffer: String,
    caret: usize,
    linked: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct PendingLoad {
    polls: u32,
}

// ── Surface ───────────────────────────────────────────────────────────

pub struct ReplayFeed {
    pages: Vec<ReplayPage>,
    revealed_pages: usize,
    posts: Vec<PostState>,
    pending: Option<PendingLoad>,
    editors: HashMap<EditorHandle, EditorState>,
    next_editor: u64,
    known_names: Vec<String>,
    auth_lost_after: Option<u32>,
    submissions: u32,
    events: Vec<UiEvent>,
    submitted: Vec<SubmittedComment>,
}

impl ReplayFeed {
    pub fn new(fixture: ReplayFixture) -> Self {
        let mut feed = Self {
            pages: fixture.pages,
            revealed_pages: 0,
            posts: Vec::new(),
            pending: None,
            editors: HashMap::new(),
            next_editor: 1,
            known_names: fixture.known_names,
            auth_lost_after: fixture.auth_lost_after_actions,
            submissions: 0,
            events: Vec::new(),
            submitted: Vec::new(),
        };
        feed.reveal_next_page();
        feed
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay fixture: {}", path.display()))?;
        let fixture: ReplayFixture =
            serde_json::from_str(&content).context("Failed to parse replay fixture JSON")?;
        Ok(Self::new(fixture))
    }

    /// Suggestion resolver backed by the fixture's `known_names`.
    pub fn directory(&self) -> ReplayDirectory {
        ReplayDirectory::new(self.known_names.clone())
    }

    pub fn events(&self) -> &[UiEvent] {
        &self.events
    }

    pub fn submitted_comments(&self) -> &[SubmittedComment] {
        &self.submitted
    }

    /// URNs of posts liked through this surface, in click order.
    pub fn liked_urns(&self) -> Vec<Option<String>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                UiEvent::Like(h) => self.posts.get(h.0 as usize).map(|p| p.post.urn.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn revealed_pages(&self) -> usize {
        self.revealed_pages
    }

    fn reveal_next_page(&mut self) {
        if let Some(page) = self.pages.get(self.revealed_pages) {
            for post in page.posts.clone() {
                let comments = post
                    .comments
                    .iter()
                    .map(|c| VisibleComment { by_self: c.by_self, text: c.text.clone() })
                    .collect();
                self.posts.push(PostState { liked: post.liked, post, comments });
            }
            self.revealed_pages += 1;
        }
    }

    fn request_more(&mut self) {
        if self.pending.is_none() && self.revealed_pages < self.pages.len() {
            self.pending = Some(PendingLoad { polls: 0 });
        }
    }

    fn post_for(&self, item: &ContentItem) -> UiResult<usize> {
        let idx = item.dom_handle.0 as usize;
        match self.posts.get(idx) {
            Some(p) if p.post.stale => Err(UiError::StaleElement),
            Some(_) => Ok(idx),
            None => Err(UiError::StaleElement),
        }
    }

    fn count_submission(&mut self) -> UiResult<()> {
        if let Some(limit) = self.auth_lost_after {
            if self.submissions >= limit {
                return Err(UiError::AuthenticationLost);
            }
        }
        self.submissions += 1;
        Ok(())
    }

    fn editor_mut(&mut self, editor: &EditorHandle) -> UiResult<&mut EditorState> {
        self.editors.get_mut(editor).ok_or(UiError::EditorNotFound)
    }
}

#[async_trait]
impl FeedSurface for ReplayFeed {
    async fn find_visible_items(&mut self) -> UiResult<Vec<ContentItem>> {
        Ok(self
            .posts
            .iter()
            .enumerate()
            .map(|(idx, p)| ContentItem {
                dom_handle: DomHandle(idx as u64),
                urn: p.post.urn.clone(),
                dom_id: p.post.dom_id.clone(),
                author_name: p.post.author.clone(),
                text_snippet: p.post.text.chars().take(160).collect(),
                is_promoted: p.post.promoted,
                already_liked: p.liked,
                visible_comments: p.comments.clone(),
            })
            .collect())
    }

    async fn scroll_to_bottom(&mut self) -> UiResult<()> {
        self.events.push(UiEvent::ScrollToBottom);
        self.request_more();
        Ok(())
    }

    async fn send_end_key(&mut self) -> UiResult<()> {
        self.events.push(UiEvent::EndKey);
        self.request_more();
        Ok(())
    }

    async fn scroll_by_viewport(&mut self, fraction: f64) -> UiResult<()> {
        self.events.push(UiEvent::ScrollBy(fraction));
        if fraction > 0.0 {
            self.request_more();
        }
        Ok(())
    }

    async fn page_height(&mut self) -> UiResult<u64> {
        if let Some(mut pending) = self.pending {
            pending.polls += 1;
            let needed = self
                .pages
                .get(self.revealed_pages)
                .map(|p| p.polls_to_load.max(1))
                .unwrap_or(1);
            if pending.polls >= needed {
                self.pending = None;
                self.reveal_next_page();
            } else {
                self.pending = Some(pending);
            }
        }
        Ok(self.posts.len() as u64 * POST_HEIGHT_PX)
    }

    async fn dismiss_overlay(&mut self) -> UiResult<()> {
        self.events.push(UiEvent::DismissOverlay);
        Ok(())
    }

    async fn click_like(&mut self, item: &ContentItem) -> UiResult<()> {
        let idx = self.post_for(item)?;
        self.count_submission()?;
        self.events.push(UiEvent::Like(item.dom_handle));
        self.posts[idx].liked = true;
        Ok(())
    }

    async fn open_comment_editor(&mut self, item: &ContentItem) -> UiResult<EditorHandle> {
        let idx = self.post_for(item)?;
        if self.posts[idx].post.no_editor {
            return Err(UiError::EditorNotFound);
        }
        self.events.push(UiEvent::OpenEditor(item.dom_handle));
        let handle = EditorHandle(self.next_editor);
        self.next_editor += 1;
        self.editors.insert(
            handle,
            EditorState { post: idx, buffer: String::new(), caret: 0, linked: Vec::new() },
        );
        Ok(handle)
    }

    async fn type_text(&mut self, editor: &EditorHandle, text: &str) -> UiResult<()> {
        let state = self.editor_mut(editor)?;
        state.buffer.insert_str(state.caret, text);
        state.caret += text.len();
        self.events.push(UiEvent::Type(text.to_string()));
        Ok(())
    }

    async fn move_caret(&mut self, editor: &EditorHandle, caret: Caret) -> UiResult<()> {
        let state = self.editor_mut(editor)?;
        state.caret = match caret {
            Caret::Start => 0,
            Caret::End => state.buffer.len(),
        };
        self.events.push(UiEvent::Caret(caret));
        Ok(())
    }

    async fn select_suggestion(&mut self, editor: &EditorHandle, suggestion: &Suggestion) -> UiResult<()> {
        let state = self.editor_mut(editor)?;
        state.linked.push(suggestion.display_name.clone());
        self.events.push(UiEvent::SelectSuggestion(suggestion.display_name.clone()));
        Ok(())
    }

    async fn submit_comment(&mut self, editor: &EditorHandle) -> UiResult<()> {
        self.count_submission()?;
        let state = self.editors.remove(editor).ok_or(UiError::EditorNotFound)?;
        let post = &mut self.posts[state.post];
        if !post.post.unverifiable {
            post.comments.push(VisibleComment { by_self: true, text: state.buffer.clone() });
        }
        let urn = post.post.urn.clone();
        self.events.push(UiEvent::Submit {
            handle: DomHandle(state.post as u64),
            text: state.buffer.clone(),
        });
        self.submitted.push(SubmittedComment {
            urn,
            text: state.buffer,
            linked_mentions: state.linked,
        });
        Ok(())
    }

    async fn verify_action_succeeded(&mut self, kind: ActionKind, item: &ContentItem) -> UiResult<bool> {
        let idx = self.post_for(item)?;
        let post = &self.posts[idx];
        if post.post.unverifiable {
            return Ok(false);
        }
        Ok(match kind {
            ActionKind::Like => post.liked,
            ActionKind::Comment => post.comments.iter().any(|c| c.by_self),
        })
    }
}

// ── Suggestion tray ───────────────────────────────────────────────────

pub struct ReplayDirectory {
    names: Vec<String>,
}

impl ReplayDirectory {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

#[async_trait]
impl MentionResolver for ReplayDirectory {
    async fn resolve_mention(&mut self, typed_name: &str) -> Option<Suggestion> {
        let typed = typed_name.trim();
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(typed))
            .map(|idx| Suggestion {
                display_name: self.names[idx].clone(),
                entity_id: format!("member-{}", idx),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(urn: &str) -> ReplayPost {
        ReplayPost {
            urn: Some(urn.to_string()),
            author: "Jane Doe".to_string(),
            text: format!("post {}", urn),
            ..Default::default()
        }
    }

    fn two_page_feed(polls_to_load: u32) -> ReplayFeed {
        ReplayFeed::new(ReplayFixture {
            pages: vec![
                ReplayPage { polls_to_load: 1, posts: vec![post("a"), post("b")] },
                ReplayPage { polls_to_load, posts: vec![post("c")] },
            ],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_first_page_visible_immediately() {
        let mut feed = two_page_feed(1);
        let items = feed.find_visible_items().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].urn.as_deref(), Some("a"));
        assert_eq!(feed.page_height().await.unwrap(), 1200);
    }

    #[tokio::test]
    async fn test_page_loads_after_required_polls() {
        let mut feed = two_page_feed(3);
        feed.scroll_to_bottom().await.unwrap();
        assert_eq!(feed.page_height().await.unwrap(), 1200);
        assert_eq!(feed.page_height().await.unwrap(), 1200);
        assert_eq!(feed.page_height().await.unwrap(), 1800);
        assert_eq!(feed.revealed_pages(), 2);
    }

    #[tokio::test]
    async fn test_height_static_without_scroll() {
        let mut feed = two_page_feed(1);
        feed.page_height().await.unwrap();
        assert_eq!(feed.page_height().await.unwrap(), 1200);
    }

    #[tokio::test]
    async fn test_comment_typing_respects_caret() {
        let mut feed = two_page_feed(1);
        let items = feed.find_visible_items().await.unwrap();
        let editor = feed.open_comment_editor(&items[0]).await.unwrap();
        feed.type_text(&editor, "world").await.unwrap();
        feed.move_caret(&editor, Caret::Start).await.unwrap();
        feed.type_text(&editor, "hello ").await.unwrap();
        feed.submit_comment(&editor).await.unwrap();
        assert_eq!(feed.submitted_comments()[0].text, "hello world");
        assert!(feed.verify_action_succeeded(ActionKind::Comment, &items[0]).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_post_rejects_like() {
        let mut feed = ReplayFeed::new(ReplayFixture {
            pages: vec![ReplayPage {
                polls_to_load: 1,
                posts: vec![ReplayPost { stale: true, ..post("x") }],
            }],
            ..Default::default()
        });
        let items = feed.find_visible_items().await.unwrap();
        assert!(matches!(feed.click_like(&items[0]).await, Err(UiError::StaleElement)));
    }

    #[tokio::test]
    async fn test_auth_lost_after_limit() {
        let mut feed = ReplayFeed::new(ReplayFixture {
            pages: vec![ReplayPage { polls_to_load: 1, posts: vec![post("a"), post("b")] }],
            auth_lost_after_actions: Some(1),
            ..Default::default()
        });
        let items = feed.find_visible_items().await.unwrap();
        feed.click_like(&items[0]).await.unwrap();
        assert!(matches!(feed.click_like(&items[1]).await, Err(UiError::AuthenticationLost)));
    }

    #[tokio::test]
    async fn test_directory_resolves_case_insensitively() {
        let mut dir = ReplayDirectory::new(vec!["Ada Lovelace".to_string()]);
        let s = dir.resolve_mention("ada lovelace").await.unwrap();
        assert_eq!(s.display_name, "Ada Lovelace");
        assert!(dir.resolve_mention("Grace Hopper").await.is_none());
    }
}
