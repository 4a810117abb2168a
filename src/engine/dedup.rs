//! At-most-once bookkeeping for engagement actions.
//!
//! Session sets are ephemeral; commented URNs are also written to the
//! persistent cache and flushed on every successful comment, so an abrupt
//! exit never forgets a comment that already went out.

use super::cache::{CacheStorage, PersistentCache};
use super::identity::{normalize, PostKey};
use crate::ui::types::{ActionKind, ContentItem};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    Processed,
    AlreadyCommentedSession,
    AlreadyCommentedPersisted,
    ExistingSelfComment,
    SimilarText,
    Promoted,
    AlreadyLiked,
    AlreadyLikedSession,
    ContentUnavailable,
    BudgetExhausted,
    LikedBeforeComment,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Processed => "processed",
            SkipReason::AlreadyCommentedSession => "already-commented-session",
            SkipReason::AlreadyCommentedPersisted => "already-commented-persisted",
            SkipReason::ExistingSelfComment => "existing-self-comment",
            SkipReason::SimilarText => "similar-text",
            SkipReason::Promoted => "promoted",
            SkipReason::AlreadyLiked => "already-liked",
            SkipReason::AlreadyLikedSession => "already-liked-session",
            SkipReason::ContentUnavailable => "content-unavailable",
            SkipReason::BudgetExhausted => "budget-exhausted",
            SkipReason::LikedBeforeComment => "liked-before-comment",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub key: PostKey,
    pub action: ActionKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub processed_keys: HashSet<PostKey>,
    pub processed_fingerprints: HashSet<String>,
    pub liked_keys: HashSet<PostKey>,
    pub commented_keys: HashSet<PostKey>,
    pub actions_taken: u32,
    pub scroll_stall_count: u32,
}

/// Result of acquiring the persistent store at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLoad {
    Loaded(usize),
    Missing,
    Reset,
    /// The store exists but could not be read. Nothing is written back for
    /// the rest of the session.
    Unavailable,
}

// ── Similarity ────────────────────────────────────────────────────────

pub trait TextSimilarity: Send {
    fn is_similar(&self, candidate: &str, existing: &str) -> bool;
}

/// Signature containment first, Jaro-Winkler over normalized text second.
///
/// The signature is the first 32 characters of the candidate after
/// whitespace collapsing and symbol stripping; candidates shorter than 8
/// characters never match on signature.
pub struct SignatureSimilarity {
    threshold: f64,
}

impl SignatureSimilarity {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    fn signature(text: &str) -> Option<String> {
        let cleaned: String = normalize(text)
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace() || ".,!?@#:+-_".contains(*c))
            .collect();
        let cleaned = cleaned.trim();
        if cleaned.chars().count() < 8 {
            return None;
        }
        Some(cleaned.chars().take(32).collect())
    }
}

impl Default for SignatureSimilarity {
    fn default() -> Self {
        Self::new(0.92)
    }
}

impl TextSimilarity for SignatureSimilarity {
    fn is_similar(&self, candidate: &str, existing: &str) -> bool {
        let existing_norm = normalize(existing);
        if existing_norm.is_empty() {
            return false;
        }
        if let Some(sig) = Self::signature(candidate) {
            if existing_norm.contains(&sig) {
                return true;
            }
        }
        let candidate_norm = normalize(candidate);
        !candidate_norm.is_empty() && strsim::jaro_winkler(&candidate_norm, &existing_norm) >= self.threshold
    }
}

// ── Store ─────────────────────────────────────────────────────────────

pub struct DedupStore {
    state: SessionState,
    records: Vec<ActionRecord>,
    cache: PersistentCache,
    storage: Box<dyn CacheStorage>,
    similarity: Box<dyn TextSimilarity>,
    unflushed: bool,
    read_only: bool,
}

impl DedupStore {
    pub fn new(storage: Box<dyn CacheStorage>, similarity: Box<dyn TextSimilarity>) -> Self {
        Self {
            state: SessionState::default(),
            records: Vec::new(),
            cache: PersistentCache::default(),
            storage,
            similarity,
            unflushed: false,
            read_only: false,
        }
    }

    /// Acquire the persistent store. A malformed store is replaced by an
    /// empty one; a store that cannot be read is left untouched. The session
    /// never fails on either.
    pub fn load_persistent(&mut self) -> CacheLoad {
        match self.storage.load() {
            Ok(Some(file)) => {
                self.cache = PersistentCache::from_file(&file);
                tracing::info!(entries = self.cache.len(), "engage cache loaded");
                CacheLoad::Loaded(self.cache.len())
            }
            Ok(None) => {
                self.cache = PersistentCache::default();
                tracing::info!("no engage cache found, starting empty");
                CacheLoad::Missing
            }
            Err(e) if e.downcast_ref::<serde_json::Error>().is_some() => {
                self.cache = PersistentCache::default();
                self.unflushed = true;
                tracing::warn!(error = %format!("{:#}", e), "engage cache malformed, resetting to empty");
                CacheLoad::Reset
            }
            Err(e) => {
                self.cache = PersistentCache::default();
                self.read_only = true;
                tracing::warn!(error = %format!("{:#}", e), "engage cache unreadable, continuing without persistence");
                CacheLoad::Unavailable
            }
        }
    }

    pub fn flush_persistent(&mut self) -> Result<()> {
        if self.read_only {
            tracing::debug!("engage cache unavailable, flush skipped");
            self.unflushed = false;
            return Ok(());
        }
        let file = self.cache.to_file(Utc::now());
        self.storage.save(&file)?;
        self.unflushed = false;
        Ok(())
    }

    pub fn check_processed(&self, key: &PostKey, fingerprint: Option<&str>) -> Option<SkipReason> {
        if self.state.processed_keys.contains(key) {
            return Some(SkipReason::Processed);
        }
        if fingerprint.is_some_and(|fp| self.state.processed_fingerprints.contains(fp)) {
            return Some(SkipReason::Processed);
        }
        None
    }

    /// Idempotent. Returns true when the key was not yet processed.
    pub fn mark_processed(&mut self, key: &PostKey, fingerprint: Option<&str>) -> bool {
        if let Some(fp) = fingerprint {
            self.state.processed_fingerprints.insert(fp.to_string());
        }
        self.state.processed_keys.insert(key.clone())
    }

    pub fn should_skip(&self, key: &PostKey, action: ActionKind) -> Option<SkipReason> {
        match action {
            ActionKind::Comment => {
                if self.state.commented_keys.contains(key) {
                    return Some(SkipReason::AlreadyCommentedSession);
                }
                if key
                    .urn()
                    .is_some_and(|urn| self.cache.commented_within_retention(urn, Utc::now()))
                {
                    return Some(SkipReason::AlreadyCommentedPersisted);
                }
                None
            }
            ActionKind::Like => {
                if self.state.liked_keys.contains(key) {
                    return Some(SkipReason::AlreadyLikedSession);
                }
                None
            }
        }
    }

    pub fn self_comment_conflict(&self, item: &ContentItem) -> Option<SkipReason> {
        item.visible_comments
            .iter()
            .any(|c| c.by_self)
            .then_some(SkipReason::ExistingSelfComment)
    }

    pub fn similar_text_conflict(&self, item: &ContentItem, candidate: &str) -> Option<SkipReason> {
        item.visible_comments
            .iter()
            .any(|c| self.similarity.is_similar(candidate, &c.text))
            .then_some(SkipReason::SimilarText)
    }

    /// Record a verified action. Comments on URN-keyed items are persisted
    /// and flushed immediately; a failed flush is logged and retried at the
    /// next checkpoint.
    pub fn record_action(&mut self, key: &PostKey, action: ActionKind) -> &ActionRecord {
        let now = Utc::now();
        match action {
            ActionKind::Like => {
                self.state.liked_keys.insert(key.clone());
            }
            ActionKind::Comment => {
                self.state.commented_keys.insert(key.clone());
                if let Some(urn) = key.urn() {
                    self.cache.record_comment(urn, now);
                    self.unflushed = true;
                    if let Err(e) = self.flush_persistent() {
                        tracing::warn!(key = %key, error = %format!("{:#}", e), "engage cache flush failed");
                    }
                }
            }
        }
        self.records.push(ActionRecord { key: key.clone(), action, timestamp: now });
        &self.records[self.records.len() - 1]
    }

    pub fn count_action(&mut self) -> u32 {
        self.state.actions_taken += 1;
        self.state.actions_taken
    }

    pub fn actions_taken(&self) -> u32 {
        self.state.actions_taken
    }

    pub fn set_scroll_stall_count(&mut self, stalls: u32) {
        self.state.scroll_stall_count = stalls;
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn persisted_entries(&self) -> usize {
        self.cache.len()
    }
}

impl Drop for DedupStore {
    fn drop(&mut self) {
        if self.unflushed {
            if let Err(e) = self.flush_persistent() {
                tracing::warn!(error = %format!("{:#}", e), "engage cache flush on drop failed");
            }
        }
    }
}
