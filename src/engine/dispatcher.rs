//! Per-item decision and execution.
//!
//! Order per item: identity, processed check, promoted filter, then the
//! comment step and the like step as the mode requires. Item-scoped UI
//! failures end the step; session-fatal ones propagate.

use super::dedup::{DedupStore, SkipReason};
use super::identity::{self, PostKey};
use super::mention::{self, ComposeStep, DroppedMention, MentionPlan, MentionPosition, MentionTarget};
use super::pacing::{Cancellation, PaceKind, Pacer};
use crate::config::{EngageConfig, EngageMode};
use crate::ui::types::{ActionKind, ContentItem};
use crate::ui::{ContentSource, FeedSurface, MentionResolver, UiError, UiResult};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub mode: EngageMode,
    pub max_actions: u32,
    pub infinite: bool,
    pub include_promoted: bool,
    pub mention_author: bool,
    pub mention_position: MentionPosition,
    pub mentions: Vec<MentionTarget>,
    pub skip_liked_in_comment_mode: bool,
}

impl From<&EngageConfig> for DispatchSettings {
    fn from(cfg: &EngageConfig) -> Self {
        Self {
            mode: cfg.mode,
            max_actions: cfg.max_actions,
            infinite: cfg.infinite,
            include_promoted: cfg.include_promoted,
            mention_author: cfg.mention_author,
            mention_position: cfg.mention_position,
            mentions: cfg.mentions.clone(),
            skip_liked_in_comment_mode: cfg.skip_liked_in_comment_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    NotRequested,
    Done,
    /// Uncounted like following a comment in comment-only mode.
    Courtesy,
    Skipped(SkipReason),
    Failed(String),
}

impl StepResult {
    pub fn succeeded(&self) -> bool {
        matches!(self, StepResult::Done | StepResult::Courtesy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionOutcome {
    Linked(String),
    /// No suggestion matched; the `@Name` text stays unlinked.
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub key: PostKey,
    /// Set when the whole item was passed over before any step ran.
    pub skipped: Option<SkipReason>,
    pub comment: StepResult,
    pub like: StepResult,
    pub mentions: Vec<MentionOutcome>,
    pub dropped_mentions: Vec<DroppedMention>,
}

impl ItemReport {
    fn new(key: PostKey) -> Self {
        Self {
            key,
            skipped: None,
            comment: StepResult::NotRequested,
            like: StepResult::NotRequested,
            mentions: Vec::new(),
            dropped_mentions: Vec::new(),
        }
    }

    fn skipped(key: PostKey, reason: SkipReason) -> Self {
        Self { skipped: Some(reason), ..Self::new(key) }
    }

    pub fn acted(&self) -> bool {
        self.comment.succeeded() || self.like.succeeded()
    }
}

/// The UI-facing collaborators one item needs.
pub struct Collaborators<'a> {
    pub ui: &'a mut dyn FeedSurface,
    pub content: &'a mut dyn ContentSource,
    pub mentions: &'a mut dyn MentionResolver,
}

pub struct Dispatcher {
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(settings: DispatchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Whether another counted action fits the budget.
    pub fn can_act(&self, store: &DedupStore) -> bool {
        self.settings.infinite || store.actions_taken() < self.settings.max_actions
    }

    pub fn budget_reached(&self, store: &DedupStore) -> bool {
        !self.can_act(store)
    }

    pub async fn handle(
        &self,
        item: &ContentItem,
        store: &mut DedupStore,
        pacer: &mut Pacer,
        cancel: &Cancellation,
        collab: &mut Collaborators<'_>,
    ) -> UiResult<ItemReport> {
        let key = identity::resolve(item);
        let fingerprint = identity::fingerprint(item);
        if let Some(reason) = store.check_processed(&key, fingerprint.as_deref()) {
            tracing::debug!(key = %key, reason = %reason, "item skipped");
            return Ok(ItemReport::skipped(key, reason));
        }
        store.mark_processed(&key, fingerprint.as_deref());

        if item.is_promoted && !self.settings.include_promoted {
            tracing::info!(key = %key, reason = %SkipReason::Promoted, "item skipped");
            return Ok(ItemReport::skipped(key, SkipReason::Promoted));
        }

        let mut report = ItemReport::new(key.clone());
        if self.settings.mode.comments() {
            let comment = self.comment_step(item, &key, store, pacer, cancel, collab, &mut report).await?;
            report.comment = comment;
        }
        report.like = if self.settings.mode.likes() {
            self.like_step(item, &key, store, pacer, cancel, collab.ui, true).await?
        } else if report.comment == StepResult::Done {
            match self.like_step(item, &key, store, pacer, cancel, collab.ui, false).await? {
                StepResult::Done => StepResult::Courtesy,
                other => other,
            }
        } else {
            StepResult::NotRequested
        };
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn comment_step(
        &self,
        item: &ContentItem,
        key: &PostKey,
        store: &mut DedupStore,
        pacer: &mut Pacer,
        cancel: &Cancellation,
        collab: &mut Collaborators<'_>,
        report: &mut ItemReport,
    ) -> UiResult<StepResult> {
        if self.budget_reached(store) {
            return Ok(skip(key, ActionKind::Comment, SkipReason::BudgetExhausted));
        }
        if let Some(reason) = store.should_skip(key, ActionKind::Comment) {
            return Ok(skip(key, ActionKind::Comment, reason));
        }
        if self.settings.mode == EngageMode::Comment
            && self.settings.skip_liked_in_comment_mode
            && item.already_liked
        {
            return Ok(skip(key, ActionKind::Comment, SkipReason::LikedBeforeComment));
        }
        if let Some(reason) = store.self_comment_conflict(item) {
            return Ok(skip(key, ActionKind::Comment, reason));
        }

        let text = match collab.content.produce_comment_text(item).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                tracing::warn!(key = %key, "content source returned blank text");
                return Ok(skip(key, ActionKind::Comment, SkipReason::ContentUnavailable));
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %format!("{:#}", e), "content source failed");
                return Ok(skip(key, ActionKind::Comment, SkipReason::ContentUnavailable));
            }
        };
        if let Some(reason) = store.similar_text_conflict(item, &text) {
            return Ok(skip(key, ActionKind::Comment, reason));
        }

        let targets = self.mention_targets(item, &text);
        let plan = mention::place(&text, &targets, self.settings.mention_position);
        report.dropped_mentions = plan.dropped.clone();

        match compose_and_submit(item, &plan, collab, &mut report.mentions).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(key = %key, action = %ActionKind::Comment, reason = %e, "action failed");
                return Ok(StepResult::Failed(e.to_string()));
            }
        }

        store.record_action(key, ActionKind::Comment);
        let taken = store.count_action();
        tracing::info!(key = %key, actions_taken = taken, text = %plan.text, "comment posted");
        pacer.delay(PaceKind::Action, cancel).await;
        Ok(StepResult::Done)
    }

    #[allow(clippy::too_many_arguments)]
    async fn like_step(
        &self,
        item: &ContentItem,
        key: &PostKey,
        store: &mut DedupStore,
        pacer: &mut Pacer,
        cancel: &Cancellation,
        ui: &mut dyn FeedSurface,
        counted: bool,
    ) -> UiResult<StepResult> {
        if counted && self.budget_reached(store) {
            return Ok(skip(key, ActionKind::Like, SkipReason::BudgetExhausted));
        }
        if let Some(reason) = store.should_skip(key, ActionKind::Like) {
            return Ok(skip(key, ActionKind::Like, reason));
        }
        if item.already_liked {
            return Ok(skip(key, ActionKind::Like, SkipReason::AlreadyLiked));
        }

        match click_and_verify(ui, item).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(key = %key, action = %ActionKind::Like, reason = %e, "action failed");
                return Ok(StepResult::Failed(e.to_string()));
            }
        }

        store.record_action(key, ActionKind::Like);
        if counted {
            let taken = store.count_action();
            tracing::info!(key = %key, actions_taken = taken, "post liked");
        } else {
            tracing::info!(key = %key, "courtesy like");
        }
        pacer.delay(PaceKind::Action, cancel).await;
        Ok(StepResult::Done)
    }

    /// Author mention first (unless the text already names them), then the
    /// configured mentions.
    fn mention_targets(&self, item: &ContentItem, text: &str) -> Vec<MentionTarget> {
        let mut targets = Vec::new();
        let author = item.author_name.trim();
        if self.settings.mention_author && !author.is_empty() && !mention::mentions_name(text, author) {
            targets.push(MentionTarget::new(author));
        }
        targets.extend(self.settings.mentions.iter().cloned());
        targets
    }
}

fn skip(key: &PostKey, action: ActionKind, reason: SkipReason) -> StepResult {
    tracing::info!(key = %key, action = %action, reason = %reason, "action skipped");
    StepResult::Skipped(reason)
}

async fn compose_and_submit(
    item: &ContentItem,
    plan: &MentionPlan,
    collab: &mut Collaborators<'_>,
    outcomes: &mut Vec<MentionOutcome>,
) -> UiResult<()> {
    let editor = collab.ui.open_comment_editor(item).await?;
    for step in &plan.steps {
        match step {
            ComposeStep::Type(text) => collab.ui.type_text(&editor, text).await?,
            ComposeStep::Caret(caret) => collab.ui.move_caret(&editor, *caret).await?,
            ComposeStep::Mention(name) => {
                collab.ui.type_text(&editor, &format!("@{}", name)).await?;
                match collab.mentions.resolve_mention(name).await {
                    Some(suggestion) => {
                        collab.ui.select_suggestion(&editor, &suggestion).await?;
                        outcomes.push(MentionOutcome::Linked(name.clone()));
                    }
                    None => {
                        tracing::warn!(name = %name, "no suggestion for mention, leaving plain text");
                        outcomes.push(MentionOutcome::Literal(name.clone()));
                    }
                }
            }
        }
    }
    collab.ui.submit_comment(&editor).await?;
    if !collab.ui.verify_action_succeeded(ActionKind::Comment, item).await? {
        return Err(UiError::NotVerified(ActionKind::Comment));
    }
    Ok(())
}

async fn click_and_verify(ui: &mut dyn FeedSurface, item: &ContentItem) -> UiResult<()> {
    ui.click_like(item).await?;
    if !ui.verify_action_succeeded(ActionKind::Like, item).await? {
        return Err(UiError::NotVerified(ActionKind::Like));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PacingConfig;
    use crate::engine::cache::MemoryStorage;
    use crate::engine::dedup::SignatureSimilarity;
    use crate::ui::content::StaticComment;
    use crate::ui::replay::{ReplayComment, ReplayDirectory, ReplayFeed, ReplayFixture, ReplayPage, ReplayPost, UiEvent};
    use crate::ui::types::VisibleComment;
    use async_trait::async_trait;

    struct FailingSource;

    #[async_trait]
    impl ContentSource for FailingSource {
        async fn produce_comment_text(&mut self, _item: &ContentItem) -> anyhow::Result<String> {
            anyhow::bail!("generator offline")
        }
    }

    fn settings(mode: EngageMode) -> DispatchSettings {
        DispatchSettings {
            mode,
            max_actions: 10,
            infinite: false,
            include_promoted: false,
            mention_author: false,
            mention_position: MentionPosition::Append,
            mentions: Vec::new(),
            skip_liked_in_comment_mode: false,
        }
    }

    fn post(urn: &str) -> ReplayPost {
        ReplayPost {
            urn: Some(urn.to_string()),
            author: "Jane Doe".into(),
            text: format!("Shipping update {}", urn),
            ..Default::default()
        }
    }

    struct Harness {
        ui: ReplayFeed,
        dir: ReplayDirectory,
        store: DedupStore,
        pacer: Pacer,
    }

    impl Harness {
        fn new(posts: Vec<ReplayPost>, known_names: Vec<&str>) -> Self {
            let ui = ReplayFeed::new(ReplayFixture {
                pages: vec![ReplayPage { polls_to_load: 1, posts }],
                known_names: known_names.into_iter().map(String::from).collect(),
                auth_lost_after_actions: None,
            });
            let dir = ui.directory();
            Self {
                ui,
                dir,
                store: DedupStore::new(Box::new(MemoryStorage::new()), Box::new(SignatureSimilarity::default())),
                pacer: Pacer::new(&PacingConfig::immediate()),
            }
        }

        async fn items(&mut self) -> Vec<ContentItem> {
            self.ui.find_visible_items().await.unwrap()
        }

        async fn handle_with(
            &mut self,
            dispatcher: &Dispatcher,
            item: &ContentItem,
            content: &mut dyn ContentSource,
        ) -> UiResult<ItemReport> {
            let mut collab = Collaborators { ui: &mut self.ui, content, mentions: &mut self.dir };
            dispatcher
                .handle(item, &mut self.store, &mut self.pacer, &Cancellation::never(), &mut collab)
                .await
        }

        async fn handle(&mut self, dispatcher: &Dispatcher, item: &ContentItem) -> UiResult<ItemReport> {
            let mut content = StaticComment::new("Congrats on shipping this!");
            self.handle_with(dispatcher, item, &mut content).await
        }
    }

    #[tokio::test]
    async fn test_both_mode_comments_then_likes() {
        let mut h = Harness::new(vec![post("a")], vec![]);
        let items = h.items().await;
        let report = h.handle(&Dispatcher::new(settings(EngageMode::Both)), &items[0]).await.unwrap();
        assert_eq!(report.comment, StepResult::Done);
        assert_eq!(report.like, StepResult::Done);
        let kinds: Vec<_> = h.store.records().iter().map(|r| r.action).collect();
        assert_eq!(kinds, vec![ActionKind::Comment, ActionKind::Like]);
        assert_eq!(h.store.actions_taken(), 2);
        let submit_at = h.ui.events().iter().position(|e| matches!(e, UiEvent::Submit { .. })).unwrap();
        let like_at = h.ui.events().iter().position(|e| matches!(e, UiEvent::Like(_))).unwrap();
        assert!(submit_at < like_at);
    }

    #[tokio::test]
    async fn test_comment_mode_adds_uncounted_courtesy_like() {
        let mut h = Harness::new(vec![post("a")], vec![]);
        let items = h.items().await;
        let report = h.handle(&Dispatcher::new(settings(EngageMode::Comment)), &items[0]).await.unwrap();
        assert_eq!(report.comment, StepResult::Done);
        assert_eq!(report.like, StepResult::Courtesy);
        assert_eq!(h.store.actions_taken(), 1);
        assert_eq!(h.ui.liked_urns(), vec![Some("a".to_string())]);
    }

    #[tokio::test]
    async fn test_like_mode_never_comments() {
        let mut h = Harness::new(vec![post("a")], vec![]);
        let items = h.items().await;
        let report = h.handle(&Dispatcher::new(settings(EngageMode::Like)), &items[0]).await.unwrap();
        assert_eq!(report.comment, StepResult::NotRequested);
        assert_eq!(report.like, StepResult::Done);
        assert!(h.ui.submitted_comments().is_empty());
    }

    #[tokio::test]
    async fn test_promoted_item_gets_no_submissions() {
        let mut h = Harness::new(vec![ReplayPost { promoted: true, ..post("ad") }], vec![]);
        let items = h.items().await;
        let report = h.handle(&Dispatcher::new(settings(EngageMode::Both)), &items[0]).await.unwrap();
        assert_eq!(report.skipped, Some(SkipReason::Promoted));
        assert!(h.ui.events().is_empty());
        assert!(h.store.records().is_empty());
    }

    #[tokio::test]
    async fn test_promoted_item_included_when_enabled() {
        let mut h = Harness::new(vec![ReplayPost { promoted: true, ..post("ad") }], vec![]);
        let items = h.items().await;
        let dispatcher = Dispatcher::new(DispatchSettings { include_promoted: true, ..settings(EngageMode::Like) });
        let report = h.handle(&dispatcher, &items[0]).await.unwrap();
        assert_eq!(report.like, StepResult::Done);
    }

    #[tokio::test]
    async fn test_second_pass_is_processed() {
        let mut h = Harness::new(vec![post("a")], vec![]);
        let dispatcher = Dispatcher::new(settings(EngageMode::Both));
        let items = h.items().await;
        h.handle(&dispatcher, &items[0]).await.unwrap();
        let again = h.items().await;
        let report = h.handle(&dispatcher, &again[0]).await.unwrap();
        assert_eq!(report.skipped, Some(SkipReason::Processed));
        assert_eq!(h.ui.submitted_comments().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_self_comment_blocks_comment() {
        let existing = ReplayPost {
            comments: vec![ReplayComment { by_self: true, text: "Posted yesterday".into() }],
            ..post("a")
        };
        let mut h = Harness::new(vec![existing], vec![]);
        let items = h.items().await;
        let report = h.handle(&Dispatcher::new(settings(EngageMode::Comment)), &items[0]).await.unwrap();
        assert_eq!(report.comment, StepResult::Skipped(SkipReason::ExistingSelfComment));
        assert_eq!(report.like, StepResult::NotRequested);
        assert!(!h.ui.events().iter().any(|e| matches!(e, UiEvent::OpenEditor(_))));
    }

    #[tokio::test]
    async fn test_similar_visible_comment_blocks_comment() {
        let mut h = Harness::new(vec![post("a")], vec![]);
        let mut items = h.items().await;
        items[0].visible_comments.push(VisibleComment {
            by_self: false,
            text: "Congrats on shipping this! Huge milestone.".into(),
        });
        let report = h.handle(&Dispatcher::new(settings(EngageMode::Both)), &items[0]).await.unwrap();
        assert_eq!(report.comment, StepResult::Skipped(SkipReason::SimilarText));
        assert_eq!(report.like, StepResult::Done);
    }

    #[tokio::test]
    async fn test_content_failure_skips_comment_only() {
        let mut h = Harness::new(vec![post("a")], vec![]);
        let items = h.items().await;
        let report = h
            .handle_with(&Dispatcher::new(settings(EngageMode::Both)), &items[0], &mut FailingSource)
            .await
            .unwrap();
        assert_eq!(report.comment, StepResult::Skipped(SkipReason::ContentUnavailable));
        assert_eq!(report.like, StepResult::Done);
    }

    #[tokio::test]
    async fn test_budget_exhausted_after_comment() {
        let mut h = Harness::new(vec![post("a")], vec![]);
        let items = h.items().await;
        let dispatcher = Dispatcher::new(DispatchSettings { max_actions: 1, ..settings(EngageMode::Both) });
        let report = h.handle(&dispatcher, &items[0]).await.unwrap();
        assert_eq!(report.comment, StepResult::Done);
        assert_eq!(report.like, StepResult::Skipped(SkipReason::BudgetExhausted));
        assert!(dispatcher.budget_reached(&h.store));
    }

    #[tokio::test]
    async fn test_infinite_ignores_budget() {
        let mut h = Harness::new(vec![post("a"), post("b")], vec![]);
        let items = h.items().await;
        let dispatcher = Dispatcher::new(DispatchSettings { max_actions: 1, infinite: true, ..settings(EngageMode::Like) });
        for item in &items {
            assert_eq!(h.handle(&dispatcher, item).await.unwrap().like, StepResult::Done);
        }
        assert!(dispatcher.can_act(&h.store));
    }

    #[tokio::test]
    async fn test_already_liked_item_not_clicked() {
        let mut h = Harness::new(vec![ReplayPost { liked: true, ..post("a") }], vec![]);
        let items = h.items().await;
        let report = h.handle(&Dispatcher::new(settings(EngageMode::Like)), &items[0]).await.unwrap();
        assert_eq!(report.like, StepResult::Skipped(SkipReason::AlreadyLiked));
        assert!(h.ui.liked_urns().is_empty());
    }

    #[tokio::test]
    async fn test_liked_before_comment_gate() {
        let mut h = Harness::new(vec![ReplayPost { liked: true, ..post("a") }], vec![]);
        let items = h.items().await;
        let dispatcher = Dispatcher::new(DispatchSettings {
            skip_liked_in_comment_mode: true,
            ..settings(EngageMode::Comment)
        });
        let report = h.handle(&dispatcher, &items[0]).await.unwrap();
        assert_eq!(report.comment, StepResult::Skipped(SkipReason::LikedBeforeComment));
    }

    #[tokio::test]
    async fn test_author_mention_linked() {
        let mut h = Harness::new(vec![post("a")], vec!["Jane Doe"]);
        let items = h.items().await;
        let dispatcher = Dispatcher::new(DispatchSettings { mention_author: true, ..settings(EngageMode::Comment) });
        let report = h.handle(&dispatcher, &items[0]).await.unwrap();
        assert_eq!(report.mentions, vec![MentionOutcome::Linked("Jane Doe".into())]);
        let submitted = &h.ui.submitted_comments()[0];
        assert_eq!(submitted.text, "Congrats on shipping this! @Jane Doe");
        assert_eq!(submitted.linked_mentions, vec!["Jane Doe".to_string()]);
    }

    #[tokio::test]
    async fn test_unresolved_mention_stays_literal() {
        let mut h = Harness::new(vec![post("a")], vec![]);
        let items = h.items().await;
        let dispatcher = Dispatcher::new(DispatchSettings {
            mentions: vec![MentionTarget::anchored("shipping", "Sam Lee"), MentionTarget::anchored("for the push", "Ana")],
            ..settings(EngageMode::Comment)
        });
        let report = h.handle(&dispatcher, &items[0]).await.unwrap();
        assert_eq!(report.comment, StepResult::Done);
        assert_eq!(report.mentions, vec![MentionOutcome::Literal("Sam Lee".into())]);
        assert_eq!(report.dropped_mentions.len(), 1);
        assert_eq!(h.ui.submitted_comments()[0].text, "Congrats on shipping @Sam Lee this!");
    }

    #[tokio::test]
    async fn test_author_already_named_not_duplicated() {
        let mut h = Harness::new(vec![post("a")], vec!["Jane Doe"]);
        let items = h.items().await;
        let dispatcher = Dispatcher::new(DispatchSettings { mention_author: true, ..settings(EngageMode::Comment) });
        let mut content = StaticComment::new("Well said @{Jane Doe}!");
        let report = h.handle_with(&dispatcher, &items[0], &mut content).await.unwrap();
        assert_eq!(report.mentions.len(), 1);
        assert_eq!(h.ui.submitted_comments()[0].text, "Well said @Jane Doe!");
    }

    #[tokio::test]
    async fn test_item_scoped_failures_become_failed_steps() {
        let mut h = Harness::new(
            vec![
                ReplayPost { stale: true, ..post("stale") },
                ReplayPost { no_editor: true, ..post("closed") },
                ReplayPost { unverifiable: true, ..post("ghost") },
            ],
            vec![],
        );
        let items = h.items().await;
        let dispatcher = Dispatcher::new(settings(EngageMode::Comment));
        for item in &items {
            let report = h.handle(&dispatcher, item).await.unwrap();
            assert!(matches!(report.comment, StepResult::Failed(_)), "{:?}", report);
            assert_eq!(report.like, StepResult::NotRequested);
        }
        assert_eq!(h.store.actions_taken(), 0);
        assert!(h.store.records().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_error_propagates() {
        let mut h = Harness::new(vec![post("a")], vec![]);
        h.ui = ReplayFeed::new(ReplayFixture {
            pages: vec![ReplayPage { polls_to_load: 1, posts: vec![post("a")] }],
            known_names: vec![],
            auth_lost_after_actions: Some(0),
        });
        let items = h.items().await;
        let err = h.handle(&Dispatcher::new(settings(EngageMode::Like)), &items[0]).await.unwrap_err();
        assert!(matches!(err, UiError::AuthenticationLost));
    }
}
