//! One traversal run: dispatch every visible item, scroll for more, repeat
//! until the budget is spent, the feed runs dry or the run is cancelled.

use super::cache::JsonFileStorage;
use super::dedup::{DedupStore, SignatureSimilarity, SkipReason};
use super::dispatcher::{Collaborators, DispatchSettings, Dispatcher, ItemReport, StepResult};
use super::pacing::{Cancellation, Pacer};
use super::scroll::{Discovery, ScrollController};
use crate::config::Config;
use crate::ui::UiResult;
use anyhow::Result;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    BudgetReached,
    Cancelled,
    FeedExhausted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Termination::BudgetReached => "budget-reached",
            Termination::Cancelled => "cancelled",
            Termination::FeedExhausted => "feed-exhausted",
        })
    }
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub termination: Termination,
    pub actions_taken: u32,
    /// Every item seen for the first time, in dispatch order.
    pub items: Vec<ItemReport>,
    pub scroll_stalls: u32,
}

impl SessionReport {
    pub fn comments(&self) -> usize {
        self.items.iter().filter(|r| r.comment == StepResult::Done).count()
    }

    pub fn likes(&self) -> usize {
        self.items.iter().filter(|r| r.like == StepResult::Done).count()
    }

    pub fn courtesy_likes(&self) -> usize {
        self.items.iter().filter(|r| r.like == StepResult::Courtesy).count()
    }

    pub fn failures(&self) -> usize {
        self.items
            .iter()
            .filter(|r| matches!(r.comment, StepResult::Failed(_)) || matches!(r.like, StepResult::Failed(_)))
            .count()
    }

    pub fn skipped(&self, reason: SkipReason) -> usize {
        self.items
            .iter()
            .filter(|r| {
                r.skipped == Some(reason)
                    || r.comment == StepResult::Skipped(reason)
                    || r.like == StepResult::Skipped(reason)
            })
            .count()
    }
}

pub struct EngagementSession {
    dispatcher: Dispatcher,
    scroll: ScrollController,
    store: DedupStore,
    pacer: Pacer,
    cancel: Cancellation,
}

impl EngagementSession {
    pub fn new(config: &Config, store: DedupStore, pacer: Pacer, cancel: Cancellation) -> Self {
        Self {
            dispatcher: Dispatcher::new(DispatchSettings::from(&config.engage)),
            scroll: ScrollController::new(config.scroll.clone()),
            store,
            pacer,
            cancel,
        }
    }

    /// File-backed cache and configured pacing.
    pub fn from_config(config: &Config, cancel: Cancellation) -> Self {
        let store = DedupStore::new(
            Box::new(JsonFileStorage::new(&config.cache.path)),
            Box::new(SignatureSimilarity::new(config.dedup.similarity_threshold)),
        );
        Self::new(config, store, Pacer::new(&config.pacing), cancel)
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    pub fn scroll(&self) -> &ScrollController {
        &self.scroll
    }

    /// Run to termination. The cache is flushed on every exit path; a
    /// session-fatal UI error is returned with its cause attached.
    pub async fn run(&mut self, collab: &mut Collaborators<'_>) -> Result<SessionReport> {
        self.store.load_persistent();
        tracing::info!(
            mode = ?self.dispatcher.settings().mode,
            max_actions = self.dispatcher.settings().max_actions,
            infinite = self.dispatcher.settings().infinite,
            "engagement session started"
        );

        let mut items = Vec::new();
        let outcome = self.traverse(collab, &mut items).await;
        self.store.set_scroll_stall_count(self.scroll.total_stalls());

        if let Err(e) = self.store.flush_persistent() {
            tracing::warn!(error = %format!("{:#}", e), "engage cache flush failed at session end");
        }

        match outcome {
            Ok(termination) => {
                let report = SessionReport {
                    termination,
                    actions_taken: self.store.actions_taken(),
                    items,
                    scroll_stalls: self.scroll.total_stalls(),
                };
                tracing::info!(
                    termination = %termination,
                    actions_taken = report.actions_taken,
                    comments = report.comments(),
                    likes = report.likes(),
                    courtesy_likes = report.courtesy_likes(),
                    failures = report.failures(),
                    "engagement session finished"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    actions_taken = self.store.actions_taken(),
                    "engagement session aborted"
                );
                Err(anyhow::Error::new(e).context("engagement session terminated"))
            }
        }
    }

    async fn traverse(
        &mut self,
        collab: &mut Collaborators<'_>,
        items: &mut Vec<ItemReport>,
    ) -> UiResult<Termination> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Termination::Cancelled);
            }
            if self.dispatcher.budget_reached(&self.store) {
                return Ok(Termination::BudgetReached);
            }

            let visible = match collab.ui.find_visible_items().await {
                Ok(visible) => visible,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "visible items unavailable");
                    Vec::new()
                }
            };

            for item in &visible {
                if self.cancel.is_cancelled() {
                    return Ok(Termination::Cancelled);
                }
                if self.dispatcher.budget_reached(&self.store) {
                    return Ok(Termination::BudgetReached);
                }
                let report = self
                    .dispatcher
                    .handle(item, &mut self.store, &mut self.pacer, &self.cancel, collab)
                    .await?;
                if report.skipped != Some(SkipReason::Processed) {
                    items.push(report);
                }
            }

            match self.scroll.discover(collab.ui, &mut self.pacer, &self.cancel).await? {
                Discovery::NewContent => {}
                Discovery::Cancelled => return Ok(Termination::Cancelled),
                Discovery::Exhausted if self.dispatcher.settings().infinite => {
                    tracing::warn!(stalls = self.scroll.total_stalls(), "feed exhausted, waiting before retrying");
                    self.scroll.reset();
                    if !self.pacer.extended_wait(&self.cancel).await {
                        return Ok(Termination::Cancelled);
                    }
                }
                Discovery::Exhausted => return Ok(Termination::FeedExhausted),
            }
        }
    }
}
