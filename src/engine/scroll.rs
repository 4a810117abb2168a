//! Lazy-load driver with bounded stall recovery.
//!
//! One `discover` call scrolls until either new content shows up (page grew
//! or an unseen PostKey became visible) or every recovery step has been
//! tried without effect.
//!
//! ```text
//! Scrolling -> Stalled -> ExtendedWait -> AggressiveRecovery{1..=cap} -> Terminated
//!     ^           |             |                    |
//!     +-----------+-------------+--------------------+   (progress)
//! ```

use super::identity::{self, PostKey};
use super::pacing::{Cancellation, PaceKind, Pacer};
use crate::config::ScrollConfig;
use crate::ui::{FeedSurface, UiResult};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollState {
    Scrolling,
    Stalled,
    ExtendedWait,
    AggressiveRecovery { attempt: u32 },
    Terminated,
}

impl fmt::Display for ScrollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrollState::Scrolling => f.write_str("scrolling"),
            ScrollState::Stalled => f.write_str("stalled"),
            ScrollState::ExtendedWait => f.write_str("extended-wait"),
            ScrollState::AggressiveRecovery { attempt } => write!(f, "aggressive-recovery#{}", attempt),
            ScrollState::Terminated => f.write_str("terminated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    NewContent,
    Exhausted,
    Cancelled,
}

/// What the feed looked like at one measurement.
#[derive(Debug, Default)]
struct Snapshot {
    height: u64,
    keys: HashSet<PostKey>,
}

impl Snapshot {
    fn progressed_from(&self, baseline: &Snapshot) -> bool {
        self.height > baseline.height || self.keys.iter().any(|k| !baseline.keys.contains(k))
    }
}

pub struct ScrollController {
    config: ScrollConfig,
    state: ScrollState,
    trail: Vec<ScrollState>,
    stall_count: u32,
    total_stalls: u32,
}

impl ScrollController {
    pub fn new(config: ScrollConfig) -> Self {
        Self {
            config,
            state: ScrollState::Scrolling,
            trail: Vec::new(),
            stall_count: 0,
            total_stalls: 0,
        }
    }

    pub fn state(&self) -> ScrollState {
        self.state
    }

    /// Every state entered during the most recent `discover` call.
    pub fn trail(&self) -> &[ScrollState] {
        &self.trail
    }

    /// Consecutive re-measurements without progress.
    pub fn stall_count(&self) -> u32 {
        self.stall_count
    }

    pub fn total_stalls(&self) -> u32 {
        self.total_stalls
    }

    /// Back to `Scrolling` after exhaustion, for infinite runs.
    pub fn reset(&mut self) {
        self.state = ScrollState::Scrolling;
        self.stall_count = 0;
        self.trail.clear();
    }

    pub async fn discover(
        &mut self,
        ui: &mut dyn FeedSurface,
        pacer: &mut Pacer,
        cancel: &Cancellation,
    ) -> UiResult<Discovery> {
        self.trail.clear();
        if self.state == ScrollState::Terminated {
            return Ok(Discovery::Exhausted);
        }
        let baseline = measure(ui).await?;
        self.enter(ScrollState::Scrolling);

        loop {
            if cancel.is_cancelled() {
                return Ok(Discovery::Cancelled);
            }
            let completed = match self.state {
                ScrollState::Scrolling => {
                    tolerate(ui.scroll_to_bottom().await, "scroll to bottom")?;
                    pacer.delay(PaceKind::Scroll, cancel).await
                }
                ScrollState::Stalled => {
                    tolerate(ui.send_end_key().await, "end key")?;
                    pacer.delay(PaceKind::Scroll, cancel).await
                }
                ScrollState::ExtendedWait => pacer.extended_wait(cancel).await,
                ScrollState::AggressiveRecovery { .. } => self.recover(ui, pacer, cancel).await?,
                ScrollState::Terminated => return Ok(Discovery::Exhausted),
            };
            if !completed {
                return Ok(Discovery::Cancelled);
            }

            let current = measure(ui).await?;
            if current.progressed_from(&baseline) {
                self.stall_count = 0;
                if self.state != ScrollState::Scrolling {
                    tracing::info!(from = %self.state, "feed resumed loading");
                    self.enter(ScrollState::Scrolling);
                }
                return Ok(Discovery::NewContent);
            }

            self.stall_count += 1;
            self.total_stalls += 1;
            let next = self.next_state();
            if next != ScrollState::Stalled {
                tracing::warn!(from = %self.state, to = %next, height = current.height, "feed stall escalated");
            }
            self.enter(next);
            if next == ScrollState::Terminated {
                return Ok(Discovery::Exhausted);
            }
        }
    }

    fn next_state(&self) -> ScrollState {
        let cap = self.config.aggressive_attempts;
        match self.state {
            ScrollState::Scrolling => ScrollState::Stalled,
            ScrollState::Stalled => ScrollState::ExtendedWait,
            ScrollState::ExtendedWait if cap > 0 => ScrollState::AggressiveRecovery { attempt: 1 },
            ScrollState::AggressiveRecovery { attempt } if attempt < cap => {
                ScrollState::AggressiveRecovery { attempt: attempt + 1 }
            }
            _ => ScrollState::Terminated,
        }
    }

    /// Nudge up, settle, scroll down, clear overlays, bottom scroll.
    async fn recover(
        &mut self,
        ui: &mut dyn FeedSurface,
        pacer: &mut Pacer,
        cancel: &Cancellation,
    ) -> UiResult<bool> {
        tolerate(ui.scroll_by_viewport(-self.config.nudge_up_fraction).await, "nudge up")?;
        if !pacer.short_pause(cancel).await {
            return Ok(false);
        }
        tolerate(ui.scroll_by_viewport(self.config.nudge_down_fraction).await, "nudge down")?;
        tolerate(ui.dismiss_overlay().await, "dismiss overlay")?;
        tolerate(ui.scroll_to_bottom().await, "scroll to bottom")?;
        Ok(pacer.delay(PaceKind::Scroll, cancel).await)
    }

    fn enter(&mut self, state: ScrollState) {
        self.state = state;
        self.trail.push(state);
    }
}

async fn measure(ui: &mut dyn FeedSurface) -> UiResult<Snapshot> {
    let height = match ui.page_height().await {
        Ok(h) => h,
        Err(e) if !e.is_fatal() => {
            tracing::warn!(error = %e, "page height unavailable");
            0
        }
        Err(e) => return Err(e),
    };
    let keys = match ui.find_visible_items().await {
        Ok(items) => items.iter().map(identity::resolve).collect(),
        Err(e) if !e.is_fatal() => {
            tracing::warn!(error = %e, "visible items unavailable");
            HashSet::new()
        }
        Err(e) => return Err(e),
    };
    Ok(Snapshot { height, keys })
}

/// Swallow item-scoped UI failures during scrolling; they count as no progress.
fn tolerate(result: UiResult<()>, step: &str) -> UiResult<()> {
    match result {
        Err(e) if !e.is_fatal() => {
            tracing::warn!(step, error = %e, "scroll step failed");
            Ok(())
        }
        other => other,
    }
}
