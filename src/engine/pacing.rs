//! Randomized delays between actions and scrolls, plus the cancellation
//! signal every wait observes.

use crate::config::PacingConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::watch;

const SHORT_PAUSE_MS: (u64, u64) = (300, 700);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceKind {
    Action,
    Scroll,
}

/// Inclusive millisecond window. Inverted bounds are swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Window {
    pub fn new(a: u64, b: u64) -> Self {
        Self { min_ms: a.min(b), max_ms: a.max(b) }
    }

    fn sample(&self, rng: &mut StdRng) -> Duration {
        if self.min_ms == self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

pub struct Pacer {
    action: Window,
    scroll: Window,
    extended_extra: Window,
    rng: StdRng,
}

impl Pacer {
    pub fn new(config: &PacingConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            action: Window::new(config.action_min_ms, config.action_max_ms),
            scroll: Window::new(config.scroll_min_ms, config.scroll_max_ms),
            extended_extra: Window::new(config.extended_extra_min_ms, config.extended_extra_max_ms),
            rng,
        }
    }

    pub fn seeded(config: &PacingConfig, seed: u64) -> Self {
        let mut pacer = Self::new(config);
        pacer.rng = StdRng::seed_from_u64(seed);
        pacer
    }

    pub fn window(&self, kind: PaceKind) -> Window {
        match kind {
            PaceKind::Action => self.action,
            PaceKind::Scroll => self.scroll,
        }
    }

    pub fn sample(&mut self, kind: PaceKind) -> Duration {
        let window = self.window(kind);
        window.sample(&mut self.rng)
    }

    /// Upper scroll bound plus a random extra.
    pub fn sample_extended(&mut self) -> Duration {
        Duration::from_millis(self.scroll.max_ms) + self.extended_extra.sample(&mut self.rng)
    }

    /// Brief settle time inside recovery, never longer than an action delay.
    pub fn sample_short(&mut self) -> Duration {
        let max = SHORT_PAUSE_MS.1.min(self.action.max_ms);
        let min = SHORT_PAUSE_MS.0.min(max);
        Window::new(min, max).sample(&mut self.rng)
    }

    /// Returns false when the wait was cut short by cancellation.
    pub async fn delay(&mut self, kind: PaceKind, cancel: &Cancellation) -> bool {
        let d = self.sample(kind);
        cancel.sleep(d).await
    }

    pub async fn extended_wait(&mut self, cancel: &Cancellation) -> bool {
        let d = self.sample_extended();
        tracing::debug!(wait_ms = d.as_millis() as u64, "extended wait");
        cancel.sleep(d).await
    }

    pub async fn short_pause(&mut self, cancel: &Cancellation) -> bool {
        let d = self.sample_short();
        cancel.sleep(d).await
    }
}

/// Cooperative stop signal. Observed between steps and during every wait.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn channel() -> (watch::Sender<bool>, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (tx, Cancellation { rx })
    }

    /// A signal that is never raised.
    pub fn never() -> Cancellation {
        let (_tx, rx) = watch::channel(false);
        Cancellation { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep for `d` unless cancelled first. Returns false if cancelled.
    pub async fn sleep(&self, d: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        if d.is_zero() {
            return true;
        }
        let mut rx = self.rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(d) => !self.is_cancelled(),
            _ = wait_raised(&mut rx) => false,
        }
    }
}

async fn wait_raised(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: the flag can no longer change.
            std::future::pending::<()>().await;
        }
    }
}
