use crate::engine::mention::{MentionPosition, MentionTarget};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub engage: EngageConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub scroll: ScrollConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngageMode {
    Like,
    Comment,
    Both,
}

impl EngageMode {
    pub fn comments(self) -> bool {
        matches!(self, EngageMode::Comment | EngageMode::Both)
    }

    pub fn likes(self) -> bool {
        matches!(self, EngageMode::Like | EngageMode::Both)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngageConfig {
    pub mode: EngageMode,
    #[serde(default = "default_max_actions")]
    pub max_actions: u32,
    /// Ignore `max_actions` and keep going until cancelled.
    #[serde(default)]
    pub infinite: bool,
    #[serde(default)]
    pub include_promoted: bool,
    #[serde(default)]
    pub comment_text: Option<String>,
    #[serde(default)]
    pub comment_pool: Vec<String>,
    #[serde(default)]
    pub mention_author: bool,
    #[serde(default)]
    pub mention_position: MentionPosition,
    #[serde(default)]
    pub mentions: Vec<MentionTarget>,
    /// In comment-only mode, leave posts the account already liked alone.
    #[serde(default)]
    pub skip_liked_in_comment_mode: bool,
}

fn default_max_actions() -> u32 { 12 }

/// Delay windows in milliseconds.
#[derive(Debug, Deserialize, Clone)]
pub struct PacingConfig {
    #[serde(default = "default_action_min")]
    pub action_min_ms: u64,
    #[serde(default = "default_action_max")]
    pub action_max_ms: u64,
    #[serde(default = "default_scroll_min")]
    pub scroll_min_ms: u64,
    #[serde(default = "default_scroll_max")]
    pub scroll_max_ms: u64,
    #[serde(default = "default_extended_extra_min")]
    pub extended_extra_min_ms: u64,
    #[serde(default = "default_extended_extra_max")]
    pub extended_extra_max_ms: u64,
    /// Fixed RNG seed for reproducible delays.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_action_min() -> u64 { 1000 }
fn default_action_max() -> u64 { 3000 }
fn default_scroll_min() -> u64 { 1500 }
fn default_scroll_max() -> u64 { 3000 }
fn default_extended_extra_min() -> u64 { 800 }
fn default_extended_extra_max() -> u64 { 1600 }

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            action_min_ms: default_action_min(),
            action_max_ms: default_action_max(),
            scroll_min_ms: default_scroll_min(),
            scroll_max_ms: default_scroll_max(),
            extended_extra_min_ms: default_extended_extra_min(),
            extended_extra_max_ms: default_extended_extra_max(),
            seed: None,
        }
    }
}

impl PacingConfig {
    /// All windows collapsed to zero. Used by replay runs and tests.
    pub fn immediate() -> Self {
        Self {
            action_min_ms: 0,
            action_max_ms: 0,
            scroll_min_ms: 0,
            scroll_max_ms: 0,
            extended_extra_min_ms: 0,
            extended_extra_max_ms: 0,
            seed: Some(0),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrollConfig {
    #[serde(default = "default_aggressive_attempts")]
    pub aggressive_attempts: u32,
    #[serde(default = "default_nudge_up")]
    pub nudge_up_fraction: f64,
    #[serde(default = "default_nudge_down")]
    pub nudge_down_fraction: f64,
}

fn default_aggressive_attempts() -> u32 { 3 }
fn default_nudge_up() -> f64 { 0.2 }
fn default_nudge_down() -> f64 { 0.8 }

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            aggressive_attempts: default_aggressive_attempts(),
            nudge_up_fraction: default_nudge_up(),
            nudge_down_fraction: default_nudge_down(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("logs/engage_state.json")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { path: default_cache_path() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_similarity_threshold() -> f64 { 0.92 }

impl Default for DedupConfig {
    fn default() -> Self {
        Self { similarity_threshold: default_similarity_threshold() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    /// tracing-subscriber filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("feed-engage.log")
}

fn default_log_filter() -> String {
    "feed_engage=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file: default_log_file(), filter: default_log_filter() }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.pacing;
        if p.action_min_ms > p.action_max_ms {
            anyhow::bail!("pacing.action_min_ms ({}) exceeds action_max_ms ({})", p.action_min_ms, p.action_max_ms);
        }
        if p.scroll_min_ms > p.scroll_max_ms {
            anyhow::bail!("pacing.scroll_min_ms ({}) exceeds scroll_max_ms ({})", p.scroll_min_ms, p.scroll_max_ms);
        }
        if p.extended_extra_min_ms > p.extended_extra_max_ms {
            anyhow::bail!(
                "pacing.extended_extra_min_ms ({}) exceeds extended_extra_max_ms ({})",
                p.extended_extra_min_ms,
                p.extended_extra_max_ms
            );
        }
        if self.engage.max_actions == 0 && !self.engage.infinite {
            anyhow::bail!("engage.max_actions must be positive unless engage.infinite is set");
        }
        if !(0.0..=1.0).contains(&self.dedup.similarity_threshold) {
            anyhow::bail!("dedup.similarity_threshold must be within 0..=1");
        }
        if self.engage.mode.comments() {
            let has_pool = self.engage.comment_pool.iter().any(|t| !t.trim().is_empty());
            let has_text = self.engage.comment_text.as_deref().is_some_and(|t| !t.trim().is_empty());
            if !has_pool && !has_text {
                anyhow::bail!("mode {:?} needs engage.comment_text or engage.comment_pool", self.engage.mode);
            }
        }
        Ok(())
    }
}
