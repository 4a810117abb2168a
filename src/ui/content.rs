//! Built-in comment sources.

use super::types::ContentItem;
use super::ContentSource;
use crate::config::EngageConfig;
use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Always returns the same configured text.
pub struct StaticComment {
    text: String,
}

impl StaticComment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl ContentSource for StaticComment {
    async fn produce_comment_text(&mut self, _item: &ContentItem) -> Result<String> {
        Ok(self.text.clone())
    }
}

/// Picks a random entry from a pool, never the same entry twice in a row.
pub struct CommentPool {
    texts: Vec<String>,
    last: Option<usize>,
    rng: StdRng,
}

impl CommentPool {
    pub fn new(texts: Vec<String>) -> Self {
        Self::with_rng(texts, StdRng::from_entropy())
    }

    pub fn seeded(texts: Vec<String>, seed: u64) -> Self {
        Self::with_rng(texts, StdRng::seed_from_u64(seed))
    }

    fn with_rng(texts: Vec<String>, rng: StdRng) -> Self {
        let texts = texts
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        Self { texts, last: None, rng }
    }
}

#[async_trait]
impl ContentSource for CommentPool {
    async fn produce_comment_text(&mut self, _item: &ContentItem) -> Result<String> {
        let n = self.texts.len();
        if n == 0 {
            anyhow::bail!("comment pool is empty");
        }
        let mut idx = self.rng.gen_range(0..n);
        if n > 1 && Some(idx) == self.last {
            idx = (idx + 1) % n;
        }
        self.last = Some(idx);
        Ok(self.texts[idx].clone())
    }
}

/// Build the content source described by `[engage]`: the pool wins over a
/// single static text when both are set.
pub fn from_config(engage: &EngageConfig) -> Result<Box<dyn ContentSource>> {
    if engage.comment_pool.iter().any(|t| !t.trim().is_empty()) {
        return Ok(Box::new(CommentPool::new(engage.comment_pool.clone())));
    }
    match engage.comment_text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(Box::new(StaticComment::new(text))),
        _ => anyhow::bail!("no comment text configured (set engage.comment_text or engage.comment_pool)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_comment_returns_text() {
        let mut source = StaticComment::new("Great point!");
        let text = source.produce_comment_text(&ContentItem::default()).await.unwrap();
        assert_eq!(text, "Great point!");
    }

    #[tokio::test]
    async fn test_pool_never_repeats_back_to_back() {
        let mut pool = CommentPool::seeded(vec!["a".into(), "b".into(), "c".into()], 7);
        let item = ContentItem::default();
        let mut prev = pool.produce_comment_text(&item).await.unwrap();
        for _ in 0..50 {
            let next = pool.produce_comment_text(&item).await.unwrap();
            assert_ne!(next, prev);
            prev = next;
        }
    }

    #[tokio::test]
    async fn test_pool_single_entry_repeats() {
        let mut pool = CommentPool::seeded(vec!["only".into()], 1);
        let item = ContentItem::default();
        assert_eq!(pool.produce_comment_text(&item).await.unwrap(), "only");
        assert_eq!(pool.produce_comment_text(&item).await.unwrap(), "only");
    }

    #[tokio::test]
    async fn test_from_config_prefers_pool() {
        let config = crate::config::Config::parse(
            "[engage]\nmode = \"comment\"\ncomment_text = \"static\"\ncomment_pool = [\"pooled\"]\n",
        )
        .unwrap();
        let mut source = from_config(&config.engage).unwrap();
        assert_eq!(source.produce_comment_text(&ContentItem::default()).await.unwrap(), "pooled");
    }

    #[test]
    fn test_from_config_without_text_fails() {
        let config = crate::config::Config::parse("[engage]\nmode = \"like\"\n").unwrap();
        assert!(from_config(&config.engage).is_err());
    }

    #[tokio::test]
    async fn test_empty_pool_fails() {
        let mut pool = CommentPool::seeded(vec!["   ".into()], 1);
        assert!(pool.produce_comment_text(&ContentItem::default()).await.is_err());
    }
}
