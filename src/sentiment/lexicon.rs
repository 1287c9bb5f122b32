use once_cell::sync::Lazy;
use rand::Rng;
use std::collections::HashMap;

use super::{ScoringError, ScoringStrategy};

static LEXICON: Lazy<HashMap<String, f32>> = Lazy::new(|| {
    let raw = include_str!("../../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, f32>>(raw).expect("valid sentiment lexicon")
});

/// Mean weight of the lexicon words in `text`, or `None` when nothing matched.
///
/// Tokens are whitespace-separated and lower-cased; punctuation stays attached,
/// so "amazing!" does not match "amazing".
pub fn lexicon_score(text: &str) -> Option<f32> {
    let lower = text.to_lowercase();
    let (sum, n) = lower
        .split_whitespace()
        .filter_map(|w| LEXICON.get(w))
        .fold((0f32, 0usize), |(s, n), w| (s + w, n + 1));
    (n > 0).then(|| sum / n as f32)
}

#[derive(Debug, Clone, Default)]
pub struct LexiconStrategy;

#[async_trait::async_trait]
impl ScoringStrategy for LexiconStrategy {
    fn name(&self) -> &'static str {
        "lexicon"
    }

    async fn score(&self, text: &str) -> Result<f32, ScoringError> {
        lexicon_score(text).ok_or(ScoringError::NoMatch)
    }
}

/// Last link of the chain: a uniform value in [-1, 1]. Not deterministic.
#[derive(Debug, Clone, Default)]
pub struct RandomStrategy;

impl RandomStrategy {
    pub fn sample() -> f32 {
        rand::rng().random_range(-1.0f32..=1.0)
    }
}

#[async_trait::async_trait]
impl ScoringStrategy for RandomStrategy {
    fn name(&self) -> &'static str {
        "random"
    }

    async fn score(&self, _text: &str) -> Result<f32, ScoringError> {
        Ok(Self::sample())
    }
}
