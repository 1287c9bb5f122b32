//! Sentiment scoring: an ordered chain of strategies, tried until one produces a value.
//!
//! Default chain is model → lexicon → random. The scorer itself never fails; every
//! returned score is clamped to [-1, 1].

pub mod lexicon;
pub mod model;

use std::path::Path;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

pub use lexicon::{lexicon_score, LexiconStrategy, RandomStrategy};
pub use model::{EnginePool, LogisticModel, ModelStrategy};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ScoringError {
    #[error("sentiment model unavailable")]
    ModelUnavailable,
    #[error("prediction failed: {0}")]
    Prediction(String),
    #[error("no lexicon word matched")]
    NoMatch,
}

/// One link of the fallback chain.
#[async_trait::async_trait]
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn score(&self, text: &str) -> Result<f32, ScoringError>;
}

pub struct SentimentScorer {
    chain: Vec<Box<dyn ScoringStrategy>>,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "sentiment_strategy_total",
            "Scores produced, labelled by the strategy that produced them."
        );
    });
}

impl SentimentScorer {
    pub fn new(chain: Vec<Box<dyn ScoringStrategy>>) -> Self {
        ensure_metrics_described();
        Self { chain }
    }

    /// Lexicon then random; no model.
    pub fn lexicon_only() -> Self {
        Self::new(vec![Box::new(LexiconStrategy), Box::new(RandomStrategy)])
    }

    pub fn with_model(model: ModelStrategy) -> Self {
        Self::new(vec![
            Box::new(model),
            Box::new(LexiconStrategy),
            Box::new(RandomStrategy),
        ])
    }

    /// Full chain, with the model loaded from `path` when possible.
    pub fn from_model_path<P: AsRef<Path>>(path: P, pool_size: usize) -> Self {
        Self::with_model(ModelStrategy::load_or_unavailable(path, pool_size))
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.chain.iter().map(|s| s.name()).collect()
    }

    /// Score `text` in [-1, 1]. Walks the chain; the first finite value wins.
    pub async fn score(&self, text: &str) -> f32 {
        for strategy in &self.chain {
            match strategy.score(text).await {
                Ok(v) if v.is_finite() => {
                    counter!("sentiment_strategy_total", "strategy" => strategy.name())
                        .increment(1);
                    return v.clamp(-1.0, 1.0);
                }
                Ok(v) => {
                    tracing::debug!(target: "sentiment", strategy = strategy.name(), value = v, "non-finite score, falling through");
                }
                Err(e) => {
                    tracing::trace!(target: "sentiment", strategy = strategy.name(), error = %e, "strategy fell through");
                }
            }
        }
        // Only reachable with a chain that lacks the random tail.
        counter!("sentiment_strategy_total", "strategy" => "random").increment(1);
        RandomStrategy::sample()
    }
}

impl Default for SentimentScorer {
    fn default() -> Self {
        Self::lexicon_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f32);

    #[async_trait::async_trait]
    impl ScoringStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn score(&self, _t: &str) -> Result<f32, ScoringError> {
            Ok(self.0)
        }
    }

    struct Broken;

    #[async_trait::async_trait]
    impl ScoringStrategy for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn score(&self, _t: &str) -> Result<f32, ScoringError> {
            Err(ScoringError::Prediction("boom".into()))
        }
    }

    #[tokio::test]
    async fn out_of_range_values_are_clamped() {
        assert_eq!(SentimentScorer::new(vec![Box::new(Fixed(4.2))]).score("x").await, 1.0);
        assert_eq!(SentimentScorer::new(vec![Box::new(Fixed(-9.0))]).score("x").await, -1.0);
    }

    #[tokio::test]
    async fn failures_and_nan_advance_the_chain() {
        let s = SentimentScorer::new(vec![
            Box::new(Broken),
            Box::new(Fixed(f32::NAN)),
            Box::new(Fixed(0.25)),
        ]);
        assert_eq!(s.score("x").await, 0.25);
    }

    #[tokio::test]
    async fn empty_chain_still_scores() {
        let v = SentimentScorer::new(vec![]).score("x").await;
        assert!((-1.0..=1.0).contains(&v));
    }

    #[tokio::test]
    async fn model_unavailable_falls_back_to_lexicon() {
        let s = SentimentScorer::with_model(ModelStrategy::unavailable());
        assert_eq!(s.strategy_names(), vec!["model", "lexicon", "random"]);
        let v = s.score("This is amazing and wonderful").await;
        assert!((v - 0.8).abs() < 1e-6);
    }
}
