//! # Model scoring
//! Logistic bag-of-words classifier loaded from a JSON artifact, served through a
//! fixed pool of prediction engines.
//!
//! Artifact shape:
//! ```json
//! { "bias": -0.1, "weights": { "great": 1.7, "awful": -2.2 } }
//! ```
//! `p(positive) = sigmoid(bias + Σ weight(token))`, score = `(p - 0.5) * 2`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::sync::{Semaphore, SemaphorePermit};

use super::{ScoringError, ScoringStrategy};

pub const DEFAULT_POOL_SIZE: usize = 4;

#[derive(Debug, Clone, Deserialize)]
pub struct LogisticModel {
    #[serde(default)]
    bias: f32,
    weights: HashMap<String, f32>,
}

impl LogisticModel {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading model artifact {}", path.display()))?;
        Self::from_json(&data).with_context(|| format!("parsing model artifact {}", path.display()))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let m: LogisticModel = serde_json::from_str(s)?;
        anyhow::ensure!(m.bias.is_finite(), "model bias must be finite");
        anyhow::ensure!(!m.weights.is_empty(), "model has no weights");
        Ok(m)
    }

    pub fn vocab_size(&self) -> usize {
        self.weights.len()
    }
}

/// Reusable prediction state. Holds a token buffer, so one engine must serve one
/// prediction at a time.
#[derive(Debug)]
pub struct PredictionEngine {
    id: usize,
    model: Arc<LogisticModel>,
    tokens: Vec<String>,
    served: u64,
}

impl PredictionEngine {
    fn new(id: usize, model: Arc<LogisticModel>) -> Self {
        Self {
            id,
            model,
            tokens: Vec::with_capacity(64),
            served: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn served(&self) -> u64 {
        self.served
    }

    /// Probability in [0, 1] that `text` is positive.
    pub fn predict(&mut self, text: &str) -> Result<f32, ScoringError> {
        self.tokens.clear();
        self.tokens.extend(
            text.split(|c: char| !c.is_alphanumeric() && c != '\'')
                .filter(|t| !t.is_empty())
                .map(|t| t.to_lowercase()),
        );
        self.served += 1;

        let logit = self
            .tokens
            .iter()
            .filter_map(|t| self.model.weights.get(t))
            .fold(self.model.bias, |acc, w| acc + w);
        let p = 1.0 / (1.0 + (-logit).exp());
        if !p.is_finite() {
            return Err(ScoringError::Prediction(format!(
                "non-finite probability for logit {logit}"
            )));
        }
        Ok(p)
    }
}

/// Fixed set of engines. `checkout` waits for a free engine; the guard puts it back on drop.
#[derive(Debug)]
pub struct EnginePool {
    engines: Mutex<Vec<PredictionEngine>>,
    permits: Semaphore,
    size: usize,
}

impl EnginePool {
    pub fn new(model: LogisticModel, size: usize) -> Self {
        let size = size.max(1);
        let model = Arc::new(model);
        let engines = (0..size)
            .map(|id| PredictionEngine::new(id, model.clone()))
            .collect();
        Self {
            engines: Mutex::new(engines),
            permits: Semaphore::new(size),
            size,
        }
    }

    pub async fn checkout(&self) -> Result<EngineGuard<'_>, ScoringError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ScoringError::ModelUnavailable)?;
        // A permit is only granted while an engine sits in the vec.
        let engine = self
            .engines
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop()
            .ok_or(ScoringError::ModelUnavailable)?;
        Ok(EngineGuard {
            pool: self,
            engine: Some(engine),
            _permit: permit,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.engines.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Exclusive handle to one engine. Returned to the pool on drop, including unwinds.
pub struct EngineGuard<'a> {
    pool: &'a EnginePool,
    engine: Option<PredictionEngine>,
    _permit: SemaphorePermit<'a>,
}

impl std::ops::Deref for EngineGuard<'_> {
    type Target = PredictionEngine;
    fn deref(&self) -> &Self::Target {
        self.engine.as_ref().expect("engine present until drop")
    }
}

impl std::ops::DerefMut for EngineGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.engine.as_mut().expect("engine present until drop")
    }
}

impl Drop for EngineGuard<'_> {
    fn drop(&mut self) {
        // Runs before `_permit` is released, so the engine is back before anyone can wake.
        if let Some(engine) = self.engine.take() {
            self.pool
                .engines
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(engine);
        }
    }
}

/// Primary strategy. Without a pool (artifact missing or invalid) it always reports
/// `ModelUnavailable`, so the chain falls through.
#[derive(Debug, Clone, Default)]
pub struct ModelStrategy {
    pool: Option<Arc<EnginePool>>,
}

impl ModelStrategy {
    pub fn new(pool: Arc<EnginePool>) -> Self {
        Self { pool: Some(pool) }
    }

    pub fn unavailable() -> Self {
        Self { pool: None }
    }

    /// Load the artifact at `path`; on failure log and return an unavailable strategy.
    pub fn load_or_unavailable<P: AsRef<Path>>(path: P, pool_size: usize) -> Self {
        match LogisticModel::load_from_file(path.as_ref()) {
            Ok(m) => {
                tracing::info!(
                    target: "sentiment",
                    vocab = m.vocab_size(),
                    pool_size,
                    "sentiment model loaded"
                );
                Self::new(Arc::new(EnginePool::new(m, pool_size)))
            }
            Err(e) => {
                tracing::warn!(target: "sentiment", error = ?e, "sentiment model unavailable, using lexicon fallback");
                Self::unavailable()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }
}

#[async_trait::async_trait]
impl ScoringStrategy for ModelStrategy {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn score(&self, text: &str) -> Result<f32, ScoringError> {
        let pool = self.pool.as_ref().ok_or(ScoringError::ModelUnavailable)?;
        let p = {
            let mut engine = pool.checkout().await?;
            engine.predict(text)?
        };
        Ok((p - 0.5) * 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    fn model() -> LogisticModel {
        LogisticModel::from_json(r#"{"bias":0.0,"weights":{"great":3.0,"awful":-3.0}}"#).unwrap()
    }

    #[test]
    fn predict_probability_direction() {
        let mut e = PredictionEngine::new(0, Arc::new(model()));
        assert!(e.predict("what a GREAT day").unwrap() > 0.9);
        assert!(e.predict("awful, just awful").unwrap() < 0.1);
        assert!((e.predict("nothing known").unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(e.served(), 3);
    }

    #[test]
    fn invalid_artifacts_rejected() {
        assert!(LogisticModel::from_json(r#"{"bias":0.0,"weights":{}}"#).is_err());
        assert!(LogisticModel::from_json("not json").is_err());
        assert!(LogisticModel::load_from_file("/definitely/missing/model.json").is_err());
    }

    #[tokio::test]
    async fn unavailable_strategy_falls_through() {
        let s = ModelStrategy::unavailable();
        assert!(matches!(
            s.score("great").await,
            Err(ScoringError::ModelUnavailable)
        ));
    }

    #[tokio::test]
    async fn guard_returns_engine_on_drop() {
        let pool = EnginePool::new(model(), 2);
        {
            let _a = pool.checkout().await.unwrap();
            let _b = pool.checkout().await.unwrap();
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn concurrent_checkouts_never_share_an_engine() {
        let pool = Arc::new(EnginePool::new(model(), 2));
        let in_use = Arc::new(Mutex::new(HashSet::new()));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            let in_use = in_use.clone();
            tasks.push(tokio::spawn(async move {
                let mut g = pool.checkout().await.unwrap();
                let id = g.id();
                assert!(in_use.lock().unwrap().insert(id), "engine {id} shared");
                tokio::time::sleep(Duration::from_millis(5)).await;
                g.predict("great").unwrap();
                in_use.lock().unwrap().remove(&id);
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(pool.available(), 2);
    }
}
