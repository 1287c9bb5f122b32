//! Synthetic generator: emits canned messages so the pipeline has traffic without network access.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::IndexedRandom;
use tokio_util::sync::CancellationToken;

use crate::ingest::types::{Provider, ProviderError, RawEvent};

pub const SOURCE_NAME: &str = "TestGenerator";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

const MESSAGES: &[&str] = &[
    "This is absolutely amazing!",
    "I hate this so much...",
    "Great work everyone!",
    "Terrible decision",
    "Love the new features!",
    "Worst experience ever",
    "Excellent performance!",
    "Awful user interface",
];

const AUTHORS: &[&str] = &[
    "Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry",
];

pub struct SyntheticProvider {
    interval: Duration,
    batch: usize,
}

impl SyntheticProvider {
    pub fn new(interval: Duration, batch: usize) -> Self {
        Self {
            interval,
            batch: batch.max(1),
        }
    }
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, 1)
    }
}

#[async_trait]
impl Provider for SyntheticProvider {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<RawEvent>, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let mut rng = rand::rng();
        let out = (0..self.batch)
            .map(|_| {
                let text = MESSAGES.choose(&mut rng).copied().unwrap_or_default();
                RawEvent {
                    text: text.to_string(),
                    full_text: text.to_string(),
                    source: SOURCE_NAME.to_string(),
                    author: AUTHORS.choose(&mut rng).copied().unwrap_or_default().to_string(),
                    url: String::new(),
                    timestamp: Utc::now(),
                }
            })
            .collect();
        Ok(out)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }
}
