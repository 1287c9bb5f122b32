// src/ingest/types.rs
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// One raw text event as produced by a provider. Consumed exactly once by the pipeline.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawEvent {
    pub text: String,      // short form (e.g. post title)
    pub full_text: String, // body if present, otherwise same as text
    pub source: String,    // e.g. "Reddit/r/rust", "RSS/HackerNews"
    pub author: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

impl RawEvent {
    /// Event whose short and full text are the same string.
    pub fn simple(text: impl Into<String>, source: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            full_text: text.clone(),
            text,
            source: source.into(),
            author: String::new(),
            url: String::new(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("fetch cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Parse(e.to_string())
        } else if e.is_status() {
            ProviderError::InvalidResponse(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// A pluggable source of raw text events.
///
/// Implementations must return promptly once `cancel` fires and must never block
/// indefinitely. The scheduler treats every implementation the same way.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<RawEvent>, ProviderError>;
    fn name(&self) -> &str;
    fn poll_interval(&self) -> Duration;
}
