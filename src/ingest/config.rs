// src/ingest/config.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ingest::providers::{reddit, rss, synthetic};
use crate::ingest::providers::{RedditProvider, RssProvider, SyntheticProvider};
use crate::ingest::types::Provider;

/// Polling intervals below this are raised to it.
pub const MIN_INTERVAL_MS: u64 = 100;

/// One entry of the `[[providers]]` list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderConfig {
    Reddit {
        #[serde(default = "default_reddit_base")]
        base_url: String,
        #[serde(default = "default_subreddit")]
        subreddit: String,
        #[serde(default = "default_reddit_limit")]
        limit: u32,
        #[serde(default)]
        interval_ms: Option<u64>,
    },
    Rss {
        name: String,
        url: String,
        #[serde(default)]
        interval_ms: Option<u64>,
    },
    Synthetic {
        #[serde(default)]
        interval_ms: Option<u64>,
        #[serde(default = "default_batch")]
        batch: usize,
    },
}

fn default_reddit_base() -> String {
    reddit::DEFAULT_BASE_URL.to_string()
}
fn default_subreddit() -> String {
    reddit::DEFAULT_SUBREDDIT.to_string()
}
fn default_reddit_limit() -> u32 {
    reddit::DEFAULT_LIMIT
}
fn default_batch() -> usize {
    1
}

impl ProviderConfig {
    /// Effective polling interval: configured value (clamped) or the kind's default.
    pub fn interval(&self) -> Duration {
        let (configured, fallback) = match self {
            ProviderConfig::Reddit { interval_ms, .. } => (*interval_ms, reddit::DEFAULT_INTERVAL),
            ProviderConfig::Rss { interval_ms, .. } => (*interval_ms, rss::DEFAULT_INTERVAL),
            ProviderConfig::Synthetic { interval_ms, .. } => {
                (*interval_ms, synthetic::DEFAULT_INTERVAL)
            }
        };
        configured
            .map(|ms| Duration::from_millis(ms.max(MIN_INTERVAL_MS)))
            .unwrap_or(fallback)
    }

    pub fn build(&self) -> Result<Arc<dyn Provider>> {
        let interval = self.interval();
        let p: Arc<dyn Provider> = match self {
            ProviderConfig::Reddit {
                base_url,
                subreddit,
                limit,
                ..
            } => Arc::new(
                RedditProvider::new(base_url, subreddit, *limit)
                    .with_context(|| format!("building reddit provider for r/{subreddit}"))?
                    .with_interval(interval),
            ),
            ProviderConfig::Rss { name, url, .. } => Arc::new(
                RssProvider::from_url(name, url)
                    .with_context(|| format!("building rss provider {name}"))?
                    .with_interval(interval),
            ),
            ProviderConfig::Synthetic { batch, .. } => {
                Arc::new(SyntheticProvider::new(interval, *batch))
            }
        };
        Ok(p)
    }
}

/// Build every configured provider; a provider that fails to build is logged and skipped.
pub fn build_providers(cfgs: &[ProviderConfig]) -> Vec<Arc<dyn Provider>> {
    cfgs.iter()
        .filter_map(|c| match c.build() {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, "skipping provider");
                None
            }
        })
        .collect()
}
