use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::ingest::normalize_text;
use crate::ingest::providers::{cancellable, USER_AGENT};
use crate::ingest::types::{Provider, ProviderError, RawEvent};

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
pub const DEFAULT_SUBREDDIT: &str = "all";
pub const DEFAULT_LIMIT: u32 = 10;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct Listing {
    data: Option<ListingData>,
}

// Children stay untyped so one malformed post cannot fail the listing.
#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Child {
    #[serde(default)]
    kind: Option<String>,
    data: Option<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: Option<String>,
    subreddit: Option<String>,
    author: Option<String>,
    permalink: Option<String>,
    created_utc: Option<f64>,
    selftext: Option<String>,
    url: Option<String>,
}

/// Polls `/r/{subreddit}/new.json`, one event per link post ("t3").
pub struct RedditProvider {
    name: String,
    interval: Duration,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RedditProvider {
    pub fn from_fixture(json: &str) -> Self {
        Self {
            name: "Reddit".to_string(),
            interval: DEFAULT_INTERVAL,
            mode: Mode::Fixture(json.to_string()),
        }
    }

    pub fn new(base_url: &str, subreddit: &str, limit: u32) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()?;
        let url = format!(
            "{}/r/{}/new.json?limit={}&raw_json=1",
            base_url.trim_end_matches('/'),
            subreddit,
            limit
        );
        Ok(Self {
            name: format!("Reddit/r/{subreddit}"),
            interval: DEFAULT_INTERVAL,
            mode: Mode::Http { url, client },
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn parse_listing(body: &str) -> Result<Vec<RawEvent>, ProviderError> {
        let listing: Listing =
            serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
        let data = listing
            .data
            .ok_or_else(|| ProviderError::InvalidResponse("listing without data".into()))?;

        let mut out = Vec::with_capacity(data.children.len());
        for raw in data.children {
            let child = match serde_json::from_value::<Child>(raw) {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!(target: "ingest", error = %e, "skipping malformed reddit child");
                    continue;
                }
            };
            if child.kind.as_deref() != Some("t3") {
                continue;
            }
            let Some(post) = child.data else { continue };
            let title = normalize_text(post.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }

            let body = normalize_text(post.selftext.as_deref().unwrap_or_default());
            let full_text = if body.is_empty() { title.clone() } else { body };
            let url = match post.url.filter(|u| !u.trim().is_empty()) {
                Some(u) => u,
                None => format!(
                    "https://reddit.com{}",
                    post.permalink.as_deref().unwrap_or_default()
                ),
            };
            let timestamp = post
                .created_utc
                .and_then(|s| DateTime::<Utc>::from_timestamp(s as i64, 0))
                .unwrap_or_else(Utc::now);

            out.push(RawEvent {
                text: title,
                full_text,
                source: format!("Reddit/r/{}", post.subreddit.unwrap_or_default()),
                author: post
                    .author
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| "[deleted]".to_string()),
                url,
                timestamp,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl Provider for RedditProvider {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<RawEvent>, ProviderError> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_listing(s),
            Mode::Http { url, client } => {
                let body = cancellable(cancel, async {
                    let resp = client.get(url).send().await?.error_for_status()?;
                    Ok::<_, ProviderError>(resp.text().await?)
                })
                .await?;
                Self::parse_listing(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }
}
