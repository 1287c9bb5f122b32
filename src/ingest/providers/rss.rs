use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use tokio_util::sync::CancellationToken;

use crate::ingest::normalize_text;
use crate::ingest::providers::{cancellable, USER_AGENT};
use crate::ingest::types::{Provider, ProviderError, RawEvent};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    author: Option<String>,
    #[serde(rename = "dc:creator", alias = "creator")]
    creator: Option<String>,
}

static RE_CHANNEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<channel\b[^>]*>(.*)</channel>").expect("channel regex"));
static RE_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<item\b[^>]*>.*?</item>").expect("item regex"));

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

/// RSS 2.0 feed provider; one event per `<item>` with a title.
pub struct RssProvider {
    feed: String,
    source: String,
    interval: Duration,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssProvider {
    pub fn from_fixture(feed: &str, xml: &str) -> Self {
        Self {
            feed: feed.to_string(),
            source: format!("RSS/{feed}"),
            interval: DEFAULT_INTERVAL,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(feed: &str, url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            feed: feed.to_string(),
            source: format!("RSS/{feed}"),
            interval: DEFAULT_INTERVAL,
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn parse_items(&self, xml: &str) -> Result<Vec<RawEvent>, ProviderError> {
        let xml_clean = scrub_html_entities_for_xml(xml);
        let channel = RE_CHANNEL
            .captures(&xml_clean)
            .and_then(|c| c.get(1))
            .ok_or_else(|| ProviderError::Parse("no <channel> element".into()))?
            .as_str();

        // Each <item> is decoded on its own; a broken one is skipped, not fatal.
        let mut out = Vec::new();
        for m in RE_ITEM.find_iter(channel) {
            let it: Item = match from_str(m.as_str()) {
                Ok(it) => it,
                Err(e) => {
                    tracing::debug!(target: "ingest", feed = %self.feed, error = %e, "skipping malformed rss item");
                    continue;
                }
            };
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let description = normalize_text(it.description.as_deref().unwrap_or_default());
            let full_text = if description.is_empty() {
                title.clone()
            } else {
                format!("{title}. {description}")
            };

            out.push(RawEvent {
                text: title,
                full_text,
                source: self.source.clone(),
                author: it
                    .creator
                    .or(it.author)
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| self.feed.clone()),
                url: it.link.map(|l| l.trim().to_string()).unwrap_or_default(),
                timestamp: it
                    .pub_date
                    .as_deref()
                    .and_then(parse_rfc2822)
                    .unwrap_or_else(Utc::now),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl Provider for RssProvider {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<RawEvent>, ProviderError> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items(s),
            Mode::Http { url, client } => {
                let body = cancellable(cancel, async {
                    let resp = client.get(url).send().await?.error_for_status()?;
                    Ok::<_, ProviderError>(resp.text().await?)
                })
                .await?;
                self.parse_items(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.source
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }
}

/// HTML entities that feeds use but XML does not define.
const HTML_ONLY_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&ndash;", "-"),
    ("&mdash;", "-"),
    ("&hellip;", "..."),
    ("&ldquo;", "\""),
    ("&rdquo;", "\""),
    ("&lsquo;", "'"),
    ("&rsquo;", "'"),
];

fn scrub_html_entities_for_xml(s: &str) -> String {
    HTML_ONLY_ENTITIES
        .iter()
        .fold(s.to_string(), |acc, (from, to)| acc.replace(from, to))
}
