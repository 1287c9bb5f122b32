// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod queue;
pub mod scheduler;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

pub use queue::IngestQueue;
pub use scheduler::PollScheduler;
pub use types::{Provider, ProviderError, RawEvent};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Total events returned by providers.");
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors and timeouts."
        );
        describe_counter!(
            "ingest_queue_dropped_total",
            "Events evicted from the ingestion queue by drop-oldest overflow."
        );
        describe_gauge!("ingest_queue_len", "Current ingestion queue length.");
        describe_histogram!("ingest_fetch_ms", "Provider fetch time in milliseconds.");
        describe_gauge!(
            "ingest_provider_last_tick_ts",
            "Unix ts of the last completed provider tick."
        );
    });
}

/// Longest text a provider may hand to the pipeline; display truncation happens later.
pub const MAX_TEXT_CHARS: usize = 4000;

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("space regex"));

fn ascii_quote(c: char) -> char {
    match c {
        '\u{201C}' | '\u{201D}' | '\u{00AB}' | '\u{00BB}' => '"',
        '\u{2018}' | '\u{2019}' => '\'',
        other => other,
    }
}

/// Plain single-spaced text from feed markup: entities decoded, tags dropped,
/// typographic quotes folded to ASCII, capped at [`MAX_TEXT_CHARS`].
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let untagged = RE_TAG.replace_all(&decoded, "");
    let quoted: String = untagged.chars().map(ascii_quote).collect();
    RE_SPACE
        .replace_all(quoted.trim(), " ")
        .chars()
        .take(MAX_TEXT_CHARS)
        .collect()
}
