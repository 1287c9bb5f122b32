//! # Pulse assembly
//! Combines a raw event and its score into the outgoing, display-ready pulse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::RawEvent;

/// Characters of `full_text` kept in `message` before the ellipsis.
pub const MESSAGE_MAX_CHARS: usize = 100;
pub const ELLIPSIS: &str = "...";

pub const POSITIVE_THRESHOLD: f32 = 0.3;
pub const NEGATIVE_THRESHOLD: f32 = -0.3;
pub const POSITIVE_COLOR: &str = "#00ff00";
pub const NEGATIVE_COLOR: &str = "#ff0000";
pub const NEUTRAL_COLOR: &str = "#ffff00";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorBucket {
    Positive,
    Negative,
    Neutral,
}

/// Bucket thresholds and hex colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseStyle {
    pub positive_threshold: f32,
    pub negative_threshold: f32,
    pub positive_color: String,
    pub negative_color: String,
    pub neutral_color: String,
}

impl Default for PulseStyle {
    fn default() -> Self {
        Self {
            positive_threshold: POSITIVE_THRESHOLD,
            negative_threshold: NEGATIVE_THRESHOLD,
            positive_color: POSITIVE_COLOR.to_string(),
            negative_color: NEGATIVE_COLOR.to_string(),
            neutral_color: NEUTRAL_COLOR.to_string(),
        }
    }
}

impl PulseStyle {
    /// Strictly above the positive threshold is positive, strictly below the
    /// negative one is negative, anything else (boundaries included) is neutral.
    pub fn bucket(&self, score: f32) -> ColorBucket {
        if score > self.positive_threshold {
            ColorBucket::Positive
        } else if score < self.negative_threshold {
            ColorBucket::Negative
        } else {
            ColorBucket::Neutral
        }
    }

    pub fn color(&self, bucket: ColorBucket) -> &str {
        match bucket {
            ColorBucket::Positive => &self.positive_color,
            ColorBucket::Negative => &self.negative_color,
            ColorBucket::Neutral => &self.neutral_color,
        }
    }
}

/// A scored event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pulse {
    pub sentiment: f32,
    pub message: String,
    pub full_text: String,
    pub color: String,
    pub source: String,
    pub author: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

/// Display form of `full_text`: unchanged up to 100 chars, else 100 chars + "...".
/// Counted in chars, so multi-byte text is never split mid code point.
pub fn truncate_message(full_text: &str) -> String {
    match full_text.char_indices().nth(MESSAGE_MAX_CHARS) {
        None => full_text.to_string(),
        Some((cut, _)) => format!("{}{}", &full_text[..cut], ELLIPSIS),
    }
}

pub fn assemble(ev: &RawEvent, score: f32, style: &PulseStyle) -> Pulse {
    let sentiment = if score.is_finite() {
        score.clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let bucket = style.bucket(sentiment);
    Pulse {
        sentiment,
        message: truncate_message(&ev.full_text),
        full_text: ev.full_text.clone(),
        color: style.color(bucket).to_string(),
        source: ev.source.clone(),
        author: ev.author.clone(),
        url: ev.url.clone(),
        timestamp: ev.timestamp,
    }
}
