// src/config/mod.rs
//! Runtime configuration: one file (TOML or JSON) plus environment overrides.
//!
//! Lookup order:
//! 1) `$PULSE_CONFIG_PATH`
//! 2) `config/pulse.toml`
//! 3) `config/pulse.json`
//! 4) built-in defaults (synthetic provider only)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::broadcast::DEFAULT_SUBSCRIBER_BUFFER;
use crate::ingest::config::ProviderConfig;
use crate::ingest::queue::DEFAULT_QUEUE_CAPACITY;
use crate::pulse::PulseStyle;
use crate::sentiment::model::DEFAULT_POOL_SIZE;

pub const ENV_CONFIG_PATH: &str = "PULSE_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/pulse.toml";
pub const DEFAULT_JSON_PATH: &str = "config/pulse.json";

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_fetch_timeout_ms() -> u64 {
    10_000
}
fn default_model_path() -> String {
    "models/sentiment.json".to_string()
}
fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}
fn default_subscriber_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}
fn default_cors_origin() -> String {
    "http://localhost:4200".to_string()
}
fn default_bind() -> String {
    "0.0.0.0:5196".to_string()
}
fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig::Synthetic {
        interval_ms: None,
        batch: 1,
    }]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PulseConfig {
    /// Ingestion queue capacity (drop-oldest on overflow).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// JSON logistic-model artifact; missing file means lexicon-only scoring.
    #[serde(default = "default_model_path")]
    pub model_path: String,
    #[serde(default = "default_pool_size")]
    pub engine_pool_size: usize,
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Listen address for `pulse_console --serve`; the Shuttle entrypoint binds itself.
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub style: PulseStyle,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            model_path: default_model_path(),
            engine_pool_size: default_pool_size(),
            subscriber_buffer: default_subscriber_buffer(),
            cors_origin: default_cors_origin(),
            bind: default_bind(),
            style: PulseStyle::default(),
            providers: default_providers(),
        }
    }
}

impl PulseConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pulse config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing pulse config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks (see module docs).
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
        }
        let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from(DEFAULT_JSON_PATH);
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Ok(Self::default())
    }

    /// Clamp values into their valid ranges.
    pub fn sanitized(mut self) -> Self {
        self.queue_capacity = self.queue_capacity.max(1);
        self.engine_pool_size = self.engine_pool_size.max(1);
        self.subscriber_buffer = self.subscriber_buffer.max(1);
        self.fetch_timeout_ms = self.fetch_timeout_ms.max(100);

        let s = &mut self.style;
        if !s.positive_threshold.is_finite() || !s.negative_threshold.is_finite() {
            let d = PulseStyle::default();
            s.positive_threshold = d.positive_threshold;
            s.negative_threshold = d.negative_threshold;
        }
        if s.negative_threshold > s.positive_threshold {
            // swap to keep a valid interval
            std::mem::swap(&mut s.negative_threshold, &mut s.positive_threshold);
        }
        self
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PulseConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ => {
            // Unknown extension: JSON first, then TOML
            if let Ok(v) = serde_json::from_str(s) {
                return Ok(v);
            }
            toml::from_str(s).map_err(|e| anyhow!("unsupported config format: {e}"))
        }
    }
}
