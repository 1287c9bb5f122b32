// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod app;
pub mod broadcast;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod pulse;
pub mod sentiment;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::app::{PulseApp, PulseStatus};
pub use crate::broadcast::{Broadcaster, PublishReport, PulseMessage};
pub use crate::config::PulseConfig;
pub use crate::ingest::{IngestQueue, PollScheduler, Provider, ProviderError, RawEvent};
pub use crate::pulse::{assemble, ColorBucket, Pulse, PulseStyle};
pub use crate::sentiment::SentimentScorer;
