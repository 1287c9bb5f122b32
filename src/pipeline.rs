//! # Consumer loop
//! Single task: dequeue → score → assemble → broadcast, until cancelled.
//!
//! One bad event never halts the loop: errors and panics while processing an
//! event are logged and counted, then the loop goes back to the queue.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use futures::FutureExt;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broadcast::{Broadcaster, PublishReport};
use crate::ingest::{IngestQueue, RawEvent};
use crate::pulse::{assemble, Pulse, PulseStyle};
use crate::sentiment::SentimentScorer;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "pipeline_errors_total",
            "Events that failed during scoring, assembling or broadcasting."
        );
        describe_counter!("pipeline_processed_total", "Events fully processed.");
    });
}

pub struct PulsePipeline {
    queue: Arc<IngestQueue>,
    scorer: Arc<SentimentScorer>,
    style: PulseStyle,
    broadcaster: Arc<Broadcaster>,
}

impl PulsePipeline {
    pub fn new(
        queue: Arc<IngestQueue>,
        scorer: Arc<SentimentScorer>,
        style: PulseStyle,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            queue,
            scorer,
            style,
            broadcaster,
        }
    }

    /// Score, assemble and publish one event.
    pub async fn process(&self, ev: RawEvent) -> anyhow::Result<(Pulse, PublishReport)> {
        let score = self.scorer.score(&ev.text).await;
        let pulse = assemble(&ev, score, &self.style);
        let report = self
            .broadcaster
            .publish(&pulse)
            .context("broadcasting pulse")?;

        tracing::debug!(
            target: "pipeline",
            source = %pulse.source,
            sentiment = pulse.sentiment,
            delivered = report.delivered,
            "pulse sent"
        );
        Ok((pulse, report))
    }

    /// Run the consumer until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(target: "pipeline", "pulse pipeline started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let Some(ev) = self.queue.pop(&cancel).await else {
                break;
            };

            let preview: String = ev.text.chars().take(30).collect();
            match AssertUnwindSafe(self.process(ev)).catch_unwind().await {
                Ok(Ok(_)) => counter!("pipeline_processed_total").increment(1),
                Ok(Err(e)) => {
                    counter!("pipeline_errors_total").increment(1);
                    tracing::error!(target: "pipeline", error = ?e, text = %preview, "error processing pulse");
                }
                Err(_) => {
                    counter!("pipeline_errors_total").increment(1);
                    tracing::error!(target: "pipeline", text = %preview, "panic while processing pulse");
                }
            }
        }
        tracing::info!(target: "pipeline", "pulse pipeline stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
