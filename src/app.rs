// src/app.rs
//! Wires queue, scheduler, scorer, pipeline and broadcaster from one config.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broadcast::Broadcaster;
use crate::config::PulseConfig;
use crate::ingest::config::build_providers;
use crate::ingest::scheduler::PollSchedulerCfg;
use crate::ingest::{IngestQueue, PollScheduler, Provider};
use crate::pipeline::PulsePipeline;
use crate::pulse::PulseStyle;
use crate::sentiment::SentimentScorer;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PulseStatus {
    pub queue_len: usize,
    pub queue_capacity: usize,
    pub dropped_total: u64,
    pub subscribers: usize,
    pub providers: Vec<String>,
}

pub struct PulseApp {
    pub queue: Arc<IngestQueue>,
    pub scorer: Arc<SentimentScorer>,
    pub broadcaster: Arc<Broadcaster>,
    pub scheduler: Arc<PollScheduler>,
    style: PulseStyle,
    cancel: CancellationToken,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl PulseApp {
    /// Build every component and register the configured providers. Nothing runs yet.
    pub fn from_config(cfg: &PulseConfig) -> Self {
        let scorer = SentimentScorer::from_model_path(&cfg.model_path, cfg.engine_pool_size);
        let app = Self::with_scorer(cfg, scorer);
        for p in build_providers(&cfg.providers) {
            app.scheduler.register(p);
        }
        app
    }

    /// Same as `from_config` but with an explicit scorer and no providers registered.
    pub fn with_scorer(cfg: &PulseConfig, scorer: SentimentScorer) -> Self {
        let cancel = CancellationToken::new();
        let queue = Arc::new(IngestQueue::with_capacity(cfg.queue_capacity));
        let scheduler = Arc::new(PollScheduler::new(
            PollSchedulerCfg {
                fetch_timeout: cfg.fetch_timeout(),
            },
            queue.clone(),
            cancel.child_token(),
        ));
        Self {
            queue,
            scorer: Arc::new(scorer),
            broadcaster: Arc::new(Broadcaster::new(cfg.subscriber_buffer)),
            scheduler,
            style: cfg.style.clone(),
            cancel,
            consumer: Mutex::new(None),
        }
    }

    pub fn register(&self, provider: Arc<dyn Provider>) {
        self.scheduler.register(provider);
    }

    /// Start provider loops and the single consumer. Idempotent.
    pub fn start(&self) {
        self.start_consumer();
        self.scheduler.start();
        tracing::info!(
            scoring = ?self.scorer.strategy_names(),
            queue_capacity = self.queue.capacity(),
            "pulse app started"
        );
    }

    /// Spawn only the consumer; providers are then driven by explicit `poll_all_once` calls.
    pub fn start_consumer(&self) {
        let mut consumer = self.consumer.lock().unwrap_or_else(|p| p.into_inner());
        if consumer.is_some() {
            return;
        }
        let pipeline = PulsePipeline::new(
            self.queue.clone(),
            self.scorer.clone(),
            self.style.clone(),
            self.broadcaster.clone(),
        );
        *consumer = Some(pipeline.spawn(self.cancel.child_token()));
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn status(&self) -> PulseStatus {
        PulseStatus {
            queue_len: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            dropped_total: self.queue.dropped_total(),
            subscribers: self.broadcaster.subscriber_count(),
            providers: self.scheduler.provider_names(),
        }
    }

    /// Cancel everything and wait for the tasks to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.scheduler.shutdown().await;
        let handle = self
            .consumer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(h) = handle {
            if let Err(e) = h.await {
                tracing::warn!(error = ?e, "consumer task join error");
            }
        }
        tracing::info!("pulse app stopped");
    }
}
