// tests/e2e_pipeline.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use web_pulse::sentiment::ModelStrategy;
use web_pulse::{Provider, ProviderError, PulseApp, PulseConfig, RawEvent, SentimentScorer};

struct OneShot {
    texts: Vec<&'static str>,
}

#[async_trait]
impl Provider for OneShot {
    async fn fetch(&self, _cancel: &CancellationToken) -> Result<Vec<RawEvent>, ProviderError> {
        Ok(self
            .texts
            .iter()
            .map(|t| RawEvent::simple(*t, "Mock"))
            .collect())
    }
    fn name(&self) -> &str {
        "Mock"
    }
    fn poll_interval(&self) -> Duration {
        Duration::from_secs(3600)
    }
}

async fn next_data(rx: &mut tokio::sync::mpsc::Receiver<web_pulse::PulseMessage>) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("pulse within 2s")
        .expect("channel open");
    let v: Value = serde_json::from_str(&msg.json).unwrap();
    v["data"].clone()
}

#[tokio::test]
async fn provider_to_subscriber_with_lexicon_scoring() {
    let cfg = PulseConfig::default();
    let app = PulseApp::with_scorer(
        &cfg,
        SentimentScorer::with_model(ModelStrategy::unavailable()),
    );
    app.register(Arc::new(OneShot {
        texts: vec!["This is amazing and wonderful", "This is terrible and awful"],
    }));
    let mut rx = app.broadcaster.join(7).unwrap();
    app.start_consumer();

    let n = app.scheduler.poll_all_once().await;
    assert_eq!(n, 2);

    let a = next_data(&mut rx).await;
    assert_eq!(a["color"], "#00ff00");
    assert!((a["sentiment"].as_f64().unwrap() - 0.8).abs() < 1e-6);
    assert_eq!(a["message"], "This is amazing and wonderful");
    assert_eq!(a["source"], "Mock");

    let b = next_data(&mut rx).await;
    assert_eq!(b["color"], "#ff0000");
    assert!((b["sentiment"].as_f64().unwrap() + 0.85).abs() < 1e-5);

    app.shutdown().await;
}

#[tokio::test]
async fn status_reflects_wiring() {
    let mut cfg = PulseConfig::default();
    cfg.queue_capacity = 5;
    let app = PulseApp::with_scorer(&cfg, SentimentScorer::lexicon_only());
    app.register(Arc::new(OneShot { texts: vec!["x"] }));
    let _rx = app.broadcaster.join(1).unwrap();

    let st = app.status();
    assert_eq!(st.queue_capacity, 5);
    assert_eq!(st.queue_len, 0);
    assert_eq!(st.subscribers, 1);
    assert_eq!(st.providers, vec!["Mock".to_string()]);
}

#[tokio::test]
async fn shutdown_stops_the_whole_app() {
    let cfg = PulseConfig::default();
    let app = PulseApp::with_scorer(&cfg, SentimentScorer::lexicon_only());
    app.register(Arc::new(OneShot { texts: vec!["x"] }));
    app.start();
    tokio::time::timeout(Duration::from_secs(2), app.shutdown())
        .await
        .expect("shutdown completes");
    assert!(app.cancel_token().is_cancelled());
}
