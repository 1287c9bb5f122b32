// tests/api_http.rs
use std::sync::Arc;

use http::{Request, StatusCode};
use shuttle_axum::axum::body::{to_bytes, Body};
use tower::ServiceExt;
use web_pulse::api::{AppState, HEALTH_BODY};
use web_pulse::{create_router, PulseApp, PulseConfig, SentimentScorer};

fn router() -> shuttle_axum::axum::Router {
    let cfg = PulseConfig::default();
    let app = Arc::new(PulseApp::with_scorer(&cfg, SentimentScorer::lexicon_only()));
    create_router(AppState::new(app), &cfg.cors_origin)
}

#[tokio::test]
async fn health_is_pulse_ready() {
    let res = router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], HEALTH_BODY.as_bytes());
}

#[tokio::test]
async fn status_is_json() {
    let res = router()
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["queue_capacity"], 1000);
    assert_eq!(v["subscribers"], 0);
}

#[tokio::test]
async fn cors_allows_configured_origin() {
    let res = router()
        .oneshot(
            Request::get("/health")
                .header("origin", "http://localhost:4200")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        res.headers().get("access-control-allow-origin").unwrap(),
        "http://localhost:4200"
    );
}

#[tokio::test]
async fn hub_requires_websocket_upgrade() {
    let res = router()
        .oneshot(Request::get("/pulseHub").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(res.status().is_client_error());
}

#[tokio::test]
async fn serves_on_the_configured_bind_address() {
    let mut cfg = PulseConfig::default();
    cfg.bind = "127.0.0.1:0".to_string();
    let app = Arc::new(PulseApp::with_scorer(&cfg, SentimentScorer::lexicon_only()));
    let router = create_router(AppState::new(app), &cfg.cors_origin);

    let listener = web_pulse::api::bind(&cfg.bind).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = tokio_util::sync::CancellationToken::new();
    let server = tokio::spawn(web_pulse::api::serve(listener, router, cancel.clone()));

    let body = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, HEALTH_BODY);

    cancel.cancel();
    let served = tokio::time::timeout(std::time::Duration::from_secs(2), server)
        .await
        .expect("graceful shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(served, addr);
}

#[tokio::test]
async fn bad_bind_address_is_an_error() {
    assert!(web_pulse::api::bind("not-an-address").await.is_err());
}
