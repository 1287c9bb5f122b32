//! Web Pulse: binary entrypoint
//! Boots the Axum HTTP server and the ingest → score → broadcast pipeline.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use web_pulse::{
    api::{self, AppState},
    metrics::Metrics,
    telemetry, PulseApp, PulseConfig,
};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = PulseConfig::load_default()?;
    let metrics = Metrics::init()?;

    let app = Arc::new(PulseApp::from_config(&cfg));
    app.start();

    let router = api::create_router(AppState::new(app), &cfg.cors_origin).merge(metrics.router());
    Ok(router.into())
}
