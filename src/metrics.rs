use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shuttle_axum::axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};

pub const METRICS_PATH: &str = "/metrics";
const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Owns the Prometheus handle behind `/metrics`.
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global recorder. Fails if another recorder is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing prometheus recorder")?;
        Ok(Self { handle })
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(METRICS_PATH, get(render))
            .with_state(self.handle.clone())
    }
}

async fn render(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        handle.render(),
    )
}
