use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use shuttle_axum::axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderValue,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::app::{PulseApp, PulseStatus};

pub const HEALTH_BODY: &str = "Server is Pulse-ready!";
pub const HUB_PATH: &str = "/pulseHub";

#[derive(Clone)]
pub struct AppState {
    app: Arc<PulseApp>,
    next_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(app: Arc<PulseApp>) -> Self {
        Self {
            app,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

pub fn create_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(|| async { HEALTH_BODY }))
        .route("/status", get(status))
        .route(HUB_PATH, get(pulse_hub))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

/// Bind the configured `host:port` for a self-hosted server.
pub async fn bind(addr: &str) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding http listener on {addr}"))
}

/// Serve `router` on `listener` until `cancel` fires, then drain open requests.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
) -> anyhow::Result<SocketAddr> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "http listening");
    shuttle_axum::axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("http server")?;
    Ok(addr)
}

fn cors_layer(origin: &str) -> CorsLayer {
    match origin.parse::<HeaderValue>() {
        Ok(o) if origin != "*" => CorsLayer::new()
            .allow_origin(o)
            .allow_methods(Any)
            .allow_headers(Any),
        _ => CorsLayer::very_permissive(),
    }
}

async fn status(State(state): State<AppState>) -> Json<PulseStatus> {
    Json(state.app.status())
}

async fn pulse_hub(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_subscriber(socket, state))
}

/// Join on connect, forward every pulse as a text frame, leave on close.
async fn serve_subscriber(socket: WebSocket, state: AppState) {
    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    let broadcaster = state.app.broadcaster.clone();
    let Some(mut rx) = broadcaster.join(id) else {
        return;
    };
    tracing::info!(target: "broadcast", subscriber = id, total = broadcaster.subscriber_count(), "websocket subscriber connected");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = sink.send(Message::Text(msg.json.to_string().into())).await {
                    tracing::debug!(target: "broadcast", subscriber = id, error = %e, "websocket send failed");
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                // Clients have nothing to say; pings are answered by axum.
                Some(Ok(_)) => {}
            },
        }
    }

    broadcaster.leave(id);
    tracing::info!(target: "broadcast", subscriber = id, "websocket subscriber disconnected");
}
