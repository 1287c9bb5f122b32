//! Runs the pipeline outside Shuttle and prints every pulse to stdout.
//!
//! `pulse_console`          poll until Ctrl-C
//! `pulse_console --serve`  same, plus the HTTP/WebSocket API on `bind` from the config
//! `pulse_console --once`   one concurrent poll of every provider, drain, exit

use std::sync::Arc;
use std::time::Duration;

use web_pulse::{
    api::{self, AppState},
    metrics::Metrics,
    telemetry, PulseApp, PulseConfig,
};

const CONSOLE_SUBSCRIBER: u64 = 0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let once = std::env::args().any(|a| a == "--once");
    let serve = std::env::args().any(|a| a == "--serve");
    let cfg = PulseConfig::load_default()?;
    let app = Arc::new(PulseApp::from_config(&cfg));

    let Some(mut rx) = app.broadcaster.join(CONSOLE_SUBSCRIBER) else {
        anyhow::bail!("console subscriber already joined");
    };
    let printer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            println!("{}", msg.json);
        }
    });

    if once {
        app.start_consumer();
        let n = app.scheduler.poll_all_once().await;
        tracing::info!(events = n, "single poll done");
        while !app.queue.is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        // let the consumer finish the last event
        tokio::time::sleep(Duration::from_millis(100)).await;
    } else if serve {
        let metrics = Metrics::init()?;
        let listener = api::bind(&cfg.bind).await?;
        let router = api::create_router(AppState::new(app.clone()), &cfg.cors_origin)
            .merge(metrics.router());
        app.start();

        let cancel = app.cancel_token();
        let server = tokio::spawn(api::serve(listener, router, cancel.clone()));
        tokio::signal::ctrl_c().await?;
        tracing::info!("ctrl-c received, shutting down");
        cancel.cancel();
        match server.await {
            Ok(Err(e)) => tracing::error!(error = ?e, "http server failed"),
            Err(e) => tracing::warn!(error = ?e, "http server task join error"),
            Ok(Ok(_)) => {}
        }
    } else {
        app.start();
        tokio::signal::ctrl_c().await?;
        tracing::info!("ctrl-c received, shutting down");
    }

    app.shutdown().await;
    app.broadcaster.leave(CONSOLE_SUBSCRIBER);
    if let Err(e) = printer.await {
        tracing::warn!(error = ?e, "printer task join error");
    }
    Ok(())
}
