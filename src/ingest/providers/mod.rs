// src/ingest/providers/mod.rs
pub mod reddit;
pub mod rss;
pub mod synthetic;

pub use reddit::RedditProvider;
pub use rss::RssProvider;
pub use synthetic::SyntheticProvider;

/// User-Agent sent by every HTTP provider.
pub const USER_AGENT: &str = "WebPulse/1.0";

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T>(
    cancel: &tokio_util::sync::CancellationToken,
    fut: impl std::future::Future<Output = Result<T, crate::ingest::ProviderError>>,
) -> Result<T, crate::ingest::ProviderError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(crate::ingest::ProviderError::Cancelled),
        res = fut => res,
    }
}
