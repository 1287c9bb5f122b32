// src/ingest/scheduler.rs
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use metrics::{counter, gauge, histogram};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::ingest::queue::IngestQueue;
use crate::ingest::types::{Provider, ProviderError, RawEvent};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug)]
pub struct PollSchedulerCfg {
    pub fetch_timeout: Duration,
}

impl Default for PollSchedulerCfg {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Drives every registered provider on its own cadence and feeds the ingestion queue.
pub struct PollScheduler {
    cfg: PollSchedulerCfg,
    queue: Arc<IngestQueue>,
    cancel: CancellationToken,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    providers: Vec<Arc<dyn Provider>>,
    tasks: Vec<JoinHandle<()>>,
    started: bool,
}

impl PollScheduler {
    pub fn new(cfg: PollSchedulerCfg, queue: Arc<IngestQueue>, cancel: CancellationToken) -> Self {
        crate::ingest::ensure_metrics_described();
        Self {
            cfg,
            queue,
            cancel,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Add a provider. If the scheduler is already running, its loop starts immediately.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let mut inner = self.lock();
        tracing::info!(
            target: "ingest",
            provider = provider.name(),
            interval_ms = provider.poll_interval().as_millis() as u64,
            "registered provider"
        );
        if inner.started {
            let handle = self.spawn_loop(provider.clone());
            inner.tasks.push(handle);
        }
        inner.providers.push(provider);
    }

    /// Spawn one polling loop per registered provider. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut inner = self.lock();
        if inner.started {
            return;
        }
        inner.started = true;
        let handles: Vec<_> = inner
            .providers
            .iter()
            .map(|p| self.spawn_loop(p.clone()))
            .collect();
        inner.tasks.extend(handles);
        tracing::info!(target: "ingest", providers = inner.providers.len(), "poll scheduler started");
    }

    /// Fetch every registered provider once, concurrently, and enqueue the results.
    /// Returns the number of events pushed.
    pub async fn poll_all_once(&self) -> usize {
        let providers = self.providers();
        let fetches = providers.iter().map(|p| {
            let p = p.clone();
            let queue = self.queue.clone();
            let cancel = self.cancel.clone();
            let timeout = self.cfg.fetch_timeout;
            async move { tick(p.as_ref(), &queue, &cancel, timeout).await }
        });
        join_all(fetches).await.into_iter().sum()
    }

    pub fn providers(&self) -> Vec<Arc<dyn Provider>> {
        self.lock().providers.clone()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.lock()
            .providers
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Cancel every provider loop and wait for them to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut self.lock().tasks);
        for t in tasks {
            if let Err(e) = t.await {
                tracing::warn!(target: "ingest", error = ?e, "provider task join error");
            }
        }
    }

    fn spawn_loop(&self, provider: Arc<dyn Provider>) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let cancel = self.cancel.child_token();
        let timeout = self.cfg.fetch_timeout;
        tokio::spawn(async move {
            let period = provider.poll_interval().max(Duration::from_millis(10));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tick(provider.as_ref(), &queue, &cancel, timeout).await;
            }
            tracing::debug!(target: "ingest", provider = provider.name(), "provider loop stopped");
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// One fetch cycle for one provider. Every failure mode ends as "zero events".
async fn tick(
    provider: &dyn Provider,
    queue: &IngestQueue,
    cancel: &CancellationToken,
    timeout: Duration,
) -> usize {
    let t0 = Instant::now();
    let events = match fetch_guarded(provider, cancel, timeout).await {
        Ok(v) => v,
        Err(ProviderError::Cancelled) => return 0,
        Err(e) => {
            tracing::warn!(target: "ingest", error = %e, provider = provider.name(), "provider error");
            counter!("ingest_provider_errors_total").increment(1);
            return 0;
        }
    };
    histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    // Results of a fetch that raced with shutdown are discarded.
    if cancel.is_cancelled() {
        return 0;
    }

    let n = events.len();
    counter!("ingest_events_total").increment(n as u64);
    for ev in events {
        queue.push(ev);
    }
    gauge!("ingest_provider_last_tick_ts").set(chrono::Utc::now().timestamp() as f64);
    tracing::debug!(target: "ingest", provider = provider.name(), events = n, "provider tick");
    n
}

async fn fetch_guarded(
    provider: &dyn Provider,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<Vec<RawEvent>, ProviderError> {
    let fut = AssertUnwindSafe(provider.fetch(cancel)).catch_unwind();
    tokio::select! {
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        res = tokio::time::timeout(timeout, fut) => match res {
            Err(_) => Err(ProviderError::Network(format!("fetch timed out after {timeout:?}"))),
            Ok(Err(_panic)) => Err(ProviderError::InvalidResponse("provider panicked".into())),
            Ok(Ok(inner)) => inner,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(&'static str, usize);

    #[async_trait]
    impl Provider for Fixed {
        async fn fetch(&self, _c: &CancellationToken) -> Result<Vec<RawEvent>, ProviderError> {
            Ok((0..self.1)
                .map(|i| RawEvent::simple(format!("{} {i}", self.0), self.0))
                .collect())
        }
        fn name(&self) -> &str {
            self.0
        }
        fn poll_interval(&self) -> Duration {
            Duration::from_millis(50)
        }
    }

    struct Hangs;

    #[async_trait]
    impl Provider for Hangs {
        async fn fetch(&self, _c: &CancellationToken) -> Result<Vec<RawEvent>, ProviderError> {
            futures::future::pending::<()>().await;
            Ok(vec![])
        }
        fn name(&self) -> &str {
            "Hangs"
        }
        fn poll_interval(&self) -> Duration {
            Duration::from_millis(50)
        }
    }

    struct Panics;

    #[async_trait]
    impl Provider for Panics {
        async fn fetch(&self, _c: &CancellationToken) -> Result<Vec<RawEvent>, ProviderError> {
            panic!("boom");
        }
        fn name(&self) -> &str {
            "Panics"
        }
        fn poll_interval(&self) -> Duration {
            Duration::from_millis(50)
        }
    }

    fn scheduler(timeout: Duration) -> (PollScheduler, Arc<IngestQueue>) {
        let q = Arc::new(IngestQueue::with_capacity(100));
        let s = PollScheduler::new(
            PollSchedulerCfg {
                fetch_timeout: timeout,
            },
            q.clone(),
            CancellationToken::new(),
        );
        (s, q)
    }

    #[tokio::test]
    async fn poll_all_once_fans_out_to_every_provider() {
        let (s, q) = scheduler(Duration::from_secs(1));
        s.register(Arc::new(Fixed("A", 2)));
        s.register(Arc::new(Fixed("B", 3)));
        assert_eq!(s.poll_all_once().await, 5);
        assert_eq!(q.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_provider_times_out_without_blocking_others() {
        let (s, q) = scheduler(Duration::from_millis(50));
        s.register(Arc::new(Hangs));
        s.register(Arc::new(Fixed("A", 1)));
        assert_eq!(s.poll_all_once().await, 1);
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn panicking_provider_counts_as_zero_events() {
        let (s, q) = scheduler(Duration::from_secs(1));
        s.register(Arc::new(Panics));
        s.register(Arc::new(Fixed("A", 2)));
        assert_eq!(s.poll_all_once().await, 2);
        assert_eq!(q.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn register_after_start_spawns_loop() {
        let (s, q) = scheduler(Duration::from_secs(1));
        s.start();
        s.register(Arc::new(Fixed("Late", 1)));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(q.len() >= 1, "late provider should have ticked at least once");
        s.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_hanging_loops_promptly() {
        let (s, _q) = scheduler(Duration::from_secs(30));
        s.register(Arc::new(Hangs));
        s.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::time::timeout(Duration::from_secs(2), s.shutdown())
            .await
            .expect("shutdown must not wait for the hanging fetch");
    }
}
