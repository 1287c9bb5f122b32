// tests/scheduler_isolation.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use web_pulse::ingest::scheduler::PollSchedulerCfg;
use web_pulse::{IngestQueue, PollScheduler, Provider, ProviderError, RawEvent};

struct Failing {
    calls: AtomicUsize,
}

#[async_trait]
impl Provider for Failing {
    async fn fetch(&self, _cancel: &CancellationToken) -> Result<Vec<RawEvent>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Network("connection refused".into()))
    }
    fn name(&self) -> &str {
        "failing"
    }
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(20)
    }
}

struct Hanging;

#[async_trait]
impl Provider for Hanging {
    async fn fetch(&self, _cancel: &CancellationToken) -> Result<Vec<RawEvent>, ProviderError> {
        std::future::pending::<()>().await;
        Ok(vec![])
    }
    fn name(&self) -> &str {
        "hanging"
    }
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(20)
    }
}

struct Steady {
    tag: &'static str,
}

#[async_trait]
impl Provider for Steady {
    async fn fetch(&self, _cancel: &CancellationToken) -> Result<Vec<RawEvent>, ProviderError> {
        Ok(vec![RawEvent::simple(format!("{} says hi", self.tag), self.tag)])
    }
    fn name(&self) -> &str {
        self.tag
    }
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(20)
    }
}

fn scheduler(queue: Arc<IngestQueue>) -> PollScheduler {
    PollScheduler::new(
        PollSchedulerCfg {
            fetch_timeout: Duration::from_millis(100),
        },
        queue,
        CancellationToken::new(),
    )
}

#[tokio::test(start_paused = true)]
async fn failing_and_hanging_providers_do_not_block_a_poll_cycle() {
    let queue = Arc::new(IngestQueue::with_capacity(100));
    let sched = scheduler(queue.clone());
    let failing = Arc::new(Failing {
        calls: AtomicUsize::new(0),
    });
    sched.register(failing.clone());
    sched.register(Arc::new(Hanging));
    sched.register(Arc::new(Steady { tag: "alpha" }));
    sched.register(Arc::new(Steady { tag: "beta" }));

    let n = tokio::time::timeout(Duration::from_secs(2), sched.poll_all_once())
        .await
        .expect("poll cycle bounded by the fetch timeout");
    assert_eq!(n, 2);
    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);

    let mut sources: Vec<String> = queue.snapshot().into_iter().map(|e| e.source).collect();
    sources.sort();
    assert_eq!(sources, vec!["alpha", "beta"]);
}

#[tokio::test(start_paused = true)]
async fn running_loops_keep_healthy_providers_flowing() {
    let queue = Arc::new(IngestQueue::with_capacity(1000));
    let sched = scheduler(queue.clone());
    let failing = Arc::new(Failing {
        calls: AtomicUsize::new(0),
    });
    sched.register(failing.clone());
    sched.register(Arc::new(Hanging));
    sched.register(Arc::new(Steady { tag: "alpha" }));
    sched.start();

    tokio::time::sleep(Duration::from_millis(300)).await;
    sched.shutdown().await;

    let alpha = queue
        .snapshot()
        .into_iter()
        .filter(|e| e.source == "alpha")
        .count();
    assert!(alpha >= 10, "healthy provider produced only {alpha} events");
    assert!(failing.calls.load(Ordering::SeqCst) >= 3, "failing provider is retried on later ticks");
}

#[tokio::test(start_paused = true)]
async fn shutdown_is_prompt_even_with_a_hanging_fetch() {
    let queue = Arc::new(IngestQueue::with_capacity(10));
    let sched = PollScheduler::new(
        PollSchedulerCfg {
            fetch_timeout: Duration::from_secs(60),
        },
        queue,
        CancellationToken::new(),
    );
    sched.register(Arc::new(Hanging));
    sched.start();
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(1), sched.shutdown())
        .await
        .expect("shutdown must not wait for the fetch timeout");
}
