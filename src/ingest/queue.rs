// src/ingest/queue.rs
//! Bounded multi-producer / single-consumer FIFO with drop-oldest overflow.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use metrics::{counter, gauge};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::ingest::types::RawEvent;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct IngestQueue {
    inner: Mutex<VecDeque<RawEvent>>,
    cap: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl IngestQueue {
    /// `cap` of 0 is treated as 1.
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap.min(10_000))),
            cap,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue without blocking. When full, the oldest entry is evicted and returned.
    pub fn push(&self, ev: RawEvent) -> Option<RawEvent> {
        let (evicted, len) = {
            let mut q = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            let evicted = if q.len() >= self.cap {
                q.pop_front()
            } else {
                None
            };
            q.push_back(ev);
            (evicted, q.len())
        };

        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            counter!("ingest_queue_dropped_total").increment(1);
        }
        gauge!("ingest_queue_len").set(len as f64);

        // notify_one stores a permit when nobody is waiting yet.
        self.notify.notify_one();
        evicted
    }

    pub fn try_pop(&self) -> Option<RawEvent> {
        let mut q = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let ev = q.pop_front();
        gauge!("ingest_queue_len").set(q.len() as f64);
        ev
    }

    /// Wait for the next event in FIFO order. Returns `None` once `cancel` fires.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<RawEvent> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(ev) = self.try_pop() {
                return Some(ev);
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.notify.notified() => {}
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Number of events evicted by overflow since creation.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Vec<RawEvent> {
        let q = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        q.iter().cloned().collect()
    }
}

impl Default for IngestQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}
