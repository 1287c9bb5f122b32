//! Broadcaster: fans each pulse out to every subscriber currently in the group.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::pulse::Pulse;

pub const GROUP_NAME: &str = "AllPulses";
pub const RECEIVE_PULSE: &str = "ReceivePulse";
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

pub type SubscriberId = u64;

/// Serialized frame shared by every subscriber of one publish.
#[derive(Debug, Clone)]
pub struct PulseMessage {
    pub event: &'static str,
    pub json: Arc<str>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    event: &'a str,
    data: &'a Pulse,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Subscriber buffer full; message skipped for that subscriber only.
    pub dropped: usize,
    /// Subscriber gone; removed from the group.
    pub removed: usize,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pulse_published_total", "Pulses published to the group.");
        describe_counter!(
            "pulse_delivery_dropped_total",
            "Per-subscriber deliveries skipped because the subscriber buffer was full."
        );
        describe_gauge!("pulse_subscribers", "Currently joined subscribers.");
    });
}

#[derive(Debug)]
pub struct Broadcaster {
    group: &'static str,
    buffer: usize,
    members: RwLock<HashMap<SubscriberId, mpsc::Sender<PulseMessage>>>,
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        ensure_metrics_described();
        Self {
            group: GROUP_NAME,
            buffer: buffer.max(1),
            members: RwLock::new(HashMap::new()),
        }
    }

    pub fn group(&self) -> &'static str {
        self.group
    }

    /// Join the group. Returns the delivery stream, or `None` if `id` is already a member.
    pub fn join(&self, id: SubscriberId) -> Option<mpsc::Receiver<PulseMessage>> {
        let mut members = self.members.write().unwrap_or_else(|p| p.into_inner());
        if members.contains_key(&id) {
            return None;
        }
        let (tx, rx) = mpsc::channel(self.buffer);
        members.insert(id, tx);
        gauge!("pulse_subscribers").set(members.len() as f64);
        tracing::debug!(target: "broadcast", subscriber = id, group = self.group, "joined");
        Some(rx)
    }

    /// Leave the group. Returns whether `id` was a member.
    pub fn leave(&self, id: SubscriberId) -> bool {
        let mut members = self.members.write().unwrap_or_else(|p| p.into_inner());
        let was = members.remove(&id).is_some();
        gauge!("pulse_subscribers").set(members.len() as f64);
        if was {
            tracing::debug!(target: "broadcast", subscriber = id, group = self.group, "left");
        }
        was
    }

    pub fn is_member(&self, id: SubscriberId) -> bool {
        self.members
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.members.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Deliver `pulse` to every current member without waiting on any of them.
    pub fn publish(&self, pulse: &Pulse) -> anyhow::Result<PublishReport> {
        let json: Arc<str> = serde_json::to_string(&Envelope {
            event: RECEIVE_PULSE,
            data: pulse,
        })?
        .into();
        let msg = PulseMessage {
            event: RECEIVE_PULSE,
            json,
        };

        let mut report = PublishReport::default();
        let mut gone = Vec::new();
        {
            let members = self.members.read().unwrap_or_else(|p| p.into_inner());
            for (id, tx) in members.iter() {
                match tx.try_send(msg.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        report.dropped += 1;
                        tracing::warn!(target: "broadcast", subscriber = *id, "subscriber buffer full, pulse skipped");
                    }
                    Err(TrySendError::Closed(_)) => gone.push(*id),
                }
            }
        }

        if !gone.is_empty() {
            let mut members = self.members.write().unwrap_or_else(|p| p.into_inner());
            for id in &gone {
                members.remove(id);
                tracing::info!(target: "broadcast", subscriber = *id, "subscriber unreachable, removed");
            }
            gauge!("pulse_subscribers").set(members.len() as f64);
            report.removed = gone.len();
        }

        counter!("pulse_published_total").increment(1);
        if report.dropped > 0 {
            counter!("pulse_delivery_dropped_total").increment(report.dropped as u64);
        }
        Ok(report)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}
