//! Transactional outbox and its relay.
//!
//! In outbox mode a producer stages the envelope in the same step as its
//! local commit instead of publishing inline. The relay drains staged
//! entries in order, retrying a failed publish with backoff until it goes
//! through, so a bus outage delays events instead of losing them. Each
//! entry keeps one message id across retries; the `JetStream` backend uses
//! it to discard duplicates when an acknowledgement was lost.

use std::collections::VecDeque;
use std::sync::Arc;

use disa_events::EventEnvelope;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::Bus;
use crate::retry::RetryPolicy;
use crate::shutdown::wait_for;

/// An envelope waiting to be published.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    /// Message id, stable across retries.
    pub id: Uuid,
    /// The staged event.
    pub envelope: EventEnvelope,
    /// Failed publish attempts so far.
    pub attempts: u32,
}

/// Ordered store of staged envelopes shared by producers and the relay.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    entries: Arc<Mutex<VecDeque<OutboxEntry>>>,
    notify: Arc<Notify>,
}

impl Outbox {
    /// An empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an envelope for publication and wake the relay.
    pub async fn stage(&self, envelope: EventEnvelope) -> Uuid {
        let id = Uuid::now_v7();
        self.entries.lock().await.push_back(OutboxEntry {
            id,
            envelope,
            attempts: 0,
        });
        self.notify.notify_one();
        id
    }

    /// Number of entries not yet published.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether everything staged has been published.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn front(&self) -> Option<OutboxEntry> {
        self.entries.lock().await.front().cloned()
    }

    async fn remove(&self, id: Uuid) {
        let mut entries = self.entries.lock().await;
        if entries.front().is_some_and(|e| e.id == id) {
            entries.pop_front();
        }
    }

    async fn record_failure(&self, id: Uuid) -> u32 {
        let mut entries = self.entries.lock().await;
        match entries.front_mut() {
            Some(entry) if entry.id == id => {
                entry.attempts = entry.attempts.saturating_add(1);
                entry.attempts
            }
            _ => 0,
        }
    }
}

/// Background task publishing staged envelopes in order.
#[derive(Debug)]
pub struct OutboxRelay {
    outbox: Outbox,
    bus: Bus,
    retry: RetryPolicy,
}

impl OutboxRelay {
    /// Create a relay draining `outbox` onto `bus`.
    pub const fn new(outbox: Outbox, bus: Bus, retry: RetryPolicy) -> Self {
        Self { outbox, bus, retry }
    }

    /// Run until `shutdown` fires. Entries still staged at that point stay
    /// in the outbox.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(backend = self.bus.name(), "outbox relay started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let Some(entry) = self.outbox.front().await else {
                tokio::select! {
                    () = self.outbox.notify.notified() => {}
                    () = wait_for(&mut shutdown) => break,
                }
                continue;
            };

            let message_id = entry.id.to_string();
            let routing_key = entry.envelope.routing_key();
            match self.bus.publish(&entry.envelope, Some(&message_id)).await {
                Ok(()) => {
                    self.outbox.remove(entry.id).await;
                    debug!(
                        message_id = message_id,
                        routing_key = %routing_key,
                        attempts = entry.attempts,
                        "outbox entry published"
                    );
                }
                Err(e) => {
                    let attempts = self.outbox.record_failure(entry.id).await;
                    let delay = self.retry.delay(attempts.saturating_sub(1));
                    warn!(
                        message_id = message_id,
                        routing_key = %routing_key,
                        attempts = attempts,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "outbox publish failed, will retry"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = wait_for(&mut shutdown) => break,
                    }
                }
            }
        }
        let pending = self.outbox.len().await;
        info!(pending, "outbox relay stopped");
    }

    /// Spawn [`OutboxRelay::run`] on the runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use disa_events::{IncidentCreated, QueueBinding, RoutingKey};

    use super::*;
    use crate::memory::MemoryBus;
    use crate::shutdown::Shutdown;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            first_ms: 5,
            max_ms: 20,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn relay_publishes_in_order() {
        let memory = MemoryBus::new();
        memory
            .declare(&QueueBinding::durable("q", RoutingKey::IncidentCreated.as_str()))
            .await;
        let outbox = Outbox::new();
        for n in 1..=3_u64 {
            outbox
                .stage(EventEnvelope::now(IncidentCreated {
                    incident_id: Some(n.into()),
                    ..IncidentCreated::default()
                }))
                .await;
        }

        let shutdown = Shutdown::new();
        let relay = OutboxRelay::new(outbox.clone(), Bus::Memory(memory.clone()), fast_retry())
            .spawn(shutdown.subscribe());

        let mut rx = memory.subscribe("q").await.unwrap();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let delivery = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(delivery.message_id.is_some());
            let env = EventEnvelope::decode(&delivery.body, None).unwrap();
            if let disa_events::Event::IncidentCreated(p) = env.event {
                ids.push(p.incident_id.map(u64::from));
            }
        }
        assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);

        shutdown.trigger();
        relay.await.unwrap();
        assert!(outbox.is_empty().await);
    }

    #[tokio::test]
    async fn relay_retries_through_an_outage() {
        let memory = MemoryBus::new();
        memory
            .declare(&QueueBinding::durable("q", RoutingKey::IncidentCreated.as_str()))
            .await;
        memory.set_available(false).await;

        let outbox = Outbox::new();
        outbox.stage(EventEnvelope::now(IncidentCreated::default())).await;

        let shutdown = Shutdown::new();
        let relay = OutboxRelay::new(outbox.clone(), Bus::Memory(memory.clone()), fast_retry())
            .spawn(shutdown.subscribe());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(outbox.len().await, 1);
        let staged = outbox.front().await.unwrap();
        assert!(staged.attempts >= 1);

        memory.set_available(true).await;
        let mut rx = memory.subscribe("q").await.unwrap();
        let delivery = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.message_id, Some(staged.id.to_string()));

        shutdown.trigger();
        relay.await.unwrap();
        assert!(outbox.is_empty().await);
    }

    #[tokio::test]
    async fn stopped_relay_keeps_pending_entries() {
        let memory = MemoryBus::new();
        memory.set_available(false).await;
        let outbox = Outbox::new();
        outbox.stage(EventEnvelope::now(IncidentCreated::default())).await;

        let shutdown = Shutdown::new();
        let relay = OutboxRelay::new(outbox.clone(), Bus::Memory(memory), fast_retry())
            .spawn(shutdown.subscribe());
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.trigger();
        relay.await.unwrap();
        assert_eq!(outbox.len().await, 1);
    }
}
