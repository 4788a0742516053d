//! In-process topic exchange.
//!
//! Behaves like a broker-side topic exchange for a single process: queues
//! are declared with one or more binding patterns, every publish is copied
//! into each queue whose pattern matches, and messages buffer in the queue
//! until its single consumer takes them. Used by tests and by a node that
//! hosts every service in one process.

use std::collections::BTreeMap;
use std::sync::Arc;

use disa_events::{QueueBinding, matches};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::error::BusError;

/// A message sitting in an in-memory queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Routing key it was published under.
    pub routing_key: String,
    /// Encoded envelope.
    pub body: Vec<u8>,
    /// Producer-supplied id, if any.
    pub message_id: Option<String>,
}

#[derive(Debug)]
struct Queue {
    patterns: Vec<String>,
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Option<mpsc::UnboundedReceiver<Delivery>>,
}

#[derive(Debug, Default)]
struct Exchange {
    queues: BTreeMap<String, Queue>,
    unavailable: bool,
}

/// Shared handle to an in-process exchange. Clones share the same queues.
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Mutex<Exchange>>,
}

impl MemoryBus {
    /// Create an empty exchange.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a queue and bind it. Idempotent; redeclaring with a new
    /// pattern adds a second binding.
    pub async fn declare(&self, binding: &QueueBinding) {
        let mut exchange = self.inner.lock().await;
        let queue = exchange
            .queues
            .entry(binding.queue.clone())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                Queue {
                    patterns: Vec::new(),
                    tx,
                    rx: Some(rx),
                }
            });
        if !queue.patterns.contains(&binding.pattern) {
            queue.patterns.push(binding.pattern.clone());
            debug!(queue = binding.queue, pattern = binding.pattern, "queue bound");
        }
    }

    /// Route a message to every matching queue.
    ///
    /// Returns how many queues received a copy. A message matching no queue
    /// is dropped with a warning, as a topic exchange would.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unavailable`] while the exchange is marked down.
    pub async fn publish(
        &self,
        routing_key: &str,
        body: Vec<u8>,
        message_id: Option<String>,
    ) -> Result<usize, BusError> {
        let exchange = self.inner.lock().await;
        if exchange.unavailable {
            return Err(BusError::Unavailable(
                "in-memory exchange is marked unavailable".to_owned(),
            ));
        }

        let delivery = Delivery {
            routing_key: routing_key.to_owned(),
            body,
            message_id,
        };
        let mut routed: usize = 0;
        for (name, queue) in &exchange.queues {
            if !queue.patterns.iter().any(|p| matches(p, routing_key)) {
                continue;
            }
            if queue.tx.send(delivery.clone()).is_ok() {
                routed = routed.saturating_add(1);
            } else {
                warn!(queue = name, routing_key, "queue consumer is gone, message dropped");
            }
        }

        if routed == 0 {
            warn!(routing_key, "message matched no queue and was dropped");
        }
        Ok(routed)
    }

    /// Take the receiving end of a queue.
    ///
    /// # Errors
    ///
    /// - [`BusError::QueueNotDeclared`] if the queue does not exist
    /// - [`BusError::AlreadyConsumed`] if another consumer already holds it
    pub async fn subscribe(
        &self,
        queue: &str,
    ) -> Result<mpsc::UnboundedReceiver<Delivery>, BusError> {
        let mut exchange = self.inner.lock().await;
        let entry = exchange
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::QueueNotDeclared(queue.to_owned()))?;
        entry
            .rx
            .take()
            .ok_or_else(|| BusError::AlreadyConsumed(queue.to_owned()))
    }

    /// Mark the exchange up or down. While down every publish fails.
    pub async fn set_available(&self, available: bool) {
        self.inner.lock().await.unavailable = !available;
    }

    /// Names of all declared queues.
    pub async fn queue_names(&self) -> Vec<String> {
        self.inner.lock().await.queues.keys().cloned().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fans_out_to_every_matching_queue() {
        let bus = MemoryBus::new();
        bus.declare(&QueueBinding::durable("mission.q", "incident.created")).await;
        bus.declare(&QueueBinding::durable("shelter.q", "incident.created")).await;
        bus.declare(&QueueBinding::durable("audit.q", "incident.#")).await;
        bus.declare(&QueueBinding::durable("task.q", "assessment.completed")).await;

        let routed = bus.publish("incident.created", b"{}".to_vec(), None).await.unwrap();
        assert_eq!(routed, 3);

        let mut task = bus.subscribe("task.q").await.unwrap();
        assert!(task.try_recv().is_err());
        let mut shelter = bus.subscribe("shelter.q").await.unwrap();
        assert_eq!(shelter.try_recv().unwrap().routing_key, "incident.created");
    }

    #[tokio::test]
    async fn messages_buffer_until_a_consumer_attaches() {
        let bus = MemoryBus::new();
        bus.declare(&QueueBinding::durable("q", "task.assigned")).await;
        for n in 0..3_u8 {
            bus.publish("task.assigned", vec![n], None).await.unwrap();
        }
        let mut rx = bus.subscribe("q").await.unwrap();
        let bodies: Vec<Vec<u8>> = (0..3).filter_map(|_| rx.try_recv().ok()).map(|d| d.body).collect();
        assert_eq!(bodies, vec![vec![0], vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn unavailable_exchange_rejects_publish() {
        let bus = MemoryBus::new();
        bus.declare(&QueueBinding::durable("q", "incident.created")).await;
        bus.set_available(false).await;
        let err = bus.publish("incident.created", Vec::new(), None).await;
        assert!(matches!(err, Err(BusError::Unavailable(_))));
        bus.set_available(true).await;
        assert_eq!(bus.publish("incident.created", Vec::new(), None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unroutable_messages_are_dropped() {
        let bus = MemoryBus::new();
        assert_eq!(bus.publish("incident.created", Vec::new(), None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn one_consumer_per_queue() {
        let bus = MemoryBus::new();
        assert!(matches!(bus.subscribe("nope").await, Err(BusError::QueueNotDeclared(_))));
        bus.declare(&QueueBinding::durable("q", "a.b")).await;
        bus.declare(&QueueBinding::durable("q", "a.b")).await;
        let _rx = bus.subscribe("q").await.unwrap();
        assert!(matches!(bus.subscribe("q").await, Err(BusError::AlreadyConsumed(_))));
        assert_eq!(bus.queue_names().await, vec!["q".to_owned()]);
    }
}
