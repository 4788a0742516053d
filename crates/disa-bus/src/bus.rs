//! Backend-agnostic bus handle.
//!
//! Enum dispatch over the in-memory exchange and `JetStream`, avoiding the
//! dyn-compatibility issues with async trait methods.

use async_nats::jetstream;
use disa_events::{EventEnvelope, QueueBinding, Service};
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::error::BusError;
use crate::memory::{Delivery, MemoryBus};
use crate::nats::NatsBus;

/// A topic bus shared by every producer and consumer of one node.
#[derive(Debug, Clone)]
pub enum Bus {
    /// In-process exchange.
    Memory(MemoryBus),
    /// NATS `JetStream`.
    Nats(NatsBus),
}

impl Bus {
    /// A fresh in-memory bus.
    pub fn in_memory() -> Self {
        Self::Memory(MemoryBus::new())
    }

    /// Human-readable backend name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Nats(_) => "nats",
        }
    }

    /// Declare a durable queue and its binding.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the queue cannot be declared.
    pub async fn declare(&self, binding: &QueueBinding) -> Result<(), BusError> {
        match self {
            Self::Memory(bus) => {
                bus.declare(binding).await;
                Ok(())
            }
            Self::Nats(bus) => bus.declare(binding).await,
        }
    }

    /// Declare every queue `service` consumes, plus the matching
    /// dead-letter queues when `dead_letter` is set, plus the queues it
    /// publishes into for outside readers. Returns only the bindings the
    /// service consumes.
    ///
    /// # Errors
    ///
    /// Returns the first declaration error.
    pub async fn declare_service(
        &self,
        service: Service,
        dead_letter: bool,
    ) -> Result<Vec<QueueBinding>, BusError> {
        let bindings = service.bindings();
        for binding in &bindings {
            self.declare(binding).await?;
            if dead_letter {
                self.declare(&QueueBinding::dead_letter(&binding.queue)).await?;
            }
        }
        for binding in service.published_queues() {
            self.declare(&binding).await?;
        }
        Ok(bindings)
    }

    /// Encode an envelope and publish it under its routing key.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Codec`] if encoding fails, or a backend error if
    /// the broker rejects or cannot receive the message.
    pub async fn publish(
        &self,
        envelope: &EventEnvelope,
        message_id: Option<&str>,
    ) -> Result<(), BusError> {
        let body = envelope.encode()?;
        self.publish_raw(envelope.routing_key().as_str(), body, message_id)
            .await
    }

    /// Publish an already-encoded body under an arbitrary routing key.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the broker rejects or cannot receive the
    /// message.
    pub async fn publish_raw(
        &self,
        routing_key: &str,
        body: Vec<u8>,
        message_id: Option<&str>,
    ) -> Result<(), BusError> {
        match self {
            Self::Memory(bus) => bus
                .publish(routing_key, body, message_id.map(ToOwned::to_owned))
                .await
                .map(|_| ()),
            Self::Nats(bus) => bus.publish(routing_key, body, message_id).await,
        }
    }

    /// Start consuming a declared queue.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::QueueNotDeclared`] for an unknown queue, or a
    /// backend error if consumption cannot start.
    pub async fn subscribe(&self, queue: &str) -> Result<Subscription, BusError> {
        match self {
            Self::Memory(bus) => Ok(Subscription::Memory(bus.subscribe(queue).await?)),
            Self::Nats(bus) => Ok(Subscription::Nats {
                messages: Box::new(bus.subscribe(queue).await?),
                bus: bus.clone(),
            }),
        }
    }
}

/// A stream of messages from one queue.
pub enum Subscription {
    /// In-memory queue receiver.
    Memory(mpsc::UnboundedReceiver<Delivery>),
    /// `JetStream` pull consumer.
    Nats {
        /// Pull stream of the durable consumer.
        messages: Box<jetstream::consumer::pull::Stream>,
        /// Owning bus, used to map subjects back to routing keys.
        bus: NatsBus,
    },
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory(_) => f.write_str("Subscription::Memory"),
            Self::Nats { bus, .. } => f.debug_struct("Subscription::Nats").field("bus", bus).finish(),
        }
    }
}

impl Subscription {
    /// Wait for the next message. `None` once the queue is closed.
    pub async fn next(&mut self) -> Option<Result<InboundMessage, BusError>> {
        match self {
            Self::Memory(rx) => rx.recv().await.map(|d| {
                Ok(InboundMessage {
                    routing_key: d.routing_key,
                    body: d.body,
                    acker: Acker::Memory,
                })
            }),
            Self::Nats { messages, bus } => {
                let item = messages.next().await?;
                Some(
                    item.map_err(|e| BusError::Nats(format!("failed to receive message: {e}")))
                        .map(|msg| InboundMessage {
                            routing_key: bus.routing_key(msg.subject.as_str()).to_owned(),
                            body: msg.payload.to_vec(),
                            acker: Acker::Nats(Box::new(msg)),
                        }),
                )
            }
        }
    }
}

#[derive(Debug)]
enum Acker {
    Memory,
    Nats(Box<jetstream::Message>),
}

/// A received message awaiting acknowledgement.
#[derive(Debug)]
pub struct InboundMessage {
    /// Routing key the message was published under.
    pub routing_key: String,
    /// Encoded envelope.
    pub body: Vec<u8>,
    acker: Acker,
}

impl InboundMessage {
    /// Acknowledge the message so the broker will not redeliver it.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Nats`] if the acknowledgement cannot be sent.
    pub async fn ack(self) -> Result<(), BusError> {
        match self.acker {
            Acker::Memory => Ok(()),
            Acker::Nats(msg) => msg
                .ack()
                .await
                .map_err(|e| BusError::Nats(format!("failed to ack message: {e}"))),
        }
    }
}
