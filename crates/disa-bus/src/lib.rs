//! Topic bus runtime for the DISA event choreography.
//!
//! Producers hold an [`EventPublisher`]; consumers run one [`Listener`] per
//! durable queue, each feeding a [`Reaction`]. Both sit on a [`Bus`], which
//! is either an in-process topic exchange or NATS `JetStream`.
//!
//! # Architecture
//!
//! ```text
//! service commit --> EventPublisher --(best effort | outbox + relay)--> Bus
//!                                                                        |
//!                        topic match on routing key, one copy per queue  |
//!                                                                        v
//!                      Listener(queue) --> Reaction --> ack (+ dead letter)
//! ```
//!
//! # Modules
//!
//! - [`bus`] -- Backend-agnostic handle, subscriptions and acknowledgements
//! - [`memory`] -- In-process topic exchange
//! - [`nats`] -- `JetStream` backend
//! - [`publisher`] -- Producer-side emission with swallowed failures
//! - [`outbox`] -- Staged envelopes and the retrying relay
//! - [`listener`] -- Per-queue consumers with failure isolation
//! - [`retry`] -- Backoff with jitter
//! - [`shutdown`] -- Stop signal shared by all loops
//! - [`error`] -- Bus and reaction errors

pub mod bus;
pub mod error;
pub mod listener;
pub mod memory;
pub mod nats;
pub mod outbox;
pub mod publisher;
pub mod retry;
pub mod shutdown;

pub use bus::{Bus, InboundMessage, Subscription};
pub use error::{BusError, ReactionError};
pub use listener::{FailedMessage, FailurePolicy, Listener, ListenerConfig, ListenerStats, Reaction};
pub use memory::{Delivery, MemoryBus};
pub use nats::NatsBus;
pub use outbox::{Outbox, OutboxEntry, OutboxRelay};
pub use publisher::{EventPublisher, PublishMode, PublishReceipt};
pub use retry::RetryPolicy;
pub use shutdown::Shutdown;
