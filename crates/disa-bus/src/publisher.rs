//! Producer-side event emission.
//!
//! Producers call [`EventPublisher::emit`] after their local commit. The
//! commit is never rolled back: in best-effort mode a bus failure is logged
//! as an alertable error and swallowed, and in outbox mode the envelope is
//! staged for the relay instead of being sent inline.

use disa_events::{Event, EventEnvelope, Service};
use serde::Deserialize;
use tracing::{error, info};

use crate::bus::Bus;
use crate::outbox::Outbox;

/// How a producer hands events to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// Publish inline; log and drop on failure.
    #[default]
    BestEffort,
    /// Stage in the outbox; the relay publishes with retries.
    Outbox,
}

/// What happened to an emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishReceipt {
    /// The bus accepted it.
    Published,
    /// It is waiting in the outbox.
    Staged,
    /// The bus was unavailable and the event was lost.
    Dropped,
}

/// Emits events on behalf of one producer service.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    bus: Bus,
    source: Service,
    outbox: Option<Outbox>,
}

impl EventPublisher {
    /// Publish inline, swallowing bus failures.
    pub const fn best_effort(bus: Bus, source: Service) -> Self {
        Self {
            bus,
            source,
            outbox: None,
        }
    }

    /// Stage every event in `outbox`.
    pub const fn with_outbox(bus: Bus, source: Service, outbox: Outbox) -> Self {
        Self {
            bus,
            source,
            outbox: Some(outbox),
        }
    }

    /// The publishing mode.
    pub const fn mode(&self) -> PublishMode {
        if self.outbox.is_some() {
            PublishMode::Outbox
        } else {
            PublishMode::BestEffort
        }
    }

    /// The service this publisher emits for.
    pub const fn source(&self) -> Service {
        self.source
    }

    /// Emit an event. Never fails: the caller's commit already happened.
    pub async fn emit(&self, event: impl Into<Event>) -> PublishReceipt {
        let envelope = EventEnvelope::now(event);
        let routing_key = envelope.routing_key();

        if let Some(outbox) = &self.outbox {
            let id = outbox.stage(envelope).await;
            info!(
                service = %self.source,
                routing_key = %routing_key,
                message_id = %id,
                "event staged in outbox"
            );
            return PublishReceipt::Staged;
        }

        match self.bus.publish(&envelope, None).await {
            Ok(()) => {
                info!(service = %self.source, routing_key = %routing_key, "event published");
                PublishReceipt::Published
            }
            Err(e) => {
                error!(
                    alert = true,
                    service = %self.source,
                    routing_key = %routing_key,
                    error = %e,
                    "failed to publish event, local change kept"
                );
                PublishReceipt::Dropped
            }
        }
    }
}
