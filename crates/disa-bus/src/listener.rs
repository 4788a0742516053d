//! Queue listeners: the consumer side of the choreography.
//!
//! A [`Listener`] owns one durable queue and hands each decoded event to a
//! [`Reaction`]. Failures are isolated per message: a reaction that errors
//! (or panics) is logged, the message is acknowledged anyway, and the
//! listener moves on to the next one. Under [`FailurePolicy::DeadLetter`]
//! the failed message is also republished on `deadletter.<queue>` for later
//! inspection.
//!
//! ```text
//! queue --> decode --> Reaction::react --> ack
//!              \             |
//!               +--- error --+--> log (+ dead-letter) --> ack
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use disa_events::{Event, EventEnvelope, dead_letter_key};
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{Bus, InboundMessage};
use crate::error::{BusError, ReactionError};
use crate::shutdown::wait_for;

/// A consumer service's reaction to events from its queues.
pub trait Reaction: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// React to one event. Errors fail only this message.
    fn react(&self, event: Event) -> impl Future<Output = Result<(), ReactionError>> + Send;
}

/// What to do with a message whose reaction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log and acknowledge.
    #[default]
    Drop,
    /// Log, republish on the dead-letter route, and acknowledge.
    DeadLetter,
}

/// Per-listener settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ListenerConfig {
    /// Messages handled at once. `1` keeps publish order.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Handling of failed messages.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

const fn default_concurrency() -> u32 {
    1
}

/// Counters for one listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    handled: AtomicU64,
    failed: AtomicU64,
    dead_lettered: AtomicU64,
}

impl ListenerStats {
    /// Messages whose reaction succeeded.
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    /// Messages whose reaction failed.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Failed messages republished on the dead-letter route.
    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }
}

/// Body of a dead-lettered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedMessage {
    /// Queue the message was read from.
    pub queue: String,
    /// Routing key it was published under.
    pub routing_key: String,
    /// Why the reaction failed.
    pub error: String,
    /// When it failed.
    pub failed_at: DateTime<Utc>,
    /// The original body, as JSON when it parses and as a string otherwise.
    pub original: serde_json::Value,
}

/// Consumes one queue until shutdown.
pub struct Listener<R> {
    queue: String,
    bus: Bus,
    reaction: Arc<R>,
    config: ListenerConfig,
    stats: Arc<ListenerStats>,
}

impl<R> std::fmt::Debug for Listener<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("queue", &self.queue)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<R: Reaction> Listener<R> {
    /// Create a listener for `queue`.
    pub fn new(queue: impl Into<String>, bus: Bus, reaction: Arc<R>, config: ListenerConfig) -> Self {
        Self {
            queue: queue.into(),
            bus,
            reaction,
            config,
            stats: Arc::new(ListenerStats::default()),
        }
    }

    /// Shared counters, readable while the listener runs.
    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Consume until `shutdown` fires or the queue closes, then wait for
    /// in-flight messages to finish.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] if the queue cannot be subscribed.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), BusError> {
        let mut subscription = self.bus.subscribe(&self.queue).await?;
        let permits = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(usize::try_from(permits).unwrap_or(1)));
        let handler = Arc::new(Handler {
            queue: self.queue.clone(),
            bus: self.bus.clone(),
            reaction: Arc::clone(&self.reaction),
            policy: self.config.failure_policy,
            stats: Arc::clone(&self.stats),
        });

        info!(
            queue = self.queue,
            reaction = self.reaction.name(),
            concurrency = permits,
            failure_policy = ?self.config.failure_policy,
            "listener started"
        );

        loop {
            let next = tokio::select! {
                () = wait_for(&mut shutdown) => break,
                next = subscription.next() => next,
            };
            let Some(next) = next else {
                warn!(queue = self.queue, "queue closed, listener stopping");
                break;
            };
            let message = match next {
                Ok(message) => message,
                Err(e) => {
                    error!(queue = self.queue, error = %e, "failed to receive message");
                    continue;
                }
            };
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                handler.handle(message).await;
                drop(permit);
            });
        }

        // Wait for in-flight handlers.
        if semaphore.acquire_many(permits).await.is_err() {
            warn!(queue = self.queue, "listener semaphore closed during drain");
        }
        info!(
            queue = self.queue,
            handled = self.stats.handled(),
            failed = self.stats.failed(),
            "listener stopped"
        );
        Ok(())
    }

    /// Spawn [`Listener::run`] on the runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<(), BusError>> {
        tokio::spawn(self.run(shutdown))
    }
}

struct Handler<R> {
    queue: String,
    bus: Bus,
    reaction: Arc<R>,
    policy: FailurePolicy,
    stats: Arc<ListenerStats>,
}

impl<R: Reaction> Handler<R> {
    async fn handle(&self, message: InboundMessage) {
        let outcome = match EventEnvelope::decode(&message.body, Some(&message.routing_key)) {
            Ok(envelope) => {
                let reaction = Arc::clone(&self.reaction);
                // Own task, so a panicking reaction only fails this message.
                match tokio::spawn(async move { reaction.react(envelope.event).await }).await {
                    Ok(result) => result,
                    Err(join) => Err(ReactionError::Failed(format!("reaction panicked: {join}"))),
                }
            }
            Err(e) => Err(ReactionError::from(e)),
        };

        match outcome {
            Ok(()) => {
                self.stats.handled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    queue = self.queue,
                    routing_key = message.routing_key,
                    reaction = self.reaction.name(),
                    "message handled"
                );
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    queue = self.queue,
                    routing_key = message.routing_key,
                    reaction = self.reaction.name(),
                    error = %e,
                    "reaction failed, message dropped"
                );
                if self.policy == FailurePolicy::DeadLetter {
                    self.dead_letter(&message, &e).await;
                }
            }
        }

        if let Err(e) = message.ack().await {
            warn!(queue = self.queue, error = %e, "failed to acknowledge message");
        }
    }

    async fn dead_letter(&self, message: &InboundMessage, err: &ReactionError) {
        let original = serde_json::from_slice(&message.body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&message.body).into_owned())
        });
        let failed = FailedMessage {
            queue: self.queue.clone(),
            routing_key: message.routing_key.clone(),
            error: err.to_string(),
            failed_at: Utc::now(),
            original,
        };
        let key = dead_letter_key(&self.queue);
        let body = match serde_json::to_vec(&failed) {
            Ok(body) => body,
            Err(e) => {
                error!(queue = self.queue, error = %e, "failed to encode dead letter");
                return;
            }
        };
        match self.bus.publish_raw(&key, body, None).await {
            Ok(()) => {
                self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
                info!(queue = self.queue, dead_letter_key = key, "message dead-lettered");
            }
            Err(e) => {
                error!(
                    alert = true,
                    queue = self.queue,
                    error = %e,
                    "failed to dead-letter message"
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use disa_events::{IncidentCreated, QueueBinding, RoutingKey};
    use tokio::sync::Mutex;

    use super::*;
    use crate::memory::MemoryBus;
    use crate::shutdown::Shutdown;

    /// Records codes it sees; fails on `INC-BAD`, panics on `INC-PANIC`.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Reaction for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn react(&self, event: Event) -> Result<(), ReactionError> {
            let Event::IncidentCreated(p) = event else {
                return Err(ReactionError::Unexpected("not incident.created".to_owned()));
            };
            let code = disa_events::required(p.incident_code.as_ref(), "incidentCode")?.clone();
            match code.as_str() {
                "INC-BAD" => Err(ReactionError::Failed("boom".to_owned())),
                "INC-PANIC" => panic!("reaction exploded"),
                _ => {
                    self.seen.lock().await.push(code);
                    Ok(())
                }
            }
        }
    }

    fn incident(code: Option<&str>) -> Vec<u8> {
        EventEnvelope::now(IncidentCreated {
            incident_code: code.map(ToOwned::to_owned),
            ..IncidentCreated::default()
        })
        .encode()
        .unwrap()
    }

    async fn setup(policy: FailurePolicy) -> (MemoryBus, Arc<Recorder>, Listener<Recorder>) {
        let memory = MemoryBus::new();
        memory
            .declare(&QueueBinding::durable("test.queue", RoutingKey::IncidentCreated.as_str()))
            .await;
        memory.declare(&QueueBinding::dead_letter("test.queue")).await;
        let recorder = Arc::new(Recorder::default());
        let listener = Listener::new(
            "test.queue",
            Bus::Memory(memory.clone()),
            Arc::clone(&recorder),
            ListenerConfig {
                concurrency: 1,
                failure_policy: policy,
            },
        );
        (memory, recorder, listener)
    }

    async fn wait_for_total(stats: &ListenerStats, total: u64) {
        for _ in 0..200 {
            if stats.handled().saturating_add(stats.failed()) >= total {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn failure_of_one_message_does_not_block_the_next() {
        let (memory, recorder, listener) = setup(FailurePolicy::Drop).await;
        let stats = listener.stats();
        let shutdown = Shutdown::new();
        let task = listener.spawn(shutdown.subscribe());

        for code in ["INC-001", "INC-BAD", "INC-PANIC", "INC-002"] {
            memory
                .publish("incident.created", incident(Some(code)), None)
                .await
                .unwrap();
        }
        memory.publish("incident.created", incident(None), None).await.unwrap();
        memory
            .publish("incident.created", b"not json".to_vec(), None)
            .await
            .unwrap();
        memory.publish("incident.created", incident(Some("INC-003")), None).await.unwrap();

        wait_for_total(&stats, 7).await;
        shutdown.trigger();
        task.await.unwrap().unwrap();

        assert_eq!(*recorder.seen.lock().await, vec!["INC-001", "INC-002", "INC-003"]);
        assert_eq!(stats.handled(), 3);
        assert_eq!(stats.failed(), 4);
        assert_eq!(stats.dead_lettered(), 0);
    }

    #[tokio::test]
    async fn dead_letter_policy_republishes_failures() {
        let (memory, _recorder, listener) = setup(FailurePolicy::DeadLetter).await;
        let stats = listener.stats();
        let shutdown = Shutdown::new();
        let task = listener.spawn(shutdown.subscribe());

        memory.publish("incident.created", incident(None), None).await.unwrap();
        wait_for_total(&stats, 1).await;
        shutdown.trigger();
        task.await.unwrap().unwrap();
        assert_eq!(stats.dead_lettered(), 1);

        let mut dlq = memory.subscribe("deadletter.test.queue").await.unwrap();
        let delivery = dlq.try_recv().unwrap();
        assert_eq!(delivery.routing_key, "deadletter.test.queue");
        let failed: FailedMessage = serde_json::from_slice(&delivery.body).unwrap();
        assert_eq!(failed.queue, "test.queue");
        assert_eq!(failed.routing_key, "incident.created");
        assert!(failed.error.contains("incidentCode"));
        assert_eq!(failed.original["eventType"], "incident.created");
    }

    #[tokio::test]
    async fn concurrent_listener_handles_everything() {
        let (memory, recorder, _) = setup(FailurePolicy::Drop).await;
        let listener = Listener::new(
            "test.queue",
            Bus::Memory(memory.clone()),
            Arc::clone(&recorder),
            ListenerConfig {
                concurrency: 4,
                failure_policy: FailurePolicy::Drop,
            },
        );
        let stats = listener.stats();
        let shutdown = Shutdown::new();
        let task = listener.spawn(shutdown.subscribe());

        for n in 0..20 {
            let code = format!("INC-{n:03}");
            memory.publish("incident.created", incident(Some(&code)), None).await.unwrap();
        }
        wait_for_total(&stats, 20).await;
        shutdown.trigger();
        task.await.unwrap().unwrap();

        assert_eq!(stats.handled(), 20);
        assert_eq!(recorder.seen.lock().await.len(), 20);
    }

    #[tokio::test]
    async fn missing_queue_fails_to_start() {
        let listener = Listener::new(
            "nope",
            Bus::in_memory(),
            Arc::new(Recorder::default()),
            ListenerConfig::default(),
        );
        let result = listener.run(Shutdown::new().subscribe()).await;
        assert!(matches!(result, Err(BusError::QueueNotDeclared(_))));
    }
}
