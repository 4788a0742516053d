//! NATS `JetStream` backend.
//!
//! The topic exchange maps onto one `JetStream` stream capturing
//! `{prefix}.>`; a routing key `incident.created` is published on subject
//! `{prefix}.incident.created`. Each durable queue becomes a durable pull
//! consumer whose filter subject is the binding pattern translated to NATS
//! wildcards (`*` stays `*`, a trailing `#` becomes `>`). Publishes carry a
//! `Nats-Msg-Id` header when the producer supplies an id, so outbox retries
//! are de-duplicated by the server.

use std::time::Duration;

use async_nats::jetstream::{self, consumer, stream};
use disa_events::QueueBinding;
use tracing::{debug, info};

use crate::error::BusError;

/// Server-side de-duplication window for `Nats-Msg-Id`.
const DUPLICATE_WINDOW: Duration = Duration::from_secs(120);

/// `JetStream` client wrapper.
#[derive(Clone)]
pub struct NatsBus {
    jetstream: jetstream::Context,
    stream_name: String,
    prefix: String,
}

impl std::fmt::Debug for NatsBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsBus")
            .field("stream_name", &self.stream_name)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl NatsBus {
    /// Connect to NATS and make sure the backing stream exists.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Nats`] if the connection or stream setup fails.
    pub async fn connect(url: &str, stream_name: &str, prefix: &str) -> Result<Self, BusError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Nats(format!("failed to connect to {url}: {e}")))?;
        let jetstream = jetstream::new(client);

        jetstream
            .get_or_create_stream(stream::Config {
                name: stream_name.to_owned(),
                subjects: vec![format!("{prefix}.>")],
                duplicate_window: DUPLICATE_WINDOW,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Nats(format!("failed to create stream {stream_name}: {e}")))?;
        info!(stream = stream_name, prefix = prefix, "JetStream stream ready");

        Ok(Self {
            jetstream,
            stream_name: stream_name.to_owned(),
            prefix: prefix.to_owned(),
        })
    }

    /// Subject carrying `routing_key`.
    pub fn subject(&self, routing_key: &str) -> String {
        format!("{}.{routing_key}", self.prefix)
    }

    /// Strip the subject prefix to recover the routing key.
    pub fn routing_key<'a>(&self, subject: &'a str) -> &'a str {
        subject
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(subject)
    }

    /// Create (or reuse) the durable consumer backing a queue.
    ///
    /// # Errors
    ///
    /// - [`BusError::UnsupportedPattern`] if the pattern uses `#` before its last word
    /// - [`BusError::Nats`] if the consumer cannot be created
    pub async fn declare(&self, binding: &QueueBinding) -> Result<(), BusError> {
        let filter_subject = filter_subject(&self.prefix, &binding.pattern)?;
        let durable = durable_name(&binding.queue);
        let stream = self.stream().await?;
        stream
            .get_or_create_consumer(
                &durable,
                consumer::pull::Config {
                    durable_name: binding.durable.then(|| durable.clone()),
                    filter_subject: filter_subject.clone(),
                    ack_policy: consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Nats(format!("failed to declare consumer {durable}: {e}")))?;
        debug!(queue = binding.queue, filter_subject = filter_subject, "consumer declared");
        Ok(())
    }

    /// Publish a message and wait for the stream's acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Nats`] if the publish or its acknowledgement fails.
    pub async fn publish(
        &self,
        routing_key: &str,
        body: Vec<u8>,
        message_id: Option<&str>,
    ) -> Result<(), BusError> {
        let subject = self.subject(routing_key);
        let mut headers = async_nats::HeaderMap::new();
        if let Some(id) = message_id {
            headers.insert("Nats-Msg-Id", id);
        }
        let ack = self
            .jetstream
            .publish_with_headers(subject.clone(), headers, body.into())
            .await
            .map_err(|e| BusError::Nats(format!("failed to publish to {subject}: {e}")))?;
        ack.await
            .map_err(|e| BusError::Nats(format!("publish to {subject} not acknowledged: {e}")))?;
        Ok(())
    }

    /// Open the message stream of a declared queue.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::QueueNotDeclared`] if no consumer exists for the
    /// queue, or [`BusError::Nats`] if the pull stream cannot be opened.
    pub async fn subscribe(&self, queue: &str) -> Result<consumer::pull::Stream, BusError> {
        let durable = durable_name(queue);
        let stream = self.stream().await?;
        let consumer: consumer::PullConsumer = stream
            .get_consumer(&durable)
            .await
            .map_err(|e| BusError::QueueNotDeclared(format!("{queue}: {e}")))?;
        consumer
            .messages()
            .await
            .map_err(|e| BusError::Nats(format!("failed to open messages for {queue}: {e}")))
    }

    async fn stream(&self) -> Result<stream::Stream, BusError> {
        self.jetstream
            .get_stream(&self.stream_name)
            .await
            .map_err(|e| BusError::Nats(format!("failed to get stream {}: {e}", self.stream_name)))
    }
}

/// `JetStream` consumer names may not contain dots.
fn durable_name(queue: &str) -> String {
    queue.replace('.', "_")
}

/// Translate a topic pattern into a NATS filter subject under `prefix`.
fn filter_subject(prefix: &str, pattern: &str) -> Result<String, BusError> {
    let words: Vec<&str> = pattern.split('.').collect();
    let last = words.len().saturating_sub(1);
    let mut translated = Vec::with_capacity(words.len());
    for (i, word) in words.iter().enumerate() {
        match *word {
            "#" if i == last => translated.push(">"),
            "#" => return Err(BusError::UnsupportedPattern(pattern.to_owned())),
            other => translated.push(other),
        }
    }
    Ok(format!("{prefix}.{}", translated.join(".")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn durable_names_have_no_dots() {
        assert_eq!(
            durable_name("mission.incident.created.queue"),
            "mission_incident_created_queue"
        );
    }

    #[test]
    fn patterns_translate_to_filter_subjects() {
        assert_eq!(
            filter_subject("disaster", "incident.created").unwrap(),
            "disaster.incident.created"
        );
        assert_eq!(filter_subject("disaster", "incident.*").unwrap(), "disaster.incident.*");
        assert_eq!(
            filter_subject("disaster", "deadletter.#").unwrap(),
            "disaster.deadletter.>"
        );
        assert!(matches!(
            filter_subject("disaster", "#.completed"),
            Err(BusError::UnsupportedPattern(_))
        ));
    }

    #[tokio::test]
    #[ignore = "requires a running NATS server with JetStream"]
    async fn publish_and_consume_round_trip() {
        use futures::StreamExt;

        let bus = NatsBus::connect("nats://localhost:4222", "DISASTER_TEST", "disastertest")
            .await
            .unwrap();
        bus.declare(&QueueBinding::durable("test.incident.created.queue", "incident.created"))
            .await
            .unwrap();
        bus.publish("incident.created", b"{}".to_vec(), Some("test-1")).await.unwrap();

        let mut messages = bus.subscribe("test.incident.created.queue").await.unwrap();
        let msg = messages.next().await.unwrap().unwrap();
        assert_eq!(bus.routing_key(msg.subject.as_str()), "incident.created");
        msg.ack().await.unwrap();
    }
}
