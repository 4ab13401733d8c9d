//! Broker fabric for the scrape/notify hand-off.
//!
//! One durable JetStream stream plays the role of a direct exchange: the
//! two subjects below are the routing keys, and each queue is a durable
//! pull consumer filtered to its subject. Explicit acknowledgment gives
//! at-least-once delivery; `AckKind::Term` is the reject-without-requeue
//! path used by the notifier.
//!
//! Publishing goes through the `BrokerPublisher` trait so tests can swap
//! in a recording broker without a live server.

use anyhow::{Context, Result};
use async_nats::jetstream;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::RwLock;

/// Stream backing the job exchange.
pub const EXCHANGE_STREAM: &str = "jobtrack";

/// Routing key for deep-scrape jobs.
pub const SCRAPE_SUBJECT: &str = "jobtrack.scrape";

/// Routing key for notification jobs.
pub const NOTIFY_SUBJECT: &str = "jobtrack.notify";

/// Durable consumer name for the scrape queue.
pub const SCRAPE_CONSUMER: &str = "scrape-worker";

/// Durable consumer name for the notify queue.
pub const NOTIFY_CONSUMER: &str = "notify-worker";

/// Create the exchange stream if it does not exist yet.
///
/// File storage makes published messages survive broker restarts, the
/// equivalent of durable queues with persistent publishes.
pub async fn ensure_topology(
    context: &jetstream::Context,
) -> Result<jetstream::stream::Stream> {
    let stream = context
        .get_or_create_stream(jetstream::stream::Config {
            name: EXCHANGE_STREAM.to_string(),
            subjects: vec![format!("{}.>", EXCHANGE_STREAM)],
            storage: jetstream::stream::StorageType::File,
            ..Default::default()
        })
        .await
        .context("Failed to create job stream")?;
    Ok(stream)
}

/// A published message.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub subject: String,
    pub payload: Bytes,
}

/// Trait for broker publish operations.
///
/// This allows swapping between a real JetStream context and test mocks.
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Publish a message to a subject, durably.
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()>;
}

/// Real JetStream-backed publisher.
pub struct JetStreamPublisher {
    context: jetstream::Context,
}

impl JetStreamPublisher {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl BrokerPublisher for JetStreamPublisher {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        // Awaiting the publish ack confirms the message was persisted
        self.context
            .publish(subject, payload)
            .await
            .context("Failed to publish message")?
            .await
            .context("Broker did not acknowledge publish")?;
        Ok(())
    }
}

/// Mock broker that tracks published messages for testing.
///
/// This allows tests to inspect what messages would have been published
/// without requiring a real connection.
#[derive(Default)]
pub struct TestBroker {
    published: RwLock<Vec<PublishedMessage>>,
}

impl TestBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all published messages.
    pub fn published_messages(&self) -> Vec<PublishedMessage> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Get published messages for a specific subject.
    pub fn messages_for_subject(&self, subject: &str) -> Vec<PublishedMessage> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    /// Check if any message was published to a subject.
    pub fn was_published_to(&self, subject: &str) -> bool {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|m| m.subject == subject)
    }
}

#[async_trait]
impl BrokerPublisher for TestBroker {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedMessage { subject, payload });
        Ok(())
    }
}
