//! Long-running queue consumers for the scrape and notify queues.
//!
//! Each consumer handles one message at a time. The ack discipline differs
//! by queue: a failed scrape is left unacknowledged so the broker redelivers
//! it, while a failed notify is terminated without requeue - a malformed or
//! permanently undeliverable notification must not loop forever.

use anyhow::{Context, Result};
use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::stream::Stream;
use async_nats::jetstream::AckKind;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use crate::kernel::broker::{
    BrokerPublisher, NOTIFY_CONSUMER, NOTIFY_SUBJECT, SCRAPE_CONSUMER, SCRAPE_SUBJECT,
};
use crate::kernel::messages::NotifyJob;
use crate::kernel::scraper::handle_scrape_message;
use crate::kernel::traits::{BaseMailer, BaseObjectStore, BaseWebsiteStore};

/// Validate one notify message and dispatch the email when the page changed.
pub async fn handle_notify_message(payload: &[u8], mailer: &dyn BaseMailer) -> Result<()> {
    let job = NotifyJob::from_bytes(payload)?;

    if job.has_changed {
        mailer
            .send_update_email(&job.user_email, &job.url)
            .await
            .with_context(|| format!("Failed to send update email for {}", job.url))?;
        tracing::info!("Email sent successfully for website: {}", job.url);
    } else {
        tracing::debug!("Notify job for {} carried no change, skipping", job.url);
    }

    Ok(())
}

/// Ack deadline for an in-flight scrape job.
///
/// A deep scrape holds its delivery far past the broker's 30 s default:
/// navigation and hydration are each bounded at 30 s and every scroll
/// iteration pauses at least a second, so the claim must cover the whole
/// browser session or the broker redelivers mid-scrape.
const SCRAPE_ACK_WAIT: Duration = Duration::from_secs(15 * 60);

/// Redelivery ceiling for a scrape job that keeps failing.
const SCRAPE_MAX_DELIVER: i64 = 5;

fn scrape_consumer_config() -> pull::Config {
    pull::Config {
        durable_name: Some(SCRAPE_CONSUMER.to_string()),
        filter_subject: SCRAPE_SUBJECT.to_string(),
        ack_wait: SCRAPE_ACK_WAIT,
        max_deliver: SCRAPE_MAX_DELIVER,
        ..Default::default()
    }
}

fn notify_consumer_config() -> pull::Config {
    pull::Config {
        durable_name: Some(NOTIFY_CONSUMER.to_string()),
        filter_subject: NOTIFY_SUBJECT.to_string(),
        ..Default::default()
    }
}

async fn pull_consumer(
    stream: &Stream,
    config: pull::Config,
) -> Result<async_nats::jetstream::consumer::Consumer<pull::Config>> {
    let name = config.durable_name.clone().unwrap_or_default();
    let consumer = stream
        .get_or_create_consumer(&name, config)
        .await
        .with_context(|| format!("Failed to create consumer {}", name))?;
    Ok(consumer)
}

/// Consume the scrape queue until the stream ends.
pub async fn run_scrape_consumer(
    stream: &Stream,
    store: Arc<dyn BaseWebsiteStore>,
    storage: Arc<dyn BaseObjectStore>,
    publisher: Arc<dyn BrokerPublisher>,
) -> Result<()> {
    let consumer = pull_consumer(stream, scrape_consumer_config()).await?;
    let mut messages = consumer
        .messages()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open scrape message stream: {}", e))?;

    tracing::info!("Scrape consumer listening on {}", SCRAPE_SUBJECT);

    while let Some(message) = messages.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("Scrape consumer stream error: {}", e);
                continue;
            }
        };

        match handle_scrape_message(
            &message.payload,
            store.as_ref(),
            storage.as_ref(),
            publisher.as_ref(),
        )
        .await
        {
            Ok(sections) => {
                tracing::info!("Scrape completed with {} text sections", sections.len());
                if let Err(e) = message.ack().await {
                    tracing::error!("Failed to ack scrape message: {}", e);
                }
            }
            Err(e) => {
                // No ack: the broker redelivers the job
                tracing::error!("Scrape job failed, leaving message for redelivery: {:#}", e);
            }
        }
    }

    Ok(())
}

/// Consume the notify queue until the stream ends.
pub async fn run_notify_consumer(stream: &Stream, mailer: Arc<dyn BaseMailer>) -> Result<()> {
    let consumer = pull_consumer(stream, notify_consumer_config()).await?;
    let mut messages = consumer
        .messages()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open notify message stream: {}", e))?;

    tracing::info!("Notify consumer listening on {}", NOTIFY_SUBJECT);

    while let Some(message) = messages.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("Notify consumer stream error: {}", e);
                continue;
            }
        };

        match handle_notify_message(&message.payload, mailer.as_ref()).await {
            Ok(()) => {
                if let Err(e) = message.ack().await {
                    tracing::error!("Failed to ack notify message: {}", e);
                }
            }
            Err(e) => {
                tracing::error!("Error processing mail message: {:#}", e);
                // Terminate without requeue
                if let Err(e) = message.ack_with(AckKind::Term).await {
                    tracing::error!("Failed to terminate notify message: {}", e);
                }
            }
        }
    }

    Ok(())
}
