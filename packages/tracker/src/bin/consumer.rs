// Queue consumer process: runs the deep-scrape and notify consumers

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracker_core::kernel::broker::{ensure_topology, JetStreamPublisher};
use tracker_core::kernel::consumers::{run_notify_consumer, run_scrape_consumer};
use tracker_core::kernel::mailer::SesMailer;
use tracker_core::kernel::storage::S3ObjectStore;
use tracker_core::kernel::store::PostgresWebsiteStore;
use tracker_core::{Config, ConsumerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tracker_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting queue consumers");

    let config = Config::from_env().context("Failed to load configuration")?;
    let consumer_config =
        ConsumerConfig::from_env().context("Failed to load consumer configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let client = async_nats::connect(&config.nats_url)
        .await
        .context("Failed to connect to broker")?;
    let jetstream = async_nats::jetstream::new(client);
    let stream = ensure_topology(&jetstream).await?;

    let store = Arc::new(PostgresWebsiteStore::new(pool));
    let storage = Arc::new(S3ObjectStore::from_env(consumer_config.s3_bucket).await);
    let mailer = Arc::new(SesMailer::from_env(consumer_config.ses_from_email).await);
    let publisher = Arc::new(JetStreamPublisher::new(jetstream));

    tokio::try_join!(
        run_scrape_consumer(&stream, store, storage, publisher),
        run_notify_consumer(&stream, mailer),
    )?;

    Ok(())
}
