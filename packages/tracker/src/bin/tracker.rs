// Tracking scheduler service: probes due websites daily (or once with --once)

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracker_core::kernel::broker::{ensure_topology, JetStreamPublisher};
use tracker_core::kernel::prober::EtagProber;
use tracker_core::kernel::scheduled_tasks::start_scheduler;
use tracker_core::kernel::store::PostgresWebsiteStore;
use tracker_core::kernel::tracking::run_tracking_job;
use tracker_core::Config;

#[derive(Parser)]
#[command(about = "Website change tracking scheduler")]
struct Args {
    /// Run one tracking pass immediately and exit
    #[arg(long)]
    once: bool,
}

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

    let args = Args::parse();

    tracing::info!("Starting website tracking service");

    let config = Config::from_env().context("Failed to load configuration")?;

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    // Connect to broker and ensure the exchange exists
    let client = async_nats::connect(&config.nats_url)
        .await
        .context("Failed to connect to broker")?;
    let jetstream = async_nats::jetstream::new(client);
    ensure_topology(&jetstream).await?;

    let store = Arc::new(PostgresWebsiteStore::new(pool));
    let prober = Arc::new(EtagProber::new()?);
    let publisher = Arc::new(JetStreamPublisher::new(jetstream));

    if args.once {
        tracing::info!("Running website tracking once");
        run_tracking_job(store.as_ref(), prober.as_ref(), publisher.as_ref()).await?;
        return Ok(());
    }

    let _scheduler = start_scheduler(store, prober, publisher).await?;

    tracing::info!("Service is running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");

    Ok(())
}
