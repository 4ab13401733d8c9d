//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! The tracking run fires once per day at 02:00 UTC. A failed run is
//! fatal to the process: partial results cannot be trusted, so the
//! process exits non-zero and an external supervisor restarts it.

use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::kernel::broker::BrokerPublisher;
use crate::kernel::tracking::run_tracking_job;
use crate::kernel::traits::{BaseProber, BaseWebsiteStore};

/// Cron expression for the daily tracking run (seconds-resolution syntax).
const DAILY_TRACKING_SCHEDULE: &str = "0 0 2 * * *";

/// Start all scheduled tasks
pub async fn start_scheduler(
    store: Arc<dyn BaseWebsiteStore>,
    prober: Arc<dyn BaseProber>,
    publisher: Arc<dyn BrokerPublisher>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let tracking_job = Job::new_async(DAILY_TRACKING_SCHEDULE, move |_uuid, _lock| {
        let store = store.clone();
        let prober = prober.clone();
        let publisher = publisher.clone();
        Box::pin(async move {
            tracing::info!("Running scheduled website tracking");
            if let Err(e) =
                run_tracking_job(store.as_ref(), prober.as_ref(), publisher.as_ref()).await
            {
                tracing::error!("Tracking run failed: {:#}", e);
                std::process::exit(1);
            }
        })
    })?;

    scheduler.add(tracking_job).await?;
    scheduler.start().await?;

    tracing::info!("Website tracking scheduled to run daily at 02:00 UTC");
    Ok(scheduler)
}
