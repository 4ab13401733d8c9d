//! The daily tracking run: probe every due website, persist results, and
//! queue deep scrapes for the changed ones.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;

use crate::common::ProbeResult;
use crate::kernel::broker::{BrokerPublisher, SCRAPE_SUBJECT};
use crate::kernel::messages::{BrowserEngine, ScrapeJob};
use crate::kernel::traits::{BaseProber, BaseWebsiteStore};

/// Pages probed concurrently within one batch; batches run sequentially,
/// so this also bounds peak probe concurrency.
pub const BATCH_SIZE: usize = 10;

/// Run one full tracking pass.
///
/// Per-page probe errors are captured in their `ProbeResult` and never
/// abort the run; an `Err` from this function means the run as a whole
/// cannot be trusted and the caller should treat it as fatal.
pub async fn run_tracking_job(
    store: &dyn BaseWebsiteStore,
    prober: &dyn BaseProber,
    publisher: &dyn BrokerPublisher,
) -> Result<()> {
    tracing::info!("Starting website tracking run");

    let today = Utc::now().date_naive();
    let websites = store.find_all().await.context("Failed to load websites")?;
    let due: Vec<_> = websites.into_iter().filter(|w| w.is_due(today)).collect();

    if due.is_empty() {
        tracing::info!("No websites to track today");
        return Ok(());
    }

    tracing::info!("Found {} websites to track", due.len());

    // Owner ids for the scrape jobs published below
    let owners: HashMap<_, _> = due
        .iter()
        .map(|w| (w.id, w.user_id.clone()))
        .collect();

    // Probe in batches: concurrent within a batch, sequential batch-to-batch
    let mut results: Vec<ProbeResult> = Vec::with_capacity(due.len());
    for batch in due.chunks(BATCH_SIZE) {
        let probes = batch.iter().map(|website| prober.probe(website));
        results.extend(futures::future::join_all(probes).await);
    }

    // Persist every result - the attempt itself advances updated_at
    for result in &results {
        store
            .update_etag(result.website_id, result.new_etag.as_deref())
            .await
            .with_context(|| format!("Failed to persist probe result for {}", result.url))?;
    }

    let changed: Vec<_> = results.iter().filter(|r| r.has_changed).collect();
    let errored: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    for result in &changed {
        let Some(user_id) = owners.get(&result.website_id) else {
            continue;
        };
        let job = ScrapeJob {
            url: result.url.clone(),
            browser: BrowserEngine::Chromium,
            website_id: result.website_id,
            user_id: user_id.clone(),
        };
        publisher
            .publish(SCRAPE_SUBJECT.to_string(), job.to_bytes()?)
            .await
            .with_context(|| format!("Failed to queue scrape job for {}", result.url))?;
        tracing::info!("Sent website to scrape queue: {}", result.url);
    }

    tracing::info!(
        total = results.len(),
        changed = changed.len(),
        errored = errored.len(),
        "Tracking run completed"
    );

    for result in &errored {
        tracing::warn!(
            "Website errored during tracking: {}: {}",
            result.url,
            result.error.as_deref().unwrap_or("unknown")
        );
    }

    Ok(())
}
