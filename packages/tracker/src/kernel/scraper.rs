//! Deep scrape engine: browser-driven infinite-scroll collection,
//! screenshot compositing, perceptual-hash comparison, and notify dispatch.
//!
//! The browser is reached through the `PageDriver` trait so the scroll
//! loop and the compare/persist/publish pipeline can be exercised with a
//! scripted driver in tests; `CdpPageDriver` is the chromiumoxide-backed
//! production implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::ScrollSnapshot;
use crate::kernel::broker::{BrokerPublisher, NOTIFY_SUBJECT};
use crate::kernel::image_hash::{combine_screenshots, perceptual_hash};
use crate::kernel::messages::{NotifyJob, ScrapeJob};
use crate::kernel::storage::{screenshot_key, ScreenshotSlot};
use crate::kernel::traits::{BaseObjectStore, BaseWebsiteStore};

/// Navigation must reach DOM readiness within this bound.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the hydration wait.
const HYDRATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after each scroll before re-measuring page height.
const SCROLL_PAUSE: Duration = Duration::from_secs(1);

/// Pause in the middle of a lazy-load nudge.
const NUDGE_PAUSE: Duration = Duration::from_millis(500);

/// Consecutive unchanged height measurements before the loop gives up.
const MAX_STALLED_MEASUREMENTS: u32 = 3;

/// Rendered text length that counts as "hydrated" even without an XHR.
const MIN_HYDRATED_TEXT_LENGTH: u64 = 500;

/// DOM node count below which the page is not considered rendered.
const MIN_HYDRATED_NODE_COUNT: u64 = 100;

// =============================================================================
// Scroll-collection state machine
// =============================================================================

/// State of the infinite-scroll collection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollState {
    /// No height observed yet.
    Measuring,
    /// Last measurement grew the page; content was collected.
    Collecting,
    /// N consecutive measurements saw no growth.
    Stalled(u32),
    /// Three consecutive stalls; the loop is over.
    Done,
}

/// What the loop should do after a height measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStep {
    /// Height grew: collect text + screenshot at this scroll index.
    Collect { scroll_index: u32 },
    /// Height unchanged: try to provoke lazy-loaded content.
    Nudge,
    /// Three consecutive unchanged measurements: exit the loop.
    Done,
}

/// Tracks page-height measurements and drives the collection loop.
#[derive(Debug)]
pub struct ScrollTracker {
    state: ScrollState,
    prev_height: u64,
    scroll_index: u32,
}

impl ScrollTracker {
    pub fn new() -> Self {
        Self {
            state: ScrollState::Measuring,
            prev_height: 0,
            scroll_index: 0,
        }
    }

    pub fn state(&self) -> ScrollState {
        self.state
    }

    /// Number of scroll positions collected so far.
    pub fn scroll_index(&self) -> u32 {
        self.scroll_index
    }

    /// Feed one height measurement and get the next step.
    pub fn observe(&mut self, height: u64) -> ScrollStep {
        if height == self.prev_height {
            let stalls = match self.state {
                ScrollState::Stalled(n) => n + 1,
                _ => 1,
            };
            if stalls >= MAX_STALLED_MEASUREMENTS {
                self.state = ScrollState::Done;
                ScrollStep::Done
            } else {
                self.state = ScrollState::Stalled(stalls);
                ScrollStep::Nudge
            }
        } else {
            self.state = ScrollState::Collecting;
            self.prev_height = height;
            self.scroll_index += 1;
            ScrollStep::Collect {
                scroll_index: self.scroll_index,
            }
        }
    }
}

impl Default for ScrollTracker {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Page driver seam
// =============================================================================

/// Browser operations the scrape pipeline needs from one open page.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate and wait for initial DOM readiness (bounded).
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Wait until the page is plausibly hydrated: an XHR/fetch response was
    /// observed or the rendered text is long enough, and the DOM has grown
    /// past a minimum node count.
    async fn wait_hydrated(&mut self) -> Result<()>;

    /// Current page height (max of the usual scroll/offset heights).
    async fn page_height(&mut self) -> Result<u64>;

    /// Scroll to the bottom of the page.
    async fn scroll_to_bottom(&mut self) -> Result<()>;

    /// Try to provoke lazy-loaded content after a stalled measurement.
    async fn nudge_lazy_content(&mut self) -> Result<()>;

    /// Visible text of all leaf nodes under `body`, trimmed, empties dropped.
    async fn collect_leaf_texts(&mut self) -> Result<Vec<String>>;

    /// Full-page PNG screenshot.
    async fn screenshot_full_page(&mut self) -> Result<Vec<u8>>;
}

// =============================================================================
// Collection loop
// =============================================================================

/// Drive the infinite-scroll loop, collecting one `ScrollSnapshot` per
/// height growth and uploading each screenshot as it is captured.
///
/// Screenshot/upload failures are logged and collection continues; a text
/// extraction failure aborts the scrape.
pub async fn collect_page_content(
    driver: &mut dyn PageDriver,
    user_id: &str,
    url: &str,
    storage: &dyn BaseObjectStore,
) -> Result<Vec<ScrollSnapshot>> {
    driver.wait_hydrated().await?;

    let mut tracker = ScrollTracker::new();
    let mut snapshots: Vec<ScrollSnapshot> = Vec::new();
    let mut first_loop = true;

    loop {
        if !first_loop {
            driver.scroll_to_bottom().await?;
            tokio::time::sleep(SCROLL_PAUSE).await;
        }
        first_loop = false;

        let height = driver.page_height().await?;
        match tracker.observe(height) {
            ScrollStep::Done => {
                tracing::debug!("No height change after repeated attempts, ending scroll loop");
                break;
            }
            ScrollStep::Nudge => {
                tracing::debug!(height, "Height unchanged, nudging lazy content");
                driver.nudge_lazy_content().await?;
            }
            ScrollStep::Collect { scroll_index } => {
                tracing::debug!(height, scroll_index, "Height grew, collecting content");
                let texts = driver.collect_leaf_texts().await?;
                let screenshot = match driver.screenshot_full_page().await {
                    Ok(bytes) => {
                        let key =
                            screenshot_key(user_id, url, ScreenshotSlot::Latest, Some(scroll_index));
                        if let Err(e) = storage.put_png(&key, bytes.clone()).await {
                            tracing::error!("Failed to upload screenshot {}: {:#}", key, e);
                        }
                        Some(bytes)
                    }
                    Err(e) => {
                        tracing::error!("Error taking screenshot of {}: {:#}", url, e);
                        None
                    }
                };
                snapshots.push(ScrollSnapshot { texts, screenshot });
            }
        }
    }

    Ok(snapshots)
}

/// Deduplicate collected text sections by exact sequence equality,
/// preserving first-seen order.
pub fn dedup_text_sections(snapshots: &[ScrollSnapshot]) -> Vec<Vec<String>> {
    let mut seen: HashSet<&[String]> = HashSet::new();
    let mut deduped = Vec::new();
    for snapshot in snapshots {
        if seen.insert(snapshot.texts.as_slice()) {
            deduped.push(snapshot.texts.clone());
        }
    }
    deduped
}

// =============================================================================
// Full scrape pipeline
// =============================================================================

/// Run a scrape job against an already-navigated page driver: collect,
/// composite, hash, compare, persist, and publish the notify job when the
/// hash moved. Returns the deduplicated text sections.
///
/// A failure anywhere leaves persisted state untouched.
pub async fn run_scrape_pipeline(
    job: &ScrapeJob,
    driver: &mut dyn PageDriver,
    store: &dyn BaseWebsiteStore,
    storage: &dyn BaseObjectStore,
    publisher: &dyn BrokerPublisher,
) -> Result<Vec<Vec<String>>> {
    driver.navigate(&job.url).await?;

    let snapshots = collect_page_content(driver, &job.user_id, &job.url, storage).await?;

    let screenshots: Vec<Vec<u8>> = snapshots
        .iter()
        .filter_map(|s| s.screenshot.clone())
        .collect();
    if screenshots.is_empty() {
        anyhow::bail!("No screenshots captured for {}", job.url);
    }

    tracing::info!("Combining {} screenshots", screenshots.len());
    let combined = combine_screenshots(&screenshots)?;
    let combined_key = screenshot_key(&job.user_id, &job.url, ScreenshotSlot::Latest, None);
    storage
        .put_png(&combined_key, combined.clone())
        .await
        .context("Failed to upload combined image")?;

    let image_hash = perceptual_hash(&combined)?;
    tracing::info!("Generated image hash: {}", image_hash);

    let current = store
        .find_with_owner(job.website_id)
        .await
        .context("Failed to load website for hash comparison")?;

    let deduped = dedup_text_sections(&snapshots);

    if current.image_hash.as_deref() != Some(image_hash.as_str()) {
        tracing::info!("Image hash changed for website {}", job.url);

        let website_text = serde_json::to_string(&deduped)
            .context("Failed to serialize website text")?;
        store
            .update_scrape_result(job.website_id, &image_hash, &website_text, &combined_key)
            .await
            .context("Failed to persist scrape result")?;

        let notify = NotifyJob {
            user_id: job.user_id.clone(),
            website_id: job.website_id,
            url: job.url.clone(),
            has_changed: true,
            user_email: current.user_email,
        };
        publisher
            .publish(NOTIFY_SUBJECT.to_string(), notify.to_bytes()?)
            .await
            .context("Failed to queue notify job")?;
        tracing::info!("Sent website {} to mail queue", job.url);
    } else {
        tracing::info!("No image changes detected for website {}", job.url);
    }

    Ok(deduped)
}

/// Validate and execute one scrape queue message end to end.
///
/// Validation happens before any browser launch; the browser is closed
/// unconditionally once launched.
pub async fn handle_scrape_message(
    payload: &[u8],
    store: &dyn BaseWebsiteStore,
    storage: &dyn BaseObjectStore,
    publisher: &dyn BrokerPublisher,
) -> Result<Vec<Vec<String>>> {
    let job = ScrapeJob::from_bytes(payload)?;
    tracing::info!("Processing scrape job for {} ({:?})", job.url, job.browser);

    let (mut browser, handler_task) = launch_browser().await?;

    let result = async {
        let mut driver = CdpPageDriver::new(&browser).await?;
        run_scrape_pipeline(&job, &mut driver, store, storage, publisher).await
    }
    .await;

    if let Err(e) = browser.close().await {
        tracing::warn!("Failed to close browser: {:#}", e);
    }
    let _ = browser.wait().await;
    handler_task.abort();

    result
}

// =============================================================================
// chromiumoxide-backed driver
// =============================================================================

/// Launch a headless browser and spawn its CDP event handler loop.
///
/// The scrape message's `browser` field is recorded on the job, but every
/// engine is served through CDP - chromiumoxide drives Chromium-family
/// browsers.
pub async fn launch_browser() -> Result<(Browser, tokio::task::JoinHandle<()>)> {
    let config = BrowserConfig::builder()
        .window_size(1280, 800)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .context("Failed to launch browser")?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });

    Ok((browser, handler_task))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageStats {
    text_length: u64,
    node_count: u64,
}

/// Production page driver speaking CDP through chromiumoxide.
pub struct CdpPageDriver {
    page: chromiumoxide::Page,
    xhr_seen: Arc<AtomicBool>,
    listener_task: tokio::task::JoinHandle<()>,
}

impl CdpPageDriver {
    pub async fn new(browser: &Browser) -> Result<Self> {
        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open page")?;

        if let Err(e) = page.execute(EnableParams::default()).await {
            tracing::warn!("Failed to enable network events: {:#}", e);
        }

        // Track XHR/fetch responses for the hydration gate
        let xhr_seen = Arc::new(AtomicBool::new(false));
        let seen = xhr_seen.clone();
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .context("Failed to subscribe to response events")?;
        let listener_task = tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                if matches!(event.r#type, ResourceType::Xhr | ResourceType::Fetch) {
                    seen.store(true, Ordering::Relaxed);
                }
            }
        });

        Ok(Self {
            page,
            xhr_seen,
            listener_task,
        })
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, expr: &str) -> Result<T> {
        let value = self
            .page
            .evaluate(expr)
            .await
            .context("Script evaluation failed")?
            .into_value()
            .context("Unexpected script result")?;
        Ok(value)
    }

    async fn run_script(&self, expr: &str) -> Result<()> {
        self.page
            .evaluate(expr)
            .await
            .context("Script evaluation failed")?;
        Ok(())
    }
}

impl Drop for CdpPageDriver {
    fn drop(&mut self) {
        self.listener_task.abort();
    }
}

#[async_trait]
impl PageDriver for CdpPageDriver {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        tokio::time::timeout(NAVIGATION_TIMEOUT, self.page.goto(url))
            .await
            .map_err(|_| anyhow::anyhow!("Navigation timed out for {}", url))?
            .with_context(|| format!("Navigation failed for {}", url))?;

        // Some pages pin the body height; force scrollability so the
        // height measurements below mean something
        self.run_script(
            "(() => { \
               document.body.style.height = 'auto'; \
               document.body.style.overflow = 'auto'; \
               document.documentElement.style.height = 'auto'; \
               document.documentElement.style.overflow = 'auto'; \
             })()",
        )
        .await?;
        Ok(())
    }

    async fn wait_hydrated(&mut self) -> Result<()> {
        let deadline = Instant::now() + HYDRATION_TIMEOUT;
        loop {
            let stats: PageStats = self
                .evaluate(
                    "({ textLength: (document.body.innerText || '').length, \
                        nodeCount: document.querySelectorAll('body *').length })",
                )
                .await?;

            let content_signal = self.xhr_seen.load(Ordering::Relaxed)
                || stats.text_length > MIN_HYDRATED_TEXT_LENGTH;
            if content_signal && stats.node_count > MIN_HYDRATED_NODE_COUNT {
                return Ok(());
            }
            if Instant::now() >= deadline {
                anyhow::bail!(
                    "Page never hydrated (text {} chars, {} nodes)",
                    stats.text_length,
                    stats.node_count
                );
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn page_height(&mut self) -> Result<u64> {
        self.evaluate(
            "Math.max(document.body.scrollHeight, document.documentElement.scrollHeight, \
                      document.body.offsetHeight, document.documentElement.offsetHeight)",
        )
        .await
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.run_script("window.scrollTo(0, document.body.scrollHeight)")
            .await
    }

    async fn nudge_lazy_content(&mut self) -> Result<()> {
        self.run_script(
            "window.scrollTo(0, document.body.scrollHeight - 100); \
             window.scrollTo(0, document.body.scrollHeight); \
             window.scrollTo(0, window.scrollY + 500)",
        )
        .await?;
        tokio::time::sleep(NUDGE_PAUSE).await;
        self.run_script("window.scrollTo(0, document.body.scrollHeight)")
            .await
    }

    async fn collect_leaf_texts(&mut self) -> Result<Vec<String>> {
        self.evaluate(
            "Array.from(document.querySelectorAll('body *')) \
               .filter(el => el.children.length === 0) \
               .map(el => (el.textContent || '').trim()) \
               .filter(t => t.length > 0)",
        )
        .await
    }

    async fn screenshot_full_page(&mut self) -> Result<Vec<u8>> {
        let bytes = self
            .page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .context("Screenshot capture failed")?;
        Ok(bytes)
    }
}

// =============================================================================
// Scripted driver for tests
// =============================================================================

/// Test driver that replays a scripted sequence of height measurements.
///
/// Texts are served per collect call (last entry repeats); screenshots are
/// the provided PNG bytes.
pub struct ScriptedPageDriver {
    heights: Vec<u64>,
    height_calls: usize,
    texts: Vec<Vec<String>>,
    text_calls: usize,
    screenshot_png: Vec<u8>,
    pub nudge_count: u32,
    pub scroll_count: u32,
    pub navigated: Vec<String>,
}

impl ScriptedPageDriver {
    pub fn new(heights: Vec<u64>, texts: Vec<Vec<String>>, screenshot_png: Vec<u8>) -> Self {
        Self {
            heights,
            height_calls: 0,
            texts,
            text_calls: 0,
            screenshot_png,
            nudge_count: 0,
            scroll_count: 0,
            navigated: Vec::new(),
        }
    }
}

#[async_trait]
impl PageDriver for ScriptedPageDriver {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.navigated.push(url.to_string());
        Ok(())
    }

    async fn wait_hydrated(&mut self) -> Result<()> {
        Ok(())
    }

    async fn page_height(&mut self) -> Result<u64> {
        let height = self
            .heights
            .get(self.height_calls)
            .or_else(|| self.heights.last())
            .copied()
            .unwrap_or(0);
        self.height_calls += 1;
        Ok(height)
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.scroll_count += 1;
        Ok(())
    }

    async fn nudge_lazy_content(&mut self) -> Result<()> {
        self.nudge_count += 1;
        Ok(())
    }

    async fn collect_leaf_texts(&mut self) -> Result<Vec<String>> {
        let texts = self
            .texts
            .get(self.text_calls)
            .or_else(|| self.texts.last())
            .cloned()
            .unwrap_or_default();
        self.text_calls += 1;
        Ok(texts)
    }

    async fn screenshot_full_page(&mut self) -> Result<Vec<u8>> {
        Ok(self.screenshot_png.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_ends_after_three_consecutive_stalls() {
        let mut tracker = ScrollTracker::new();
        assert_eq!(
            tracker.observe(1000),
            ScrollStep::Collect { scroll_index: 1 }
        );
        assert_eq!(tracker.observe(1000), ScrollStep::Nudge);
        assert_eq!(tracker.state(), ScrollState::Stalled(1));
        assert_eq!(tracker.observe(1000), ScrollStep::Nudge);
        assert_eq!(tracker.state(), ScrollState::Stalled(2));
        assert_eq!(tracker.observe(1000), ScrollStep::Done);
        assert_eq!(tracker.state(), ScrollState::Done);
        assert_eq!(tracker.scroll_index(), 1);
    }

    #[test]
    fn growth_resets_the_stall_counter() {
        let mut tracker = ScrollTracker::new();
        tracker.observe(1000);
        tracker.observe(1000);
        tracker.observe(1000);
        assert_eq!(tracker.state(), ScrollState::Stalled(2));
        assert_eq!(
            tracker.observe(2000),
            ScrollStep::Collect { scroll_index: 2 }
        );
        assert_eq!(tracker.state(), ScrollState::Collecting);
        // The stall count starts over from here
        assert_eq!(tracker.observe(2000), ScrollStep::Nudge);
        assert_eq!(tracker.state(), ScrollState::Stalled(1));
    }

    #[test]
    fn termination_is_bounded_for_growing_then_stable_pages() {
        let mut tracker = ScrollTracker::new();
        let heights = [500, 1000, 1500, 2000, 2000, 2000, 2000];
        let mut steps = 0;
        for height in heights {
            steps += 1;
            if tracker.observe(height) == ScrollStep::Done {
                break;
            }
        }
        assert_eq!(steps, heights.len());
        assert_eq!(tracker.state(), ScrollState::Done);
        assert_eq!(tracker.scroll_index(), 4);
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let snap = |texts: &[&str]| ScrollSnapshot {
            texts: texts.iter().map(|t| t.to_string()).collect(),
            screenshot: None,
        };
        let snapshots = vec![
            snap(&["a", "b"]),
            snap(&["a", "b"]),
            snap(&["a", "b", "c"]),
            snap(&["a", "b"]),
        ];
        let deduped = dedup_text_sections(&snapshots);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0], vec!["a", "b"]);
        assert_eq!(deduped[1], vec!["a", "b", "c"]);
    }
}
