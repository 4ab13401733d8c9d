// Common types used across the kernel and domain layers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Typed ID for tracked websites.
pub type WebsiteId = Uuid;

/// Result of one etag head-probe against a tracked website.
///
/// Transient: produced by a prober invocation, consumed by the tracking
/// run aggregator, then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub website_id: WebsiteId,
    pub url: String,
    pub old_etag: Option<String>,
    pub new_etag: Option<String>,
    pub has_changed: bool,
    pub error: Option<String>,
}

/// One scroll position captured during a deep scrape: the visible leaf-node
/// text fragments and the full-page screenshot taken at that position.
///
/// Lives only for the duration of one scrape session; the composite image
/// and perceptual hash are derived from the ordered sequence of these.
#[derive(Debug, Clone)]
pub struct ScrollSnapshot {
    pub texts: Vec<String>,
    /// `None` when the capture at this position failed; text collection
    /// still proceeds.
    pub screenshot: Option<Vec<u8>>,
}
