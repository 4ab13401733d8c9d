// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Business logic (the tracking run, the scrape pipeline) lives in kernel
// functions that use these traits.
//
// Naming convention: Base* for trait names (e.g., BaseMailer, BaseProber)

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{ProbeResult, WebsiteId};
use crate::domains::website::{Website, WebsiteWithOwner};

// =============================================================================
// Website store (relational persistence consumed by the core)
// =============================================================================

#[async_trait]
pub trait BaseWebsiteStore: Send + Sync {
    /// All tracked websites (the tracking run filters for due ones)
    async fn find_all(&self) -> Result<Vec<Website>>;

    /// One website with its owner's email (for notify dispatch)
    async fn find_with_owner(&self, id: WebsiteId) -> Result<WebsiteWithOwner>;

    /// Persist a probe result: new etag plus the attempt timestamp
    async fn update_etag(&self, id: WebsiteId, etag: Option<&str>) -> Result<()>;

    /// Persist the outcome of a completed deep scrape
    async fn update_scrape_result(
        &self,
        id: WebsiteId,
        image_hash: &str,
        website_text: &str,
        s3_url: &str,
    ) -> Result<()>;
}

// =============================================================================
// Object storage (screenshot persistence)
// =============================================================================

#[async_trait]
pub trait BaseObjectStore: Send + Sync {
    /// Store a PNG under the given key
    async fn put_png(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
}

// =============================================================================
// Transactional email
// =============================================================================

#[async_trait]
pub trait BaseMailer: Send + Sync {
    /// Send the "website updated" notification email
    async fn send_update_email(&self, to: &str, url: &str) -> Result<()>;
}

// =============================================================================
// Etag probing
// =============================================================================

#[async_trait]
pub trait BaseProber: Send + Sync {
    /// Probe one website for a change identifier.
    ///
    /// Never fails past its own boundary - transport errors are captured
    /// in the returned `ProbeResult`.
    async fn probe(&self, website: &Website) -> ProbeResult;
}
