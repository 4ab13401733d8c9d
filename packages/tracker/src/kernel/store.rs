//! Website store implementations: Postgres-backed for production, an
//! in-memory store for tests.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Mutex;

use crate::common::WebsiteId;
use crate::domains::website::{Website, WebsiteWithOwner};
use crate::kernel::traits::BaseWebsiteStore;

/// Postgres-backed store delegating to the model queries.
pub struct PostgresWebsiteStore {
    pool: PgPool,
}

impl PostgresWebsiteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseWebsiteStore for PostgresWebsiteStore {
    async fn find_all(&self) -> Result<Vec<Website>> {
        Website::find_all(&self.pool).await
    }

    async fn find_with_owner(&self, id: WebsiteId) -> Result<WebsiteWithOwner> {
        Website::find_with_owner(id, &self.pool).await
    }

    async fn update_etag(&self, id: WebsiteId, etag: Option<&str>) -> Result<()> {
        Website::update_etag(id, etag, &self.pool).await
    }

    async fn update_scrape_result(
        &self,
        id: WebsiteId,
        image_hash: &str,
        website_text: &str,
        s3_url: &str,
    ) -> Result<()> {
        Website::update_scrape_result(id, image_hash, website_text, s3_url, &self.pool).await
    }
}

/// In-memory store for tests.
///
/// Owner emails are keyed by `user_id`; updates mutate the held rows so
/// tests can assert on persisted state.
#[derive(Default)]
pub struct InMemoryWebsiteStore {
    websites: Mutex<Vec<Website>>,
    emails: Mutex<Vec<(String, String)>>,
}

impl InMemoryWebsiteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, website: Website) {
        self.websites
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(website);
    }

    pub fn insert_owner_email(&self, user_id: &str, email: &str) {
        self.emails
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((user_id.to_string(), email.to_string()));
    }

    /// Current state of a stored website.
    pub fn get(&self, id: WebsiteId) -> Option<Website> {
        self.websites
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|w| w.id == id)
            .cloned()
    }
}

#[async_trait]
impl BaseWebsiteStore for InMemoryWebsiteStore {
    async fn find_all(&self) -> Result<Vec<Website>> {
        Ok(self
            .websites
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn find_with_owner(&self, id: WebsiteId) -> Result<WebsiteWithOwner> {
        let websites = self.websites.lock().unwrap_or_else(|e| e.into_inner());
        let website = websites
            .iter()
            .find(|w| w.id == id)
            .ok_or_else(|| anyhow::anyhow!("Website not found: {}", id))?;
        let emails = self.emails.lock().unwrap_or_else(|e| e.into_inner());
        let user_email = emails
            .iter()
            .find(|(user_id, _)| *user_id == website.user_id)
            .map(|(_, email)| email.clone())
            .ok_or_else(|| anyhow::anyhow!("Owner email not found for {}", website.user_id))?;
        Ok(WebsiteWithOwner {
            id: website.id,
            url: website.url.clone(),
            image_hash: website.image_hash.clone(),
            user_email,
        })
    }

    async fn update_etag(&self, id: WebsiteId, etag: Option<&str>) -> Result<()> {
        let mut websites = self.websites.lock().unwrap_or_else(|e| e.into_inner());
        let website = websites
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| anyhow::anyhow!("Website not found: {}", id))?;
        website.etags = etag.map(|value| value.to_string());
        website.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn update_scrape_result(
        &self,
        id: WebsiteId,
        image_hash: &str,
        website_text: &str,
        s3_url: &str,
    ) -> Result<()> {
        let mut websites = self.websites.lock().unwrap_or_else(|e| e.into_inner());
        let website = websites
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| anyhow::anyhow!("Website not found: {}", id))?;
        website.image_hash = Some(image_hash.to_string());
        website.website_text = Some(website_text.to_string());
        website.s3_url = Some(s3_url.to_string());
        website.updated_at = chrono::Utc::now();
        Ok(())
    }
}
