//! Screenshot persistence in object storage.
//!
//! Keys are deterministic per (owner, url, slot, scroll position) so the
//! latest capture of a page always lands in the same place:
//! `job_track.website/{userId}/{url with '/'→'_'}/{latest|previous}/{n|combined}.png`

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use std::sync::Mutex;

use crate::kernel::traits::BaseObjectStore;

/// Key namespace for all screenshot objects.
pub const STORAGE_NAMESPACE: &str = "job_track.website";

/// Which capture generation a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotSlot {
    Latest,
    Previous,
}

impl std::fmt::Display for ScreenshotSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScreenshotSlot::Latest => write!(f, "latest"),
            ScreenshotSlot::Previous => write!(f, "previous"),
        }
    }
}

/// Build the object key for a screenshot.
///
/// `scroll_index` addresses one scroll position's capture; `None` addresses
/// the combined composite image.
pub fn screenshot_key(
    user_id: &str,
    url: &str,
    slot: ScreenshotSlot,
    scroll_index: Option<u32>,
) -> String {
    let url_part = url.replace('/', "_");
    let base = format!("{}/{}/{}/{}", STORAGE_NAMESPACE, user_id, url_part, slot);
    match scroll_index {
        Some(index) => format!("{}/{}.png", base, index),
        None => format!("{}/combined.png", base),
    }
}

/// S3-backed object store.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from the ambient AWS environment.
    ///
    /// `AWS_ENDPOINT_URL` switches to an S3-compatible endpoint (e.g. MinIO)
    /// with path-style addressing.
    pub async fn from_env(bucket: String) -> Self {
        let region_provider = RegionProviderChain::default_provider().or_else("us-east-1");
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;
        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);
        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());
        Self { client, bucket }
    }
}

#[async_trait]
impl BaseObjectStore for S3ObjectStore {
    async fn put_png(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type("image/png")
            .send()
            .await
            .with_context(|| format!("Failed to upload {} to object storage", key))?;
        Ok(())
    }
}

/// Recording object store for tests.
#[derive(Default)]
pub struct TestObjectStore {
    objects: Mutex<Vec<(String, Vec<u8>)>>,
}

impl TestObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys stored so far, in put order.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Bytes stored under a key, if any.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, bytes)| bytes.clone())
    }
}

#[async_trait]
impl BaseObjectStore for TestObjectStore {
    async fn put_png(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((key.to_string(), bytes));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slashes_in_url_are_replaced() {
        let key = screenshot_key(
            "user-1",
            "https://example.com/some/page",
            ScreenshotSlot::Latest,
            Some(3),
        );
        assert_eq!(
            key,
            "job_track.website/user-1/https:__example.com_some_page/latest/3.png"
        );
    }

    #[test]
    fn combined_key_has_no_scroll_index() {
        let key = screenshot_key("user-1", "https://x.com", ScreenshotSlot::Latest, None);
        assert_eq!(key, "job_track.website/user-1/https:__x.com/latest/combined.png");
    }

    #[test]
    fn previous_slot_is_addressable() {
        let key = screenshot_key("user-1", "https://x.com", ScreenshotSlot::Previous, None);
        assert!(key.contains("/previous/"));
    }
}
