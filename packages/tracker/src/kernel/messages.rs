//! Message schemas for the scrape and notify queues.
//!
//! Payloads are validated on receipt; an invalid payload fails here,
//! before any side effect (browser launch, email send) occurs.

use anyhow::{Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::common::WebsiteId;

/// Browser engine requested for a deep scrape.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
}

/// A deep-scrape job, published by the probe scheduler for every page
/// whose change identifier moved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeJob {
    pub url: String,
    #[serde(default)]
    pub browser: BrowserEngine,
    pub website_id: WebsiteId,
    pub user_id: String,
}

impl ScrapeJob {
    /// Parse and validate a raw queue payload.
    pub fn from_bytes(payload: &[u8]) -> Result<Self> {
        let job: ScrapeJob =
            serde_json::from_slice(payload).context("Invalid scrape job payload")?;
        Url::parse(&job.url).context("Scrape job url is not a valid URL")?;
        Ok(job)
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let bytes = serde_json::to_vec(self).context("Failed to serialize scrape job")?;
        Ok(bytes.into())
    }
}

/// A notification job, published by the deep scrape engine when the
/// perceptual hash of a page moved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyJob {
    pub user_id: String,
    pub website_id: WebsiteId,
    pub url: String,
    pub has_changed: bool,
    pub user_email: String,
}

impl NotifyJob {
    /// Parse and validate a raw queue payload.
    pub fn from_bytes(payload: &[u8]) -> Result<Self> {
        let job: NotifyJob =
            serde_json::from_slice(payload).context("Invalid notify job payload")?;
        Url::parse(&job.url).context("Notify job url is not a valid URL")?;
        if !is_valid_email(&job.user_email) {
            anyhow::bail!("Notify job userEmail is not a valid email: {}", job.user_email);
        }
        Ok(job)
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let bytes = serde_json::to_vec(self).context("Failed to serialize notify job")?;
        Ok(bytes.into())
    }
}

/// Minimal email shape check: non-empty local part and a dotted domain.
fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn scrape_job_defaults_browser_to_chromium() {
        let id = Uuid::new_v4();
        let payload = format!(
            r#"{{"url":"https://example.com","websiteId":"{}","userId":"user-1"}}"#,
            id
        );
        let job = ScrapeJob::from_bytes(payload.as_bytes()).unwrap();
        assert_eq!(job.browser, BrowserEngine::Chromium);
        assert_eq!(job.website_id, id);
    }

    #[test]
    fn scrape_job_missing_url_is_rejected() {
        let payload = format!(
            r#"{{"websiteId":"{}","userId":"user-1"}}"#,
            Uuid::new_v4()
        );
        assert!(ScrapeJob::from_bytes(payload.as_bytes()).is_err());
    }

    #[test]
    fn scrape_job_invalid_url_is_rejected() {
        let payload = format!(
            r#"{{"url":"not a url","websiteId":"{}","userId":"user-1"}}"#,
            Uuid::new_v4()
        );
        assert!(ScrapeJob::from_bytes(payload.as_bytes()).is_err());
    }

    #[test]
    fn scrape_job_unknown_browser_is_rejected() {
        let payload = format!(
            r#"{{"url":"https://example.com","browser":"webkit","websiteId":"{}","userId":"user-1"}}"#,
            Uuid::new_v4()
        );
        assert!(ScrapeJob::from_bytes(payload.as_bytes()).is_err());
    }

    #[test]
    fn notify_job_round_trips() {
        let job = NotifyJob {
            user_id: "user-1".to_string(),
            website_id: Uuid::new_v4(),
            url: "https://example.com/page".to_string(),
            has_changed: true,
            user_email: "a@b.com".to_string(),
        };
        let parsed = NotifyJob::from_bytes(&job.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.user_email, job.user_email);
        assert!(parsed.has_changed);
    }

    #[test]
    fn notify_job_bad_email_is_rejected() {
        let payload = format!(
            r#"{{"userId":"u","websiteId":"{}","url":"https://x.com","hasChanged":true,"userEmail":"not-an-email"}}"#,
            Uuid::new_v4()
        );
        assert!(NotifyJob::from_bytes(payload.as_bytes()).is_err());
    }
}
