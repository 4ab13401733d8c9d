//! Etag head-probe: a cheap existence/change check against one tracked page.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::common::{ProbeResult, WebsiteId};
use crate::domains::website::Website;
use crate::kernel::traits::BaseProber;

/// Request timeout for a single head probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Descriptive client identifier sent with every probe.
const PROBE_USER_AGENT: &str = "Mozilla/5.0 (compatible; WebsiteTracker/1.0)";

/// Whether the server-supplied change identifier moved.
///
/// Absent-vs-present counts as a change in either direction.
pub fn etag_changed(old: Option<&str>, new: Option<&str>) -> bool {
    old != new
}

/// Head-probe prober using a shared HTTP client.
pub struct EtagProber {
    client: reqwest::Client,
}

impl EtagProber {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .user_agent(PROBE_USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    async fn fetch_etag(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .context("Head request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, url);
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        Ok(etag)
    }
}

#[async_trait]
impl BaseProber for EtagProber {
    async fn probe(&self, website: &Website) -> ProbeResult {
        match self.fetch_etag(&website.url).await {
            Ok(new_etag) => ProbeResult {
                website_id: website.id,
                url: website.url.clone(),
                old_etag: website.etags.clone(),
                has_changed: etag_changed(website.etags.as_deref(), new_etag.as_deref()),
                new_etag,
                error: None,
            },
            Err(e) => {
                tracing::warn!("Error checking website etags of {}: {:#}", website.url, e);
                ProbeResult {
                    website_id: website.id,
                    url: website.url.clone(),
                    old_etag: website.etags.clone(),
                    new_etag: None,
                    has_changed: false,
                    error: Some(format!("{:#}", e)),
                }
            }
        }
    }
}

/// Scripted prober for tests: maps website ids to a new etag or an error.
#[derive(Default)]
pub struct ScriptedProber {
    responses: HashMap<WebsiteId, Result<Option<String>, String>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful probe returning the given etag.
    pub fn with_etag(mut self, id: WebsiteId, etag: Option<&str>) -> Self {
        self.responses
            .insert(id, Ok(etag.map(|value| value.to_string())));
        self
    }

    /// Script a failing probe.
    pub fn with_error(mut self, id: WebsiteId, error: &str) -> Self {
        self.responses.insert(id, Err(error.to_string()));
        self
    }
}

#[async_trait]
impl BaseProber for ScriptedProber {
    async fn probe(&self, website: &Website) -> ProbeResult {
        match self.responses.get(&website.id) {
            Some(Ok(new_etag)) => ProbeResult {
                website_id: website.id,
                url: website.url.clone(),
                old_etag: website.etags.clone(),
                has_changed: etag_changed(website.etags.as_deref(), new_etag.as_deref()),
                new_etag: new_etag.clone(),
                error: None,
            },
            Some(Err(error)) => ProbeResult {
                website_id: website.id,
                url: website.url.clone(),
                old_etag: website.etags.clone(),
                new_etag: None,
                has_changed: false,
                error: Some(error.clone()),
            },
            None => ProbeResult {
                website_id: website.id,
                url: website.url.clone(),
                old_etag: website.etags.clone(),
                new_etag: None,
                has_changed: false,
                error: Some("no scripted response".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_etag_is_unchanged() {
        assert!(!etag_changed(Some("abc"), Some("abc")));
        assert!(!etag_changed(None, None));
    }

    #[test]
    fn different_etag_is_changed() {
        assert!(etag_changed(Some("abc"), Some("xyz")));
    }

    #[test]
    fn absent_vs_present_is_changed() {
        assert!(etag_changed(None, Some("abc")));
        assert!(etag_changed(Some("abc"), None));
    }
}
