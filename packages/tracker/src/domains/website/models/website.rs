use anyhow::Result;
use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::WebsiteId;

/// Website - a page tracked for content changes
///
/// The core mutates only `etags`/`updated_at` (probe scheduler) and
/// `image_hash`/`website_text`/`s3_url`/`updated_at` (deep scrape engine).
/// Creation and deletion belong to the outer application.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Website {
    pub id: WebsiteId,
    pub user_id: String,
    pub url: String,
    /// Latest combined screenshot location in object storage
    pub s3_url: Option<String>,
    /// Deduplicated text content from the latest successful scrape
    pub website_text: Option<String>,
    /// Perceptual hash of the latest combined screenshot
    pub image_hash: Option<String>,
    /// Server-supplied change identifier from the latest probe
    pub etags: Option<String>,
    /// Tracking frequency as stored text ('daily' | 'weekly' | 'monthly' | 'quarterly')
    pub frequency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A website row joined with its owner's email, for notify dispatch
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WebsiteWithOwner {
    pub id: WebsiteId,
    pub url: String,
    pub image_hash: Option<String>,
    pub user_email: String,
}

/// How often a website is probed for changes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackingFrequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl TrackingFrequency {
    /// Whether a website last updated on `updated` is due for a probe on `today`.
    ///
    /// Daily means "not updated today" (strictly before today's date); the
    /// longer frequencies compare against fixed calendar windows.
    pub fn is_due(&self, updated: NaiveDate, today: NaiveDate) -> bool {
        match self {
            TrackingFrequency::Daily => updated < today,
            TrackingFrequency::Weekly => updated <= today - Duration::days(7),
            TrackingFrequency::Monthly => match today.checked_sub_months(Months::new(1)) {
                Some(cutoff) => updated <= cutoff,
                None => false,
            },
            TrackingFrequency::Quarterly => match today.checked_sub_months(Months::new(3)) {
                Some(cutoff) => updated <= cutoff,
                None => false,
            },
        }
    }
}

impl std::fmt::Display for TrackingFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingFrequency::Daily => write!(f, "daily"),
            TrackingFrequency::Weekly => write!(f, "weekly"),
            TrackingFrequency::Monthly => write!(f, "monthly"),
            TrackingFrequency::Quarterly => write!(f, "quarterly"),
        }
    }
}

impl std::str::FromStr for TrackingFrequency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "daily" => Ok(TrackingFrequency::Daily),
            "weekly" => Ok(TrackingFrequency::Weekly),
            "monthly" => Ok(TrackingFrequency::Monthly),
            "quarterly" => Ok(TrackingFrequency::Quarterly),
            _ => Err(anyhow::anyhow!("Invalid tracking frequency: {}", s)),
        }
    }
}

impl Website {
    /// Whether this website is due for a probe on `today`.
    ///
    /// Unknown frequency values are never selected.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        match self.frequency.parse::<TrackingFrequency>() {
            Ok(frequency) => frequency.is_due(self.updated_at.date_naive(), today),
            Err(_) => false,
        }
    }
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl Website {
    /// Find all tracked websites
    pub async fn find_all(pool: &PgPool) -> Result<Vec<Self>> {
        let websites =
            sqlx::query_as::<_, Website>("SELECT * FROM website ORDER BY created_at")
                .fetch_all(pool)
                .await?;
        Ok(websites)
    }

    /// Find a website by ID together with its owner's email
    pub async fn find_with_owner(id: WebsiteId, pool: &PgPool) -> Result<WebsiteWithOwner> {
        let row = sqlx::query_as::<_, WebsiteWithOwner>(
            r#"
            SELECT w.id, w.url, w.image_hash, u.email AS user_email
            FROM website w
            INNER JOIN users u ON u.id = w.user_id
            WHERE w.id = $1
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    /// Persist a probe result: new etag plus the attempt timestamp.
    ///
    /// Called for every probed website, successful or not - the attempt
    /// itself advances `updated_at`.
    pub async fn update_etag(
        id: WebsiteId,
        etag: Option<&str>,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query("UPDATE website SET etags = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(etag)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Persist the outcome of a completed deep scrape
    pub async fn update_scrape_result(
        id: WebsiteId,
        image_hash: &str,
        website_text: &str,
        s3_url: &str,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE website
            SET image_hash = $2, website_text = $3, s3_url = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(image_hash)
        .bind(website_text)
        .bind(s3_url)
        .execute(pool)
        .await?;
        Ok(())
    }
}
