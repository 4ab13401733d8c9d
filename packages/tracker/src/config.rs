use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Configuration every binary needs: database and broker endpoints.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub nats_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            nats_url: env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
        })
    }
}

/// Settings only the consumer process needs: object storage for
/// screenshots and the email sender. The scheduler binary touches
/// neither, so these must not gate its startup.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub s3_bucket: String,
    pub ses_from_email: String,
}

impl ConsumerConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            s3_bucket: env::var("AWS_S3_BUCKET")
                .context("AWS_S3_BUCKET must be set")?,
            ses_from_email: env::var("AWS_SES_FROM_EMAIL")
                .context("AWS_SES_FROM_EMAIL must be set")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test owns all the env mutation: unit tests share process env,
    // so splitting these assertions would race
    #[test]
    fn scheduler_config_loads_without_mailer_or_storage_vars() {
        env::set_var("DATABASE_URL", "postgres://localhost/tracker_test");
        env::remove_var("NATS_URL");
        env::remove_var("AWS_S3_BUCKET");
        env::remove_var("AWS_SES_FROM_EMAIL");

        let config = Config::from_env().unwrap();
        assert_eq!(config.database_url, "postgres://localhost/tracker_test");
        assert_eq!(config.nats_url, "nats://localhost:4222");

        assert!(ConsumerConfig::from_env().is_err());
    }
}
