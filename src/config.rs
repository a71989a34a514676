use std::time::Duration;

use anyhow::{Result, bail};

/// Runtime settings shared by the engine, the dispatcher and the scheduler.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file path
    pub database: String,
    pub max_connections: u32,
    /// Where notifications are POSTed; when unset they are only logged
    pub webhook_url: Option<String>,
    pub notify_timeout: Duration,
    pub max_delivery_attempts: u32,
    /// How long a settlement claim stays exclusive before another run may take it over
    pub claim_ttl: Duration,
    /// Pending transactions claimed per round trip
    pub settlement_batch_size: u32,
    /// Cron expression (with seconds) for the nightly run
    pub schedule: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "borrowline.db".to_string(),
            max_connections: 5,
            webhook_url: None,
            notify_timeout: Duration::from_secs(10),
            max_delivery_attempts: 5,
            claim_ttl: Duration::from_secs(15 * 60),
            settlement_batch_size: 500,
            schedule: "0 0 0 * * *".to_string(),
        }
    }
}

impl Config {
    pub fn with_database(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// SQLite URL for the database file. `create` allows the file to be created.
    pub fn database_url(&self, create: bool) -> String {
        if create {
            format!("sqlite:{}?mode=rwc", self.database)
        } else {
            format!("sqlite:{}", self.database)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            bail!("database path must not be empty");
        }
        if self.max_connections == 0 {
            bail!("max_connections must be at least 1");
        }
        if self.max_delivery_attempts == 0 {
            bail!("max_delivery_attempts must be at least 1");
        }
        if self.claim_ttl < Duration::from_secs(1) {
            bail!("claim_ttl must be at least one second");
        }
        if self.settlement_batch_size == 0 {
            bail!("settlement_batch_size must be at least 1");
        }
        if let Some(url) = &self.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("webhook_url must be an http(s) URL, got '{}'", url);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url() {
        let config = Config::with_database("/tmp/ledger.db");
        assert_eq!(config.database_url(true), "sqlite:/tmp/ledger.db?mode=rwc");
        assert_eq!(config.database_url(false), "sqlite:/tmp/ledger.db");
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_settings() {
        let mut config = Config::default();
        config.webhook_url = Some("ftp://example.org".into());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.claim_ttl = Duration::from_millis(10);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.settlement_batch_size = 0;
        assert!(config.validate().is_err());
    }
}
