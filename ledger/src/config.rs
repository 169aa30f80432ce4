//! Runtime configuration read from the environment.

use anyhow::{Context, Result};
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:ledger.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How long a connection waits on a locked database before failing
    pub busy_timeout: Duration,
    /// `EnvFilter` directive for the binary's log output
    pub log_filter: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl LedgerConfig {
    /// Read `LEDGER_DATABASE_URL`, `LEDGER_MAX_CONNECTIONS`,
    /// `LEDGER_BUSY_TIMEOUT_MS` and `LEDGER_LOG`, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Unset keys take their default,
    /// malformed values are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("LEDGER_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(raw) = lookup("LEDGER_MAX_CONNECTIONS") {
            config.max_connections = raw
                .trim()
                .parse()
                .with_context(|| format!("LEDGER_MAX_CONNECTIONS must be a positive integer, got {:?}", raw))?;
            anyhow::ensure!(config.max_connections > 0, "LEDGER_MAX_CONNECTIONS must be at least 1");
        }
        if let Some(raw) = lookup("LEDGER_BUSY_TIMEOUT_MS") {
            let millis: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("LEDGER_BUSY_TIMEOUT_MS must be a number of milliseconds, got {:?}", raw))?;
            config.busy_timeout = Duration::from_millis(millis);
        }
        if let Some(filter) = lookup("LEDGER_LOG") {
            config.log_filter = filter;
        }

        Ok(config)
    }
}
