use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Query `v_product_comparison_details` before per-aspect lookups.
    pub comparison_view_enabled: bool,
    /// `None` keeps persisted selections in process memory.
    pub storage: Option<StorageConfig>,
    pub search_limit: i64,
    /// Live sessions not looked up for this long are disposed.
    pub session_idle_timeout: Duration,
    pub session_sweep_interval: Duration,
}

fn secs_var(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let database_max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);
        let comparison_view_enabled = std::env::var("COMPARISON_VIEW_ENABLED")
            .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);
        let search_limit = std::env::var("SEARCH_LIMIT")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(5);

        let session_idle_timeout = secs_var("SESSION_IDLE_TIMEOUT_SECS", 1800);
        let session_sweep_interval = secs_var("SESSION_SWEEP_INTERVAL_SECS", 60);

        let storage = match std::env::var("STORAGE_ENDPOINT") {
            Ok(endpoint) => Some(StorageConfig {
                endpoint,
                bucket: std::env::var("STORAGE_BUCKET").context("STORAGE_BUCKET is required")?,
                access_key: std::env::var("STORAGE_ACCESS_KEY")
                    .context("STORAGE_ACCESS_KEY is required")?,
                secret_key: std::env::var("STORAGE_SECRET_KEY")
                    .context("STORAGE_SECRET_KEY is required")?,
                region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".into()),
            }),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            database_max_connections,
            comparison_view_enabled,
            storage,
            search_limit,
            session_idle_timeout,
            session_sweep_interval,
        })
    }
}
