//! Engine configuration.
//!
//! Explicit values win, environment variables fill the gaps, defaults cover
//! the rest. Environment resolution goes through `dotenvy` so a local
//! `.env` file behaves like the process environment.

use std::time::Duration;

use crate::queue::{QueueConfig, RateLimit};

/// Tuning knobs for the engine and its worker pool.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Concurrent queue workers.
    pub workers: usize,
    /// Delivery attempts per step task before the queue gives up.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between redeliveries.
    pub retry_base_delay: Duration,
    /// Optional global ceiling on task starts across the pool.
    pub rate_limit: Option<RateLimit>,
    /// Finished deliveries retained by the queue for observability.
    pub history_limit: usize,
    /// Base URL used when composing tracking artifacts.
    pub base_url: String,
    /// Database name for the sqlite-backed stores, when used.
    pub sqlite_db_name: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            rate_limit: None,
            history_limit: 64,
            base_url: "http://localhost:3000".to_string(),
            sqlite_db_name: None,
        }
    }
}

impl EngineConfig {
    /// Resolve configuration from the environment (and `.env`), falling back
    /// to defaults field by field.
    ///
    /// Recognized variables: `DRIPLINE_WORKERS`, `DRIPLINE_MAX_ATTEMPTS`,
    /// `DRIPLINE_RETRY_BASE_MS`, `DRIPLINE_RATE_LIMIT_PER_SEC`,
    /// `DRIPLINE_BASE_URL`, `DRIPLINE_SQLITE_DB`.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let workers = env_parse("DRIPLINE_WORKERS").unwrap_or(defaults.workers);
        let max_attempts = env_parse("DRIPLINE_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts);
        let retry_base_delay = env_parse("DRIPLINE_RETRY_BASE_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_base_delay);
        let rate_limit = env_parse("DRIPLINE_RATE_LIMIT_PER_SEC").map(RateLimit::per_second);
        let base_url = std::env::var("DRIPLINE_BASE_URL").unwrap_or(defaults.base_url);
        let sqlite_db_name = std::env::var("DRIPLINE_SQLITE_DB").ok();

        Self {
            workers,
            max_attempts,
            retry_base_delay,
            rate_limit,
            history_limit: defaults.history_limit,
            base_url,
            sqlite_db_name,
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = Some(limit);
        self
    }

    /// Derive the queue-facing slice of this configuration.
    #[must_use]
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            workers: self.workers,
            max_attempts: self.max_attempts,
            retry_base_delay: self.retry_base_delay,
            rate_limit: self.rate_limit,
            history_limit: self.history_limit,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
