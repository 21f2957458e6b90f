//! Typed configuration from environment variables.
//!
//! Loads once at startup. Every variable has a default; a variable that is
//! set but malformed fails fast instead of being silently replaced.

use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_PROCESSING_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub log_level: String,
    pub otel_endpoint: Option<String>,
    pub worker: WorkerConfig,
}

/// The plain values the worker is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Simulated work per event.
    pub processing_delay: Duration,
    /// Bound on queued-but-unprocessed events. Must be positive.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            processing_delay: DEFAULT_PROCESSING_DELAY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "dev".to_string(),
            log_level: "info".to_string(),
            otel_endpoint: None,
            worker: WorkerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let processing_delay = match var("PROCESSING_DELAY_MS") {
            Some(raw) => Duration::from_millis(parse_var("PROCESSING_DELAY_MS", &raw)?),
            None => DEFAULT_PROCESSING_DELAY,
        };

        let queue_capacity = match var("QUEUE_CAPACITY") {
            Some(raw) => parse_var("QUEUE_CAPACITY", &raw)?,
            None => DEFAULT_QUEUE_CAPACITY,
        };
        if queue_capacity == 0 {
            return Err(Error::Config("QUEUE_CAPACITY must be positive".to_string()));
        }

        Ok(Self {
            environment: var("ENV").unwrap_or_else(|| "dev".to_string()),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            otel_endpoint: var("OTEL_ENDPOINT"),
            worker: WorkerConfig {
                processing_delay,
                queue_capacity,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {name}: {raw:?}")))
}
