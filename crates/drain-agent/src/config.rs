// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::env;

use crate::error::DrainError;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 500;
const DEFAULT_FLUSH_THRESHOLD: usize = 1_000;
const DEFAULT_BUFFER_LIMIT: usize = 100_000;
const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DELIVERY_MAX_RETRIES: u32 = 3;
const DEFAULT_DELIVERY_RETRY_BACKOFF_BASE_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// One destination per sink URL; pool size is fixed for the process
    /// lifetime.
    pub sinks: Vec<String>,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Basic auth table for `/drain` (when no drain token is present) and
    /// `/target`.
    pub creds: HashMap<String, String>,
    /// Verbose logging of unclassifiable lines.
    pub debug: bool,
    pub flush_interval_ms: u64,
    pub flush_threshold: usize,
    /// Points buffered per destination beyond which new points are dropped.
    pub buffer_limit: usize,
    /// Timeout for each delivery attempt, in seconds.
    pub delivery_timeout_secs: u64,
    /// Maximum number of attempts before a batch is dropped.
    pub delivery_max_retries: u32,
    /// Base backoff duration between delivery retries, in milliseconds.
    pub delivery_retry_backoff_base_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            sinks: Vec::new(),
            database: "metrics".to_string(),
            user: None,
            password: None,
            creds: HashMap::new(),
            debug: false,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            delivery_timeout_secs: DEFAULT_DELIVERY_TIMEOUT_SECS,
            delivery_max_retries: DEFAULT_DELIVERY_MAX_RETRIES,
            delivery_retry_backoff_base_ms: DEFAULT_DELIVERY_RETRY_BACKOFF_BASE_MS,
        }
    }
}

impl Config {
    /// Builds the configuration from environment variables. The sink list
    /// is the only required setting; everything else has a default.
    pub fn from_env() -> Result<Config, DrainError> {
        let sinks: Vec<String> = env::var("INFLUXDB_HOSTS")
            .map_err(|_| {
                DrainError::Config("INFLUXDB_HOSTS environment variable is not set".to_string())
            })?
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if sinks.is_empty() {
            return Err(DrainError::Config(
                "INFLUXDB_HOSTS contains no sink urls".to_string(),
            ));
        }

        let port = parse_env("PORT", DEFAULT_PORT)?;

        let creds = match env::var("DRAIN_CREDS") {
            Ok(raw) => parse_creds(&raw)?,
            Err(_) => HashMap::new(),
        };

        Ok(Config {
            port,
            sinks,
            database: env::var("INFLUXDB_DATABASE").unwrap_or_else(|_| "metrics".to_string()),
            user: env::var("INFLUXDB_USER").ok(),
            password: env::var("INFLUXDB_PASSWORD").ok(),
            creds,
            debug: env::var("DEBUG").map(|v| v != "0").unwrap_or(false),
            flush_interval_ms: parse_env("FLUSH_INTERVAL_MS", DEFAULT_FLUSH_INTERVAL_MS)?,
            flush_threshold: parse_env("FLUSH_THRESHOLD", DEFAULT_FLUSH_THRESHOLD)?,
            buffer_limit: parse_env("BUFFER_LIMIT", DEFAULT_BUFFER_LIMIT)?,
            delivery_timeout_secs: parse_env(
                "DELIVERY_TIMEOUT_SECS",
                DEFAULT_DELIVERY_TIMEOUT_SECS,
            )?,
            delivery_max_retries: parse_env(
                "DELIVERY_MAX_RETRIES",
                DEFAULT_DELIVERY_MAX_RETRIES,
            )?,
            delivery_retry_backoff_base_ms: parse_env(
                "DELIVERY_RETRY_BACKOFF_BASE_MS",
                DEFAULT_DELIVERY_RETRY_BACKOFF_BASE_MS,
            )?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, DrainError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| DrainError::Config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Parses a `user:pass|user:pass` credential table.
fn parse_creds(raw: &str) -> Result<HashMap<String, String>, DrainError> {
    let mut creds = HashMap::new();
    for entry in raw.split('|').filter(|e| !e.is_empty()) {
        let (user, pass) = entry.split_once(':').ok_or_else(|| {
            DrainError::Config(format!("DRAIN_CREDS entry is not user:pass: {entry}"))
        })?;
        creds.insert(user.to_string(), pass.to_string());
    }
    Ok(creds)
}
