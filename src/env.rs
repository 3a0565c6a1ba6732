//! Environment variable names used for configuring a client from a
//! service's environment.
//!
//! These are purely helpers; [`ClientOptions`] itself never reads the
//! environment unless [`ClientOptions::from_env`] is called.

use crate::options::{ClientOptions, ConfigError};
use std::str::FromStr;
use std::time::Duration;

/// Base URL of the LogTide API, e.g. `http://localhost:8080`.
pub const LOGTIDE_API_URL_ENV: &str = "LOGTIDE_API_URL";

/// API key sent with every ingestion request.
pub const LOGTIDE_API_KEY_ENV: &str = "LOGTIDE_API_KEY";

pub const LOGTIDE_BATCH_SIZE_ENV: &str = "LOGTIDE_BATCH_SIZE";
pub const LOGTIDE_FLUSH_INTERVAL_MS_ENV: &str = "LOGTIDE_FLUSH_INTERVAL_MS";
pub const LOGTIDE_MAX_BUFFER_SIZE_ENV: &str = "LOGTIDE_MAX_BUFFER_SIZE";
pub const LOGTIDE_MAX_RETRIES_ENV: &str = "LOGTIDE_MAX_RETRIES";
pub const LOGTIDE_RETRY_DELAY_MS_ENV: &str = "LOGTIDE_RETRY_DELAY_MS";
pub const LOGTIDE_CIRCUIT_BREAKER_THRESHOLD_ENV: &str = "LOGTIDE_CIRCUIT_BREAKER_THRESHOLD";
pub const LOGTIDE_CIRCUIT_BREAKER_RESET_MS_ENV: &str = "LOGTIDE_CIRCUIT_BREAKER_RESET_MS";

/// `true`/`false` toggle for [`ClientOptions::debug`].
pub const LOGTIDE_DEBUG_ENV: &str = "LOGTIDE_DEBUG";

impl ClientOptions {
    /// Build options from `LOGTIDE_*` variables on top of the defaults.
    ///
    /// `LOGTIDE_API_URL` and `LOGTIDE_API_KEY` are required; every other
    /// variable is optional. The result is validated before it is returned.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::MissingEnv(key));

        let mut options = ClientOptions::new(
            required(LOGTIDE_API_URL_ENV)?,
            required(LOGTIDE_API_KEY_ENV)?,
        );

        if let Some(v) = parse(&lookup, LOGTIDE_BATCH_SIZE_ENV)? {
            options.batch_size = v;
        }
        if let Some(ms) = parse(&lookup, LOGTIDE_FLUSH_INTERVAL_MS_ENV)? {
            options.flush_interval = Duration::from_millis(ms);
        }
        if let Some(v) = parse(&lookup, LOGTIDE_MAX_BUFFER_SIZE_ENV)? {
            options.max_buffer_size = v;
        }
        if let Some(v) = parse(&lookup, LOGTIDE_MAX_RETRIES_ENV)? {
            options.max_retries = v;
        }
        if let Some(ms) = parse(&lookup, LOGTIDE_RETRY_DELAY_MS_ENV)? {
            options.retry_delay = Duration::from_millis(ms);
        }
        if let Some(v) = parse(&lookup, LOGTIDE_CIRCUIT_BREAKER_THRESHOLD_ENV)? {
            options.circuit_breaker_threshold = v;
        }
        if let Some(ms) = parse(&lookup, LOGTIDE_CIRCUIT_BREAKER_RESET_MS_ENV)? {
            options.circuit_breaker_reset = Duration::from_millis(ms);
        }
        if let Some(v) = parse(&lookup, LOGTIDE_DEBUG_ENV)? {
            options.debug = v;
        }

        options.validate()?;
        Ok(options)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value: raw }),
    }
}
