//! Session configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::types::SessionError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3030";
pub const DEFAULT_STORAGE_PATH: &str = "lazyday_user.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_FETCH_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_MS: u64 = 1000;
pub const DEFAULT_RETRY_MAX_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// Retry schedule for session fetches: `min(base * 2^attempt, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure. Zero disables retries.
    pub retries: u32,
    pub base_ms: u64,
    pub max_ms: u64,
}

impl RetryPolicy {
    #[must_use]
    pub fn none() -> Self {
        Self { retries: 0, base_ms: 0, max_ms: 0 }
    }

    /// Back-off before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.max_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retries: DEFAULT_FETCH_RETRIES, base_ms: DEFAULT_RETRY_BASE_MS, max_ms: DEFAULT_RETRY_MAX_MS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub api_base_url: String,
    pub storage_path: PathBuf,
    pub timeouts: HttpTimeouts,
    pub retry: RetryPolicy,
}

impl SessionConfig {
    /// Build typed session config from environment variables.
    ///
    /// Optional:
    /// - `SESSION_API_BASE_URL`: default `http://localhost:3030`
    /// - `SESSION_STORAGE_PATH`: default `lazyday_user.json`
    /// - `SESSION_REQUEST_TIMEOUT_SECS`: default 30
    /// - `SESSION_CONNECT_TIMEOUT_SECS`: default 10
    /// - `SESSION_FETCH_RETRIES`: default 3
    /// - `SESSION_RETRY_BASE_MS`: default 1000
    /// - `SESSION_RETRY_MAX_MS`: default 30000
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConfigParse`] if the base URL is not http(s).
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_env_with_base_url(None)
    }

    /// Like [`SessionConfig::from_env`], but `base_url` (when given) replaces
    /// `SESSION_API_BASE_URL` before validation.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConfigParse`] if the URL in effect is not http(s).
    pub fn from_env_with_base_url(base_url: Option<&str>) -> Result<Self, SessionError> {
        let raw_url = match base_url {
            Some(url) => url.to_owned(),
            None => std::env::var("SESSION_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.into()),
        };
        let api_base_url = normalize_base_url(&raw_url)?;
        let storage_path =
            PathBuf::from(std::env::var("SESSION_STORAGE_PATH").unwrap_or_else(|_| DEFAULT_STORAGE_PATH.into()));
        let timeouts = HttpTimeouts {
            request_secs: env_parse("SESSION_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("SESSION_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let retry = RetryPolicy {
            retries: env_parse("SESSION_FETCH_RETRIES", DEFAULT_FETCH_RETRIES),
            base_ms: env_parse("SESSION_RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS),
            max_ms: env_parse("SESSION_RETRY_MAX_MS", DEFAULT_RETRY_MAX_MS),
        };

        Ok(Self { api_base_url, storage_path, timeouts, retry })
    }

    /// Override the API base URL, e.g. from a CLI flag.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConfigParse`] if the URL is not http(s).
    pub fn with_base_url(mut self, raw: &str) -> Result<Self, SessionError> {
        self.api_base_url = normalize_base_url(raw)?;
        Ok(self)
    }
}

pub(crate) fn normalize_base_url(raw: &str) -> Result<String, SessionError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(SessionError::ConfigParse(format!("SESSION_API_BASE_URL must be http(s): {raw}")));
    }
    Ok(trimmed.to_string())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
