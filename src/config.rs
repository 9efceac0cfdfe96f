use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::catalog;
use crate::date_util::parse_timestamp;
use crate::error::{Error, Result};
use crate::sync::rate_limit::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://hq.appsflyer.com";

/// Extractor configuration, read from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_token: String,
    pub app_id: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Subset of stream ids to sync. Empty or absent means the default set.
    #[serde(default)]
    pub reports: Option<Vec<String>>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_requests_per_window")]
    pub max_requests_per_window: usize,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_factor_secs")]
    pub backoff_factor_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_max_requests_per_window() -> usize {
    2
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_factor_secs() -> u64 {
    2
}

impl Config {
    /// Minimal config with defaults for every tunable.
    pub fn new(api_token: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            app_id: app_id.into(),
            start_date: None,
            end_date: None,
            user_agent: None,
            reports: None,
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_requests_per_window: default_max_requests_per_window(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            max_attempts: default_max_attempts(),
            backoff_factor_secs: default_backoff_factor_secs(),
        }
    }

    /// Read and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_token.trim().is_empty() {
            return Err(Error::Config("api_token must not be empty".into()));
        }
        if self.app_id.trim().is_empty() {
            return Err(Error::Config("app_id must not be empty".into()));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid base_url '{}': {e}", self.base_url)))?;
        if self.max_requests_per_window == 0 || self.rate_limit_window_secs == 0 {
            return Err(Error::Config("rate limit must allow at least one request".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }

        let start = self.start_time()?;
        let end = self.end_time()?;
        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                return Err(Error::Config(format!(
                    "end_date {} is not after start_date {}",
                    end, start
                )));
            }
        }

        catalog::select_streams(self.reports.as_deref())?;
        Ok(())
    }

    pub fn start_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.start_date.as_deref().map(parse_timestamp).transpose()
    }

    pub fn end_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.end_date.as_deref().map(parse_timestamp).transpose()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            factor: Duration::from_secs(self.backoff_factor_secs),
            ..RetryPolicy::default()
        }
    }
}
