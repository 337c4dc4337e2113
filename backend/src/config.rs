//! Runtime configuration.
//!
//! Values come from the environment, with an optional `.env` file loaded
//! first. Everything except the application id has a working default.
//!
//! | Variable        | Default                                                  |
//! |-----------------|----------------------------------------------------------|
//! | `REQUEST_URL`   | `https://api.e-stat.go.jp/rest/3.0/app/json/getStatsData` |
//! | `APP_ID`        | (none, required to run)                                  |
//! | `STATS_DATA_ID` | `0004002161`                                             |
//! | `ESTAT_LANG`    | `J`                                                      |

use chrono::Datelike;
use std::env;

use crate::error::{ConfigError, ConfigResult, InputFormatError, InputResult};

/// e-Stat `getStatsData` JSON endpoint.
pub const DEFAULT_REQUEST_URL: &str = "https://api.e-stat.go.jp/rest/3.0/app/json/getStatsData";

/// Customs trade statistics table (HS code x customs office x country, monthly).
pub const DEFAULT_STATS_DATA_ID: &str = "0004002161";

/// Response language.
pub const DEFAULT_LANG: &str = "J";

/// First year the customs table is published for.
pub const MIN_YEAR: i32 = 1988;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Statistics endpoint.
    pub request_url: String,
    /// e-Stat application id (`appId`).
    pub app_id: Option<String>,
    /// Target dataset (`statsDataId`).
    pub stats_data_id: String,
    /// Response language (`lang`).
    pub lang: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_url: DEFAULT_REQUEST_URL.to_string(),
            app_id: None,
            stats_data_id: DEFAULT_STATS_DATA_ID.to_string(),
            lang: DEFAULT_LANG.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment (and `.env` if present).
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let config = Self {
            request_url: env_or("REQUEST_URL", defaults.request_url),
            app_id: env::var("APP_ID").ok().filter(|v| !v.trim().is_empty()),
            stats_data_id: env_or("STATS_DATA_ID", defaults.stats_data_id),
            lang: env_or("ESTAT_LANG", defaults.lang),
        };
        config.check_url()?;
        Ok(config)
    }

    /// Override the application id (e.g. from a CLI flag or form field).
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Override the endpoint URL.
    pub fn with_request_url(mut self, url: impl Into<String>) -> Self {
        self.request_url = url.into();
        self
    }

    /// The application id, or [`ConfigError::MissingAppId`].
    pub fn require_app_id(&self) -> ConfigResult<&str> {
        self.app_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::MissingAppId)
    }

    /// Check that the endpoint URL parses.
    pub fn check_url(&self) -> ConfigResult<()> {
        reqwest::Url::parse(&self.request_url)
            .map(|_| ())
            .map_err(|e| ConfigError::InvalidUrl {
                url: self.request_url.clone(),
                message: e.to_string(),
            })
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

/// Latest year accepted: next calendar year.
pub fn max_year() -> i32 {
    chrono::Local::now().year() + 1
}

/// Validate a target year against `MIN_YEAR..=max_year()`.
pub fn validate_year(year: i32) -> InputResult<i32> {
    let max = max_year();
    if (MIN_YEAR..=max).contains(&year) {
        Ok(year)
    } else {
        Err(InputFormatError::InvalidYear { year, min: MIN_YEAR, max })
    }
}
