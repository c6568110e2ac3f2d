//! Environment-driven settings for the price provider, cache and universe.

use crate::universe::{DEFAULT_CSV_URL, DEFAULT_WIKIPEDIA_URL};
use crate::yahoo_finance::DownloaderConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const CACHE_PATH_VAR: &str = "SEASONALITY_CACHE_PATH";
pub const CACHE_TTL_HOURS_VAR: &str = "SEASONALITY_CACHE_TTL_HOURS";
pub const UNIVERSE_URL_VAR: &str = "SEASONALITY_UNIVERSE_URL";
pub const UNIVERSE_CSV_URL_VAR: &str = "SEASONALITY_UNIVERSE_CSV_URL";
pub const UNIVERSE_FILE_VAR: &str = "SEASONALITY_UNIVERSE_FILE";
pub const MAX_RETRIES_VAR: &str = "YAHOO_MAX_RETRIES";
pub const REQUESTS_PER_SECOND_VAR: &str = "YAHOO_REQUESTS_PER_SECOND";
pub const TIMEOUT_SECS_VAR: &str = "YAHOO_TIMEOUT_SECS";

/// Longest accepted cache lifetime: one hundred years.
pub const MAX_CACHE_TTL_HOURS: i64 = 100 * 366 * 24;

/// Runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// SQLite cache file (default: "seasonality_cache.db")
    pub cache_path: PathBuf,
    /// Cache time-to-live in hours (default: 24)
    pub cache_ttl_hours: i64,
    /// HTML constituents page
    pub universe_url: String,
    /// CSV constituents mirror
    pub universe_csv_url: String,
    /// Optional local ticker list, tried last
    pub universe_file: Option<PathBuf>,
    /// Maximum attempts per price request (default: 3)
    pub max_retries: u32,
    /// Price requests per second (default: 2.0)
    pub requests_per_second: f64,
    /// HTTP timeout in seconds (default: 30)
    pub timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let downloader = DownloaderConfig::default();
        Settings {
            cache_path: PathBuf::from("seasonality_cache.db"),
            cache_ttl_hours: 24,
            universe_url: DEFAULT_WIKIPEDIA_URL.to_string(),
            universe_csv_url: DEFAULT_CSV_URL.to_string(),
            universe_file: None,
            max_retries: downloader.max_retries,
            requests_per_second: downloader.requests_per_second,
            timeout_seconds: downloader.timeout_seconds,
        }
    }
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// Unset or unparseable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Settings {
            cache_path: text(CACHE_PATH_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            cache_ttl_hours: parsed(&text, CACHE_TTL_HOURS_VAR)
                .filter(|h: &i64| (0..=MAX_CACHE_TTL_HOURS).contains(h))
                .unwrap_or(defaults.cache_ttl_hours),
            universe_url: text(UNIVERSE_URL_VAR).unwrap_or(defaults.universe_url),
            universe_csv_url: text(UNIVERSE_CSV_URL_VAR).unwrap_or(defaults.universe_csv_url),
            universe_file: text(UNIVERSE_FILE_VAR).map(PathBuf::from),
            max_retries: parsed(&text, MAX_RETRIES_VAR)
                .filter(|n: &u32| *n >= 1)
                .unwrap_or(defaults.max_retries),
            requests_per_second: parsed(&text, REQUESTS_PER_SECOND_VAR)
                .filter(|r: &f64| r.is_finite() && *r >= 0.0)
                .unwrap_or(defaults.requests_per_second),
            timeout_seconds: parsed(&text, TIMEOUT_SECS_VAR)
                .filter(|s: &u64| *s >= 1)
                .unwrap_or(defaults.timeout_seconds),
        }
    }

    /// Cache lifetime, clamped to `0..=MAX_CACHE_TTL_HOURS`.
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours.clamp(0, MAX_CACHE_TTL_HOURS))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn downloader_config(&self) -> DownloaderConfig {
        DownloaderConfig {
            max_retries: self.max_retries,
            requests_per_second: self.requests_per_second,
            timeout_seconds: self.timeout_seconds,
            ..DownloaderConfig::default()
        }
    }
}

fn parsed<T, F>(text: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = text(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}
