//! Service configuration
//!
//! A single [`Config`] value is built at startup from environment variables
//! (with CLI overrides applied on top, see [`crate::cli`]) and handed to each
//! component's constructor.

use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

/// Default data.gov.in resource for district-wise MGNREGA performance
pub const DEFAULT_UPSTREAM_URL: &str =
    "https://api.data.gov.in/resource/ee03643a-ee4c-48c2-ac30-9f2ff26ab722";

/// Cache rows younger than this are served without refetching
pub const DEFAULT_FRESHNESS_HOURS: i64 = 24;

/// Records persisted per successful fetch, and rows served per request
pub const DEFAULT_MAX_CACHE_RECORDS: usize = 12;

/// Upper bound on a single upstream call
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Records requested from the upstream per call
pub const DEFAULT_PAGE_LIMIT: u32 = 1000;

/// Database file name used when no platform data directory is available
const FALLBACK_DATABASE_FILE: &str = "mgnrega_cache.db";

#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream statistics resource URL
    pub upstream_url: String,
    /// data.gov.in API key; `None` puts the service in synthetic-only mode
    pub api_key: Option<String>,
    /// Maximum age of cached rows still served as fresh
    pub freshness_window: chrono::Duration,
    /// Records cached per fetch and rows served per request
    pub max_cache_records: usize,
    /// SQLite cache database location
    pub database_path: PathBuf,
    /// Static district catalog (JSON array)
    pub catalog_path: PathBuf,
    /// HTTP listen address
    pub bind_addr: String,
    /// Upstream request timeout
    pub request_timeout: Duration,
    /// Records requested per upstream call
    pub page_limit: u32,
    /// Reject upstream records lacking a year or month instead of stamping the current period
    pub reject_undated: bool,
    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            api_key: None,
            freshness_window: chrono::Duration::hours(DEFAULT_FRESHNESS_HOURS),
            max_cache_records: DEFAULT_MAX_CACHE_RECORDS,
            database_path: default_database_path(),
            catalog_path: PathBuf::from("data/districts.json"),
            bind_addr: "0.0.0.0:5000".to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            page_limit: DEFAULT_PAGE_LIMIT,
            reject_undated: false,
            log_json: false,
        }
    }
}

impl Config {
    /// Reads configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, falling back to defaults
    ///
    /// Values that fail to parse are ignored rather than rejected, so a
    /// typo in one knob never keeps the service from starting.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let number = |name: &str| text(name).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            upstream_url: text("DATA_GOV_URL").unwrap_or(defaults.upstream_url),
            api_key: text("DATA_GOV_API_KEY"),
            freshness_window: number("CACHE_EXPIRY_HOURS")
                .and_then(|h| i64::try_from(h).ok())
                .and_then(chrono::Duration::try_hours)
                .unwrap_or(defaults.freshness_window),
            max_cache_records: number("MAX_CACHE_RECORDS")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_cache_records),
            database_path: text("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            catalog_path: text("DISTRICTS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.catalog_path),
            bind_addr: text("BIND_ADDR").unwrap_or(defaults.bind_addr),
            request_timeout: number("UPSTREAM_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            page_limit: number("UPSTREAM_PAGE_LIMIT")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.page_limit),
            reject_undated: text("REJECT_UNDATED_RECORDS")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.reject_undated),
            log_json: text("LOG_JSON")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.log_json),
        }
    }

    /// Whether upstream calls are made at all
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

/// XDG data directory (`~/.local/share/mgnrega-dash/cache.db` on Linux)
pub fn default_database_path() -> PathBuf {
    ProjectDirs::from("", "", "mgnrega-dash")
        .map(|dirs| dirs.data_dir().join("cache.db"))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DATABASE_FILE))
}
