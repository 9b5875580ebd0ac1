//! Core data models for MGNREGA Dash
//!
//! This module contains the canonical record types shared by the normalizer,
//! the upstream client, the cache store, and the resolver, plus the
//! collaborators that feed the HTTP surface (district catalog, geocoder).

pub mod catalog;
pub mod geo;
pub mod normalize;
pub mod synthetic;
pub mod upstream;

pub use catalog::{load_catalog, CatalogError, District};
pub use geo::{lookup_district, GeoMatch};
pub use normalize::{NormalizeError, Normalizer};
pub use upstream::{
    FetchFailure, FetchFailureKind, FetchOutcome, MetricsSource, SyntheticReason, UpstreamClient,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque district key, e.g. `lucknow` or `sant_kabir_nagar`
///
/// Ids come from the static catalog and are passed through as-is; the core
/// never validates them against the catalog. An unknown id simply has no
/// cached rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistrictId(String);

impl DistrictId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form used when matching upstream district names
    pub fn match_key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for DistrictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DistrictId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The three performance figures reported per district and month
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// Households provided employment in the period
    pub households_worked: u64,
    /// Wages paid out, in rupees
    pub wages_paid: f64,
    /// Works completed in the period
    pub works_completed: u64,
}

/// One district-month of metrics in canonical form
///
/// Serializes as `{district, year, month, data: {...}, last_updated}`, the
/// shape the dashboard front-end reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub district: DistrictId,
    pub year: i32,
    /// Calendar month, 1-12
    pub month: u32,
    #[serde(rename = "data")]
    pub metrics: Metrics,
    /// When this record was fetched or cached (not the reporting period)
    #[serde(rename = "last_updated")]
    pub observed_at: DateTime<Utc>,
    /// Placeholder value from the synthetic generator, not upstream data
    #[serde(default)]
    pub synthetic: bool,
}

impl MetricRecord {
    /// Sort key placing the most recent reporting period first
    pub fn period_desc(&self) -> std::cmp::Reverse<(i32, u32)> {
        std::cmp::Reverse((self.year, self.month))
    }
}

/// Which resolution path produced a served dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Cached rows still inside the freshness window
    Cache,
    /// Freshly fetched (real or synthetic) records
    Api,
    /// Stale cached rows served because the upstream fetch failed
    CacheOld,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Cache => "cache",
            Provenance::Api => "api",
            Provenance::CacheOld => "cache_old",
        }
    }
}
