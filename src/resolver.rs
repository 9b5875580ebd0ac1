//! Freshness-aware resolution of district data
//!
//! Per request, in order:
//! 1. cached rows whose newest `last_updated` is inside the freshness window
//!    are served as `cache`;
//! 2. otherwise one fetch is attempted; whatever it returns (real or
//!    synthetic) is appended to the cache and served as `api`;
//! 3. if the fetch fails, any cached rows, however old, are served as
//!    `cache_old`;
//! 4. with no cache and a failed fetch the district is unavailable.
//!
//! Staleness is evaluated lazily here; nothing refreshes in the background.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::cache::{CacheEntry, CacheError, CacheStore};
use crate::config::Config;
use crate::data::{DistrictId, FetchFailure, FetchOutcome, MetricRecord, MetricsSource, Provenance};

/// Errors that end a resolution without data
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Nothing cached and the upstream fetch failed
    #[error("no data available for district '{district}': {cause}")]
    NoDataAvailable {
        district: DistrictId,
        cause: FetchFailure,
    },

    /// The cache could not be read
    #[error("cache unavailable: {0}")]
    Cache(#[from] CacheError),
}

/// A served dataset and the path that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub source: Provenance,
    /// True when any served record came from the synthetic generator; each
    /// item carries its own flag
    pub synthetic: bool,
    pub items: Vec<MetricRecord>,
}

impl Resolution {
    fn from_cache(source: Provenance, entries: Vec<CacheEntry>) -> Self {
        let synthetic = entries.iter().any(|e| e.record.synthetic);
        Self {
            source,
            synthetic,
            items: entries.into_iter().map(|e| e.record).collect(),
        }
    }
}

pub struct Resolver {
    store: CacheStore,
    source: Arc<dyn MetricsSource>,
    freshness_window: chrono::Duration,
    max_cache_records: usize,
}

impl Resolver {
    pub fn new(config: &Config, store: CacheStore, source: Arc<dyn MetricsSource>) -> Self {
        Self {
            store,
            source,
            freshness_window: config.freshness_window,
            max_cache_records: config.max_cache_records,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn freshness_window(&self) -> chrono::Duration {
        self.freshness_window
    }

    /// Resolves `district` against the current time
    pub async fn resolve(&self, district: &DistrictId) -> Result<Resolution, ResolveError> {
        self.resolve_at(district, Utc::now()).await
    }

    /// Resolves `district` as of `now`
    ///
    /// Cache is fresh only when `now - newest_last_updated` is strictly
    /// less than the freshness window.
    pub async fn resolve_at(
        &self,
        district: &DistrictId,
        now: DateTime<Utc>,
    ) -> Result<Resolution, ResolveError> {
        let cached = self.store.get_recent(district, self.max_cache_records).await?;

        if let Some(newest) = cached.iter().map(CacheEntry::last_updated).max() {
            if now - newest < self.freshness_window {
                info!(district = %district, rows = cached.len(), "serving fresh cache");
                return Ok(Resolution::from_cache(Provenance::Cache, cached));
            }
        }

        info!(district = %district, cached_rows = cached.len(), "cache stale or missing, fetching");

        match self.source.fetch(district).await {
            FetchOutcome::Fetched(records) => Ok(self.persist(district, records, false).await),
            FetchOutcome::FetchedEmpty { records, reason } => {
                info!(district = %district, ?reason, "fetch answered with synthetic series");
                Ok(self.persist(district, records, true).await)
            }
            FetchOutcome::Failed(cause) if !cached.is_empty() => {
                warn!(district = %district, error = %cause, rows = cached.len(), "fetch failed, serving stale cache");
                Ok(Resolution::from_cache(Provenance::CacheOld, cached))
            }
            FetchOutcome::Failed(cause) => {
                error!(district = %district, error = %cause, "no data available");
                Err(ResolveError::NoDataAvailable {
                    district: district.clone(),
                    cause,
                })
            }
        }
    }

    /// Appends up to `max_cache_records` records and returns them as served
    ///
    /// A failed write is logged and does not withhold the fetched data.
    async fn persist(
        &self,
        district: &DistrictId,
        mut records: Vec<MetricRecord>,
        synthetic: bool,
    ) -> Resolution {
        records.truncate(self.max_cache_records);

        let mut written = 0;
        for record in &mut records {
            record.synthetic |= synthetic;
            match self
                .store
                .put(district, record.year, record.month, &record.metrics, record.synthetic)
                .await
            {
                Ok(_) => written += 1,
                Err(e) => {
                    warn!(district = %district, year = record.year, month = record.month, error = %e, "failed to cache record")
                }
            }
        }
        info!(district = %district, written, synthetic, "cached fetched records");

        Resolution {
            source: Provenance::Api,
            synthetic,
            items: records,
        }
    }
}
