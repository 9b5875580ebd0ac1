//! Cache module for persisting normalized district metrics
//!
//! This module provides an append-only SQLite store keyed by district and
//! reporting period. Rows are never updated or deleted; reads return the most
//! recent periods first, so a newer write for the same period shadows older
//! ones. Staleness is judged by the caller from each row's `last_updated`.

mod store;

pub use store::{stale_cutoff, CacheEntry, CacheError, CacheStore};
