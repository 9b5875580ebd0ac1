//! SQLite-backed cache store for normalized district metrics
//!
//! Provides a `CacheStore` that appends one row per district-month on every
//! successful fetch and reads back the most recent periods for a district.

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::data::{DistrictId, MetricRecord, Metrics};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache lock poisoned")]
    Poisoned,
    #[error("task join error: {0}")]
    Join(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid cache row {id}: {reason}")]
    InvalidRow { id: i64, reason: String },
}

/// A persisted record plus its row identity
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Autogenerated row id; later writes have larger ids
    pub id: i64,
    /// The cached record; `observed_at` holds the row's `last_updated`
    pub record: MetricRecord,
}

impl CacheEntry {
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.record.observed_at
    }
}

/// Append-only district metrics history
///
/// The connection sits behind a mutex; each operation acquires it for the
/// duration of one closure on a blocking thread, so it is released on every
/// exit path including errors.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl CacheStore {
    /// Opens (creating if needed) the database at `path`
    ///
    /// Safe to call on every startup: the schema and indexes are only
    /// created when missing, and databases written by earlier releases gain
    /// the `synthetic` column in place.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;",
        )?;
        init_schema(&conn)?;

        Ok(Self {
            path: Some(path),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens a private in-memory database
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Database file, or `None` for an in-memory store
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one row stamped with the current time
    ///
    /// Never deduplicates: writing the same period twice leaves two rows,
    /// and reads prefer the newer one.
    pub async fn put(
        &self,
        district: &DistrictId,
        year: i32,
        month: u32,
        metrics: &Metrics,
        synthetic: bool,
    ) -> Result<i64, CacheError> {
        self.put_at(district, year, month, metrics, synthetic, Utc::now())
            .await
    }

    /// Appends one row with an explicit `last_updated`
    pub async fn put_at(
        &self,
        district: &DistrictId,
        year: i32,
        month: u32,
        metrics: &Metrics,
        synthetic: bool,
        last_updated: DateTime<Utc>,
    ) -> Result<i64, CacheError> {
        let district = district.as_str().to_string();
        let data = serde_json::to_string(metrics)?;
        let last_updated = format_timestamp(last_updated);

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO cache (district, year, month, data, last_updated, synthetic) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    district,
                    year,
                    month,
                    data,
                    last_updated,
                    synthetic
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Returns up to `limit` rows for `district`, most recent period first
    ///
    /// Rows for the same period are ordered newest write first. An unknown
    /// district yields an empty vector.
    pub async fn get_recent(
        &self,
        district: &DistrictId,
        limit: usize,
    ) -> Result<Vec<CacheEntry>, CacheError> {
        let district_key = district.as_str().to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = self
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, year, month, data, last_updated, synthetic \
                     FROM cache WHERE district = ?1 \
                     ORDER BY year DESC, month DESC, id DESC \
                     LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![district_key, limit], |row| {
                        Ok(RawRow {
                            id: row.get(0)?,
                            year: row.get(1)?,
                            month: row.get(2)?,
                            data: row.get(3)?,
                            last_updated: row.get(4)?,
                            synthetic: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(|row| row.into_entry(district)).collect()
    }

    /// Lists districts whose newest row was written before `cutoff`
    pub async fn stale_districts(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<(DistrictId, DateTime<Utc>)>, CacheError> {
        let cutoff = format_timestamp(cutoff);

        let rows = self
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT district, MAX(last_updated) AS newest \
                     FROM cache GROUP BY district \
                     HAVING newest < ?1 \
                     ORDER BY district",
                )?;
                let rows = stmt
                    .query_map(params![cutoff], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(district, newest)| {
                let newest = parse_timestamp(&newest).ok_or_else(|| CacheError::InvalidRow {
                    id: 0,
                    reason: format!("unreadable last_updated '{newest}' for {district}"),
                })?;
                Ok((DistrictId::new(district), newest))
            })
            .collect()
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Connection) -> Result<R, CacheError>,
    {
        let guard = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        f(&guard)
    }

    async fn run<F, R>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Connection) -> Result<R, CacheError> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.with_conn(f))
            .await
            .map_err(|e| CacheError::Join(e.to_string()))?
    }
}

struct RawRow {
    id: i64,
    year: i64,
    month: i64,
    data: String,
    last_updated: String,
    synthetic: bool,
}

impl RawRow {
    fn into_entry(self, district: &DistrictId) -> Result<CacheEntry, CacheError> {
        let invalid = |reason: String| CacheError::InvalidRow {
            id: self.id,
            reason,
        };
        let year = i32::try_from(self.year).map_err(|_| invalid(format!("year {}", self.year)))?;
        let month = u32::try_from(self.month)
            .ok()
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(|| invalid(format!("month {}", self.month)))?;
        let observed_at = parse_timestamp(&self.last_updated)
            .ok_or_else(|| invalid(format!("last_updated '{}'", self.last_updated)))?;
        let metrics: Metrics = serde_json::from_str(&self.data)?;

        Ok(CacheEntry {
            id: self.id,
            record: MetricRecord {
                district: district.clone(),
                year,
                month,
                metrics,
                observed_at,
                synthetic: self.synthetic,
            },
        })
    }
}

fn init_schema(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cache (\
           id INTEGER PRIMARY KEY AUTOINCREMENT,\
           district TEXT NOT NULL,\
           year INTEGER NOT NULL,\
           month INTEGER NOT NULL,\
           data TEXT NOT NULL,\
           last_updated TEXT NOT NULL \
         );",
    )?;
    ensure_column(conn, "synthetic", "INTEGER NOT NULL DEFAULT 0")?;
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_district_date ON cache(district, year DESC, month DESC);\
         CREATE INDEX IF NOT EXISTS idx_last_updated ON cache(last_updated DESC);",
    )?;
    Ok(())
}

fn ensure_column(conn: &Connection, name: &str, definition: &str) -> Result<(), CacheError> {
    let mut stmt = conn.prepare("PRAGMA table_info(cache)")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let col_name: String = row.get(1)?;
        if col_name == name {
            return Ok(());
        }
    }
    let sql = format!("ALTER TABLE cache ADD COLUMN {name} {definition}");
    conn.execute(&sql, [])?;
    Ok(())
}

/// The instant `window` before `now`, or the earliest representable time
/// when the window reaches past it
pub fn stale_cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Fixed-width UTC timestamps so text order matches time order
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339 and the zone-less ISO form written by older releases
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
