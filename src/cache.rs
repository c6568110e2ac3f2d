use crate::ticker::Ticker;
use crate::time_series::{PriceSource, PriceSourceError, RawPriceTable};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Errors that can occur when reading or writing the price cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// SQLite failure
    Sql(String),
    /// Stored payload could not be (de)serialized
    Payload(String),
    /// The connection mutex was poisoned by a panicking holder
    Poisoned,
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Sql(msg) => write!(f, "SQL error: {}", msg),
            CacheError::Payload(msg) => write!(f, "Cache payload error: {}", msg),
            CacheError::Poisoned => write!(f, "Cache connection lock poisoned"),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Sql(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Payload(err.to_string())
    }
}

/// SQLite store for raw price fetches.
///
/// Entries are keyed by `(ticker, start_year, end_year)` and expire after a
/// fixed time-to-live; there is no other invalidation. The schema is
/// created on first use.
#[derive(Debug)]
pub struct SqlitePriceCache {
    conn: Mutex<Connection>,
    ttl: Duration,
}

impl SqlitePriceCache {
    /// Opens (or creates) a file-backed cache.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be created.
    pub fn new<P: AsRef<Path>>(db_path: P, ttl: Duration) -> Result<Self, CacheError> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn, ttl)
    }

    /// Creates a cache backed by an in-memory database. Useful for testing.
    pub fn new_in_memory(ttl: Duration) -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, ttl)
    }

    fn from_connection(conn: Connection, ttl: Duration) -> Result<Self, CacheError> {
        Self::ensure_schema(&conn)?;
        Ok(SqlitePriceCache {
            conn: Mutex::new(conn),
            ttl,
        })
    }

    fn ensure_schema(conn: &Connection) -> Result<(), CacheError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS price_cache (
                ticker TEXT NOT NULL,
                start_year INTEGER NOT NULL,
                end_year INTEGER NOT NULL,
                fetched_at TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (ticker, start_year, end_year)
            )",
            [],
        )?;
        Ok(())
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        f(&conn)
    }

    /// Age after which an entry is ignored.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached table if present and younger than the TTL at `now`.
    pub fn get_at(
        &self,
        ticker: &Ticker,
        start_year: i32,
        end_year: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<RawPriceTable>, CacheError> {
        let row: Option<(DateTime<Utc>, String)> = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT fetched_at, payload FROM price_cache
                     WHERE ticker = ?1 AND start_year = ?2 AND end_year = ?3",
                    params![ticker.as_str(), start_year, end_year],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?)
        })?;

        match row {
            Some((fetched_at, payload)) if now - fetched_at < self.ttl => {
                Ok(Some(serde_json::from_str(&payload)?))
            }
            _ => Ok(None),
        }
    }

    /// Like [`get_at`](Self::get_at), evaluated at the current time.
    pub fn get(
        &self,
        ticker: &Ticker,
        start_year: i32,
        end_year: i32,
    ) -> Result<Option<RawPriceTable>, CacheError> {
        self.get_at(ticker, start_year, end_year, Utc::now())
    }

    /// Stores `table`, replacing any previous entry for the key.
    pub fn put_at(
        &self,
        ticker: &Ticker,
        start_year: i32,
        end_year: i32,
        table: &RawPriceTable,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(table)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO price_cache (ticker, start_year, end_year, fetched_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![ticker.as_str(), start_year, end_year, fetched_at, payload],
            )?;
            Ok(())
        })
    }

    /// Stores `table` stamped with the current time.
    pub fn put(
        &self,
        ticker: &Ticker,
        start_year: i32,
        end_year: i32,
        table: &RawPriceTable,
    ) -> Result<(), CacheError> {
        self.put_at(ticker, start_year, end_year, table, Utc::now())
    }

    /// Deletes entries older than the TTL. Returns the number removed.
    ///
    /// A TTL reaching past the earliest representable date expires nothing.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let Some(cutoff) = Utc::now().checked_sub_signed(self.ttl) else {
            return Ok(0);
        };
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM price_cache WHERE fetched_at < ?1",
                params![cutoff],
            )?)
        })
    }
}

/// Read-through cache in front of another price source.
///
/// Cache failures never fail a fetch: they are logged and the inner source
/// is used directly. Empty tables are not stored.
pub struct CachedPriceSource<S> {
    inner: S,
    cache: SqlitePriceCache,
}

impl<S: PriceSource> CachedPriceSource<S> {
    pub fn new(inner: S, cache: SqlitePriceCache) -> Self {
        CachedPriceSource { inner, cache }
    }

    pub fn cache(&self) -> &SqlitePriceCache {
        &self.cache
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait::async_trait]
impl<S: PriceSource> PriceSource for CachedPriceSource<S> {
    async fn fetch_history(
        &self,
        ticker: &Ticker,
        start_year: i32,
        end_year: i32,
    ) -> Result<RawPriceTable, PriceSourceError> {
        match self.cache.get(ticker, start_year, end_year) {
            Ok(Some(table)) => {
                log::debug!("Cache hit for {} {}-{}", ticker, start_year, end_year);
                return Ok(table);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Cache read failed for {}: {}", ticker, e),
        }

        let table = self.inner.fetch_history(ticker, start_year, end_year).await?;

        if !table.is_empty() {
            if let Err(e) = self.cache.put(ticker, start_year, end_year, &table) {
                log::warn!("Cache write failed for {}: {}", ticker, e);
            }
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_series::{InMemoryPriceSource, RawCell, CLOSE};
    use chrono::{FixedOffset, TimeZone};

    fn table() -> RawPriceTable {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        RawPriceTable::new(vec![
            offset.with_ymd_and_hms(2020, 6, 15, 9, 30, 0).unwrap(),
            offset.with_ymd_and_hms(2020, 6, 16, 9, 30, 0).unwrap(),
        ])
        .with_column(CLOSE, vec![RawCell::Number(10.0), RawCell::Text("x".to_string())])
    }

    fn ticker() -> Ticker {
        Ticker::new("AAPL").unwrap()
    }

    fn table_exists(cache: &SqlitePriceCache, name: &str) -> bool {
        cache
            .with_conn(|conn| {
                let mut stmt =
                    conn.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")?;
                Ok(stmt.exists([name])?)
            })
            .unwrap()
    }

    #[test]
    fn test_schema_created() {
        let cache = SqlitePriceCache::new_in_memory(Duration::hours(1)).unwrap();
        assert!(table_exists(&cache, "price_cache"));
        assert!(!table_exists(&cache, "nonexistent_table"));
    }

    #[test]
    fn test_round_trip_within_ttl() {
        let cache = SqlitePriceCache::new_in_memory(Duration::hours(1)).unwrap();
        cache.put(&ticker(), 2020, 2024, &table()).unwrap();
        assert_eq!(cache.get(&ticker(), 2020, 2024).unwrap(), Some(table()));
    }

    #[test]
    fn test_key_includes_year_span() {
        let cache = SqlitePriceCache::new_in_memory(Duration::hours(1)).unwrap();
        cache.put(&ticker(), 2020, 2024, &table()).unwrap();
        assert_eq!(cache.get(&ticker(), 2019, 2024).unwrap(), None);
        assert_eq!(cache.get(&Ticker::new("MSFT").unwrap(), 2020, 2024).unwrap(), None);
    }

    #[test]
    fn test_expired_entry_is_ignored() {
        let cache = SqlitePriceCache::new_in_memory(Duration::hours(1)).unwrap();
        let fetched_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        cache
            .put_at(&ticker(), 2020, 2024, &table(), fetched_at)
            .unwrap();

        let fresh = fetched_at + Duration::minutes(59);
        let stale = fetched_at + Duration::minutes(61);
        assert!(cache.get_at(&ticker(), 2020, 2024, fresh).unwrap().is_some());
        assert!(cache.get_at(&ticker(), 2020, 2024, stale).unwrap().is_none());
        assert_eq!(cache.purge_expired().unwrap(), 1);
    }

    #[test]
    fn test_purge_with_unbounded_ttl_keeps_everything() {
        let ttl = Duration::days(365 * 100_000_000);
        let cache = SqlitePriceCache::new_in_memory(ttl).unwrap();
        let fetched_at = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        cache
            .put_at(&ticker(), 2020, 2024, &table(), fetched_at)
            .unwrap();

        assert_eq!(cache.purge_expired().unwrap(), 0);
        assert!(cache.get(&ticker(), 2020, 2024).unwrap().is_some());
    }

    #[test]
    fn test_file_backed_cache_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let cache = SqlitePriceCache::new(&path, Duration::hours(24)).unwrap();
            cache.put(&ticker(), 2020, 2024, &table()).unwrap();
        }
        let reopened = SqlitePriceCache::new(&path, Duration::hours(24)).unwrap();
        assert!(reopened.get(&ticker(), 2020, 2024).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_read_through_fetches_once() {
        let mut inner = InMemoryPriceSource::new();
        inner.add_table(ticker(), table());
        let cache = SqlitePriceCache::new_in_memory(Duration::hours(1)).unwrap();
        let source = CachedPriceSource::new(inner, cache);

        let first = source.fetch_history(&ticker(), 2020, 2020).await.unwrap();
        let second = source.fetch_history(&ticker(), 2020, 2020).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.inner().calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_tables_are_not_cached() {
        let mut inner = InMemoryPriceSource::new();
        inner.add_table(ticker(), RawPriceTable::default());
        let source = CachedPriceSource::new(
            inner,
            SqlitePriceCache::new_in_memory(Duration::hours(1)).unwrap(),
        );

        source.fetch_history(&ticker(), 2020, 2020).await.unwrap();
        source.fetch_history(&ticker(), 2020, 2020).await.unwrap();
        assert_eq!(source.inner().calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_errors_pass_through() {
        let source = CachedPriceSource::new(
            InMemoryPriceSource::new(),
            SqlitePriceCache::new_in_memory(Duration::hours(1)).unwrap(),
        );
        let result = source.fetch_history(&ticker(), 2020, 2020).await;
        assert!(matches!(result, Err(PriceSourceError::TickerNotFound(_))));
    }
}
