//! SQLite-backed forecast cache and sync state.
//!
//! The cache holds exactly one sync's worth of daily rows. The only write
//! path for forecasts is [`ForecastCache::replace_all`], which swaps the whole
//! set inside a single transaction.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::CacheError;
use crate::types::{normalize_date, DailyForecast};

const LAST_NOTIFICATION_KEY: &str = "last_notification";
const LAST_REPLACE_KEY: &str = "last_replace";

const SELECT_COLUMNS: &str =
    "SELECT date_ms, weather_id, min, max, humidity, pressure, wind, degrees FROM weather";

/// Forecast cache shared by the sync orchestrator (writer) and readers.
pub struct ForecastCache {
    conn: Mutex<Connection>,
}

impl ForecastCache {
    /// Open (or create) the cache database at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache (for tests and dry runs).
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<(), CacheError> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS weather (
                date_ms INTEGER NOT NULL UNIQUE,
                weather_id INTEGER NOT NULL,
                min REAL NOT NULL,
                max REAL NOT NULL,
                humidity INTEGER NOT NULL,
                pressure REAL NOT NULL,
                wind REAL NOT NULL,
                degrees REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Discard every cached row and insert `records`, atomically.
    ///
    /// An empty slice leaves the cache empty. On error nothing changes.
    pub fn replace_all(&self, records: &[DailyForecast]) -> Result<(), CacheError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM weather", [])?;
        {
            let mut insert = tx.prepare(
                r#"
                INSERT INTO weather (date_ms, weather_id, min, max, humidity, pressure, wind, degrees)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )?;
            for record in records {
                insert.execute(params![
                    normalize_date(record.date).timestamp_millis(),
                    record.condition_code,
                    record.min_temp,
                    record.max_temp,
                    record.humidity,
                    record.pressure,
                    record.wind_speed,
                    record.wind_direction_degrees,
                ])?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?1, ?2)",
            params![LAST_REPLACE_KEY, Utc::now().timestamp_millis().to_string()],
        )?;

        tx.commit()?;
        tracing::debug!("Replaced forecast cache with {} rows", records.len());
        Ok(())
    }

    /// The forecast for one day, if cached.
    pub fn find_by_date(&self, date: DateTime<Utc>) -> Result<Option<DailyForecast>, CacheError> {
        let conn = self.conn.lock();
        let sql = format!("{} WHERE date_ms = ?1", SELECT_COLUMNS);
        let forecast = conn
            .query_row(
                &sql,
                params![normalize_date(date).timestamp_millis()],
                Self::row_to_forecast,
            )
            .optional()?;
        Ok(forecast)
    }

    /// All cached days on or after `date`, in ascending date order.
    pub fn find_from_date(&self, date: DateTime<Utc>) -> Result<Vec<DailyForecast>, CacheError> {
        let conn = self.conn.lock();
        let sql = format!("{} WHERE date_ms >= ?1 ORDER BY date_ms ASC", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![normalize_date(date).timestamp_millis()],
            Self::row_to_forecast,
        )?;

        rows.collect::<Result<Vec<_>, _>>().map_err(CacheError::from)
    }

    /// Every cached row, ascending.
    pub fn all(&self) -> Result<Vec<DailyForecast>, CacheError> {
        let conn = self.conn.lock();
        let sql = format!("{} ORDER BY date_ms ASC", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_forecast)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(CacheError::from)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM weather", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// When the last successful replace committed; `None` if no sync ever did.
    pub fn last_replaced_at(&self) -> Result<Option<DateTime<Utc>>, CacheError> {
        self.read_timestamp(LAST_REPLACE_KEY)
    }

    /// When the user was last notified about new weather.
    pub fn last_notification_at(&self) -> Result<Option<DateTime<Utc>>, CacheError> {
        self.read_timestamp(LAST_NOTIFICATION_KEY)
    }

    pub fn set_last_notification(&self, at: DateTime<Utc>) -> Result<(), CacheError> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?1, ?2)",
            params![LAST_NOTIFICATION_KEY, at.timestamp_millis().to_string()],
        )?;
        Ok(())
    }

    /// Stage `at` as the last notification time, run `dispatch`, and commit
    /// only if it succeeded.
    ///
    /// `dispatch` is not called if the timestamp can't be written. A failed
    /// dispatch rolls the write back and is returned as the inner error.
    pub fn record_notification<E>(
        &self,
        at: DateTime<Utc>,
        dispatch: impl FnOnce() -> Result<(), E>,
    ) -> Result<Result<(), E>, CacheError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?1, ?2)",
            params![LAST_NOTIFICATION_KEY, at.timestamp_millis().to_string()],
        )?;

        if let Err(e) = dispatch() {
            tx.rollback()?;
            return Ok(Err(e));
        }

        tx.commit()?;
        Ok(Ok(()))
    }

    fn read_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, CacheError> {
        let value: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(value) = value else {
            return Ok(None);
        };
        let millis: i64 = value
            .parse()
            .map_err(|_| CacheError::Corrupt(format!("{} = {:?}", key, value)))?;
        // Zero is the "never" sentinel
        if millis == 0 {
            return Ok(None);
        }
        DateTime::from_timestamp_millis(millis)
            .map(Some)
            .ok_or_else(|| CacheError::Corrupt(format!("{} out of range", key)))
    }

    fn row_to_forecast(row: &rusqlite::Row) -> rusqlite::Result<DailyForecast> {
        let date_ms: i64 = row.get(0)?;
        let humidity: i64 = row.get(4)?;
        let conversion = |index: usize, msg: String| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Integer,
                msg.into(),
            )
        };

        Ok(DailyForecast {
            date: DateTime::from_timestamp_millis(date_ms)
                .ok_or_else(|| conversion(0, format!("date out of range: {}", date_ms)))?,
            condition_code: row.get(1)?,
            min_temp: row.get(2)?,
            max_temp: row.get(3)?,
            humidity: u8::try_from(humidity)
                .map_err(|_| conversion(4, format!("humidity out of range: {}", humidity)))?,
            pressure: row.get(5)?,
            wind_speed: row.get(6)?,
            wind_direction_degrees: row.get(7)?,
        })
    }
}
