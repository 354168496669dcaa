//! Queries against the `weather_data` table.

use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::watch;
use weatherapp_core::{DatabaseError, RusqliteErrorExt};

use crate::db::Shared;
use crate::types::{NewWeatherRecord, Result, WeatherRecord};

const SELECT_ALL: &str =
    "SELECT id, time, temperature FROM weather_data ORDER BY time ASC, id ASC";

/// Read every row in display order.
///
/// `time` uses SQLite's BINARY collation, so ordering is byte-wise string
/// order: "10:00" sorts before "9:00" unless labels are zero-padded.
pub(crate) fn load_all(conn: &Connection) -> rusqlite::Result<Vec<WeatherRecord>> {
    let mut stmt = conn.prepare_cached(SELECT_ALL)?;
    let rows = stmt.query_map([], |row| {
        Ok(WeatherRecord {
            id: row.get(0)?,
            time: row.get(1)?,
            temperature: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Data access object for cached forecast rows.
///
/// Blocking SQLite work runs on the Tokio blocking pool. Every successful
/// mutation republishes the full ordered row set to live subscribers.
#[derive(Clone)]
pub struct WeatherDao {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WeatherDao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherDao").finish_non_exhaustive()
    }
}

impl WeatherDao {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Append `records`; each row receives a fresh id. No deduplication.
    pub async fn insert(&self, records: Vec<NewWeatherRecord>) -> Result<()> {
        let count = records.len();
        self.mutate("insert", move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare_cached("INSERT INTO weather_data (time, temperature) VALUES (?1, ?2)")?;
                for record in &records {
                    stmt.execute(params![record.time, record.temperature])?;
                }
            }
            tx.commit()
        })
        .await?;

        tracing::debug!("Inserted {} weather rows", count);
        Ok(())
    }

    /// Exclusive refresh slot shared by every DAO of the same database.
    ///
    /// Hold the guard across `clear` and `insert` so two replacements never
    /// interleave.
    pub(crate) async fn lock_refresh(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.shared.refresh.lock().await
    }

    /// Live view of the whole table, ordered by `time` ascending.
    pub fn query_all(&self) -> LiveWeatherData {
        LiveWeatherData {
            rx: self.shared.changes.subscribe(),
        }
    }

    /// Delete every row.
    pub async fn clear(&self) -> Result<()> {
        self.mutate("clear", |conn| {
            conn.execute("DELETE FROM weather_data", [])?;
            Ok(())
        })
        .await?;

        tracing::debug!("Cleared weather table");
        Ok(())
    }

    /// One-shot ordered read, straight from the database.
    pub async fn snapshot(&self) -> Result<Vec<WeatherRecord>> {
        self.read("snapshot", load_all).await
    }

    /// Number of cached rows.
    pub async fn count(&self) -> Result<usize> {
        self.read("count", |conn| {
            conn.query_row("SELECT COUNT(*) FROM weather_data", [], |row| {
                row.get::<_, i64>(0)
            })
        })
        .await
        .map(|n| n as usize)
    }

    /// Run a write, then publish the new row set while still holding the
    /// connection so subscribers observe mutations in commit order.
    ///
    /// Once `f` has succeeded the write is durable and the call succeeds. If
    /// re-reading the table fails, subscribers keep the previous row set
    /// until the next successful mutation.
    async fn mutate<F>(&self, op: &'static str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<()> + Send + 'static,
    {
        let shared = self.shared.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = shared.conn.lock();
            f(&mut *conn)?;
            match load_all(&conn) {
                Ok(rows) => {
                    shared.changes.send_replace(rows);
                }
                Err(e) => {
                    tracing::warn!("Weather table {} applied but reload failed: {}", op, e);
                }
            }
            Ok::<_, rusqlite::Error>(())
        })
        .await
        .map_err(|e| DatabaseError::QueryFailed(format!("{} task failed: {}", op, e)))?
        .map_err(|e| {
            tracing::warn!("Weather table {} failed: {}", op, e);
            e.into_database_error().into()
        })
    }

    async fn read<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let shared = self.shared.clone();
        tokio::task::spawn_blocking(move || {
            let conn = shared.conn.lock();
            f(&*conn)
        })
        .await
        .map_err(|e| DatabaseError::QueryFailed(format!("{} task failed: {}", op, e)))?
        .map_err(|e| e.into_database_error().into())
    }
}

/// Continuously updated view of the `weather_data` table.
///
/// Holds the latest published row set; intermediate sets may be skipped by
/// slow observers.
#[derive(Debug, Clone)]
pub struct LiveWeatherData {
    rx: watch::Receiver<Vec<WeatherRecord>>,
}

impl LiveWeatherData {
    /// Latest row set.
    pub fn current(&self) -> Vec<WeatherRecord> {
        self.rx.borrow().clone()
    }

    /// Wait for the next mutation and return the row set it produced.
    ///
    /// Fails once the database handle and every DAO have been dropped.
    pub async fn changed(&mut self) -> Result<Vec<WeatherRecord>> {
        self.rx
            .changed()
            .await
            .map_err(|_| DatabaseError::ConnectionFailed("weather database closed".into()))?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::db::WeatherDatabase;
    use std::time::Duration;

    fn create_test_dao() -> WeatherDao {
        WeatherDatabase::open_in_memory()
            .expect("Failed to create in-memory database")
            .weather_dao()
    }

    fn rows(pairs: &[(&str, f64)]) -> Vec<NewWeatherRecord> {
        pairs
            .iter()
            .map(|(time, temp)| NewWeatherRecord::new(*time, *temp))
            .collect()
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let dao = create_test_dao();
        dao.insert(rows(&[("00:00", 10.0), ("01:00", 11.0)]))
            .await
            .unwrap();

        let records = dao.snapshot().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.id > 0));
        assert_ne!(records[0].id, records[1].id);
    }

    #[tokio::test]
    async fn test_insert_does_not_deduplicate() {
        let dao = create_test_dao();
        dao.insert(rows(&[("00:00", 10.0)])).await.unwrap();
        dao.insert(rows(&[("00:00", 12.0)])).await.unwrap();

        assert_eq!(dao.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_insert_empty_is_noop() {
        let dao = create_test_dao();
        dao.insert(Vec::new()).await.unwrap();
        assert_eq!(dao.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_all_orders_by_string_time() {
        let dao = create_test_dao();
        dao.insert(rows(&[("9:00", 9.0), ("10:00", 10.0), ("08:00", 8.0)]))
            .await
            .unwrap();

        let times: Vec<String> = dao.query_all().current().into_iter().map(|r| r.time).collect();
        assert_eq!(times, vec!["08:00", "10:00", "9:00"]);
    }

    #[tokio::test]
    async fn test_query_all_reflects_insert_without_new_read() {
        let dao = create_test_dao();
        let live = dao.query_all();
        assert!(live.current().is_empty());

        dao.insert(rows(&[("2025-01-01T01:00", 17.9), ("2025-01-01T00:00", 18.2)]))
            .await
            .unwrap();

        let current = live.current();
        assert_eq!(current.len(), 2);
        assert_eq!(current[0].time, "2025-01-01T00:00");
        assert_eq!(current[1].temperature, 17.9);
    }

    #[tokio::test]
    async fn test_clear_empties_live_view() {
        let dao = create_test_dao();
        dao.insert(rows(&[("00:00", 1.0), ("01:00", 2.0)]))
            .await
            .unwrap();
        let live = dao.query_all();
        assert_eq!(live.current().len(), 2);

        dao.clear().await.unwrap();
        assert!(live.current().is_empty());
        assert_eq!(dao.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_on_empty_table() {
        let dao = create_test_dao();
        dao.clear().await.unwrap();
        assert!(dao.query_all().current().is_empty());
    }

    #[tokio::test]
    async fn test_ids_keep_increasing_after_clear() {
        let dao = create_test_dao();
        dao.insert(rows(&[("00:00", 1.0)])).await.unwrap();
        let first = dao.snapshot().await.unwrap()[0].id;

        dao.clear().await.unwrap();
        dao.insert(rows(&[("00:00", 1.0)])).await.unwrap();
        let second = dao.snapshot().await.unwrap()[0].id;

        assert!(second > first);
    }

    #[tokio::test]
    async fn test_changed_wakes_subscriber() {
        let dao = create_test_dao();
        let mut live = dao.query_all();

        let writer = dao.clone();
        tokio::spawn(async move {
            writer.insert(rows(&[("00:00", 5.0)])).await.unwrap();
        });

        let updated = tokio::time::timeout(Duration::from_secs(5), live.changed())
            .await
            .expect("no update published")
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].temperature, 5.0);
    }

    #[tokio::test]
    async fn test_daos_share_notifier() {
        let db = WeatherDatabase::open_in_memory().unwrap();
        let reader = db.weather_dao();
        let writer = db.weather_dao();
        let live = reader.query_all();

        writer.insert(rows(&[("00:00", 3.0)])).await.unwrap();
        assert_eq!(live.current().len(), 1);
    }

    #[tokio::test]
    async fn test_applied_write_succeeds_when_reload_fails() {
        let dao = create_test_dao();
        dao.insert(rows(&[("00:00", 1.0)])).await.unwrap();
        let live = dao.query_all();

        // The write itself succeeds, but the table is gone for the re-read.
        dao.mutate("drop", |conn| conn.execute_batch("DROP TABLE weather_data"))
            .await
            .unwrap();

        assert_eq!(live.current().len(), 1);
        assert!(dao.snapshot().await.is_err());
    }

    #[tokio::test]
    async fn test_changed_errors_after_database_dropped() {
        let db = WeatherDatabase::open_in_memory().unwrap();
        let dao = db.weather_dao();
        let mut live = dao.query_all();

        drop(dao);
        drop(db);

        assert!(live.changed().await.is_err());
    }
}
