//! SQLite database handle for the forecast cache.
//!
//! The handle is built once by the composition root and passed down; every
//! `WeatherDao` it hands out shares one connection and one change notifier.

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use weatherapp_core::{DatabaseError, RusqliteErrorExt};

use crate::dao::{self, WeatherDao};
use crate::types::{Result, WeatherRecord};

/// Current layout of the `weather_data` table.
pub const SCHEMA_VERSION: i32 = 2;

const REQUIRED_COLUMNS: [&str; 3] = ["id", "time", "temperature"];

/// State shared between the handle and its DAOs.
pub(crate) struct Shared {
    pub(crate) conn: Mutex<Connection>,
    pub(crate) changes: watch::Sender<Vec<WeatherRecord>>,
    /// Held across a clear-then-insert refresh by any DAO of this handle.
    pub(crate) refresh: tokio::sync::Mutex<()>,
}

/// Explicitly constructed handle to the forecast database.
///
/// Clones and the DAOs they hand out share one connection. Opening the same
/// file twice yields independent handles that do not share refresh ordering.
#[derive(Clone)]
pub struct WeatherDatabase {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WeatherDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherDatabase").finish_non_exhaustive()
    }
}

impl WeatherDatabase {
    /// Open or create the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionFailed(format!(
                    "Failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| e.into_database_error())?;
        tracing::debug!("Opened weather database at {}", path.display());
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| e.into_database_error())?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        let rows = dao::load_all(&conn).map_err(|e| e.into_database_error())?;
        let (changes, _) = watch::channel(rows);

        Ok(Self {
            shared: Arc::new(Shared {
                conn: Mutex::new(conn),
                changes,
                refresh: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Data access object for the `weather_data` table.
    pub fn weather_dao(&self) -> WeatherDao {
        WeatherDao::new(self.shared.clone())
    }

    /// Schema version recorded in the database file.
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.shared.conn.lock();
        read_user_version(&conn).map_err(|e| e.into_database_error().into())
    }
}

fn read_user_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Create or upgrade the schema.
///
/// v1 and v2 share the row shape, so a v1 file keeps its rows. Files from a
/// newer build, or with an unexpected table layout, are reset: the table only
/// ever holds a re-fetchable forecast.
fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    let version = read_user_version(conn)?;

    if version > SCHEMA_VERSION {
        tracing::warn!(
            "Weather cache schema v{} is newer than supported v{}; resetting cache",
            version,
            SCHEMA_VERSION
        );
        conn.execute_batch("DROP TABLE IF EXISTS weather_data;")?;
    } else if has_unexpected_layout(conn)? {
        tracing::warn!("Weather cache table has an unexpected layout; resetting cache");
        conn.execute_batch("DROP TABLE IF EXISTS weather_data;")?;
    } else if version == 1 {
        tracing::info!("Upgrading weather cache schema v1 -> v{}", SCHEMA_VERSION);
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS weather_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            time TEXT NOT NULL,
            temperature REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_weather_data_time ON weather_data(time);
        "#,
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

fn has_unexpected_layout(conn: &Connection) -> rusqlite::Result<bool> {
    let exists = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='weather_data'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .is_some();
    if !exists {
        return Ok(false);
    }

    let columns: Vec<String> = conn
        .prepare("PRAGMA table_info(weather_data)")?
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(REQUIRED_COLUMNS
        .iter()
        .any(|required| !columns.iter().any(|c| c == required)))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn row_count(path: &Path) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM weather_data", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_fresh_database_is_current_version() {
        let db = WeatherDatabase::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("weather_db");

        let db = WeatherDatabase::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_v1_rows_survive_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather_db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE weather_data (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    time TEXT NOT NULL,
                    temperature REAL NOT NULL
                 );
                 INSERT INTO weather_data (time, temperature) VALUES ('2025-01-01T00:00', 18.2);
                 PRAGMA user_version = 1;",
            )
            .unwrap();
        }

        let db = WeatherDatabase::open(&path).unwrap();
        assert_eq!(db.schema_version().unwrap(), 2);
        assert_eq!(row_count(&path), 1);

        let live = db.weather_dao().query_all();
        assert_eq!(live.current()[0].time, "2025-01-01T00:00");
    }

    #[test]
    fn test_newer_schema_is_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather_db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE weather_data (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    time TEXT NOT NULL,
                    temperature REAL NOT NULL
                 );
                 INSERT INTO weather_data (time, temperature) VALUES ('00:00', 1.0);
                 PRAGMA user_version = 7;",
            )
            .unwrap();
        }

        let db = WeatherDatabase::open(&path).unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(row_count(&path), 0);
    }

    #[test]
    fn test_unexpected_layout_is_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather_db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE weather_data (id INTEGER PRIMARY KEY, hour TEXT);
                 INSERT INTO weather_data (hour) VALUES ('00:00');",
            )
            .unwrap();
        }

        let db = WeatherDatabase::open(&path).unwrap();
        assert!(db.weather_dao().query_all().current().is_empty());
        assert_eq!(row_count(&path), 0);
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather_db");
        {
            let conn = Connection::open(&path).unwrap();
            init_schema(&conn).unwrap();
            conn.execute(
                "INSERT INTO weather_data (time, temperature) VALUES ('01:00', 2.5)",
                [],
            )
            .unwrap();
        }

        let db = WeatherDatabase::open(&path).unwrap();
        let rows = db.weather_dao().query_all().current();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature, 2.5);
    }
}
