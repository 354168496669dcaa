//! Key-value store for the user's selected location.
//!
//! The record is a flat JSON object (`weather_prefs.json`) with the keys
//! `key_city_name`, `key_latitude` and `key_longitude`. Reads are served from
//! memory; writes land in memory immediately and reach disk in the background.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::types::{Result, WeatherError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct LocationPrefs {
    #[serde(rename = "key_city_name", default, skip_serializing_if = "Option::is_none")]
    city_name: Option<String>,
    #[serde(rename = "key_latitude", default, skip_serializing_if = "Option::is_none")]
    latitude: Option<f32>,
    #[serde(rename = "key_longitude", default, skip_serializing_if = "Option::is_none")]
    longitude: Option<f32>,
}

struct Inner {
    path: Option<PathBuf>,
    record: RwLock<LocationPrefs>,
    /// Serializes file writes; each write persists the newest record.
    write_lock: tokio::sync::Mutex<()>,
}

/// Persistent location preferences.
///
/// Cloning is cheap and clones share the same record.
#[derive(Clone)]
pub struct PreferencesStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PreferencesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferencesStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

impl PreferencesStore {
    /// Open the record stored at `path`. A missing file is an empty record.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let record = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                WeatherError::Preferences(format!("Failed to parse {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LocationPrefs::default(),
            Err(e) => {
                return Err(WeatherError::Preferences(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::debug!("Loaded preferences from {}", path.display());
        Ok(Self::with_record(Some(path), record))
    }

    /// A store without a backing file.
    pub fn in_memory() -> Self {
        Self::with_record(None, LocationPrefs::default())
    }

    fn with_record(path: Option<PathBuf>, record: LocationPrefs) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                record: RwLock::new(record),
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Overwrite the saved location.
    ///
    /// Coordinates are narrowed to `f32`. The new values are visible to reads
    /// immediately; the file write is scheduled on the current Tokio runtime
    /// and is only guaranteed durable after `flush`. Outside a runtime the
    /// write happens before returning.
    ///
    /// Write failures from either path are logged, not returned; call `flush`
    /// to observe them.
    pub fn save_location(&self, city: &str, latitude: f64, longitude: f64) {
        *self.inner.record.write() = LocationPrefs {
            city_name: Some(city.to_string()),
            latitude: Some(latitude as f32),
            longitude: Some(longitude as f32),
        };
        tracing::debug!("Saved location: {}", city);

        if self.inner.path.is_none() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.clone();
                handle.spawn(async move {
                    if let Err(e) = store.flush().await {
                        tracing::error!("Background preferences write failed: {}", e);
                    }
                });
            }
            Err(_) => {
                let _guard = self.inner.write_lock.blocking_lock();
                if let Err(e) = self.write_snapshot_blocking() {
                    tracing::error!("Preferences write failed: {}", e);
                }
            }
        }
    }

    /// Write the current record to disk and wait for completion.
    ///
    /// Unlike `save_location`, a failed write is returned to the caller.
    pub async fn flush(&self) -> Result<()> {
        let Some(path) = self.inner.path.as_deref() else {
            return Ok(());
        };

        let _guard = self.inner.write_lock.lock().await;
        let json = self.serialize_snapshot()?;
        let tmp = temp_path(path);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(path, e))?;
        }
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| write_error(path, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| write_error(path, e))?;

        tracing::debug!("Preferences flushed to {}", path.display());
        Ok(())
    }

    fn write_snapshot_blocking(&self) -> Result<()> {
        let Some(path) = self.inner.path.as_deref() else {
            return Ok(());
        };

        let json = self.serialize_snapshot()?;
        let tmp = temp_path(path);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| write_error(path, e))?;
        }
        std::fs::write(&tmp, json).map_err(|e| write_error(path, e))?;
        std::fs::rename(&tmp, path).map_err(|e| write_error(path, e))?;
        Ok(())
    }

    fn serialize_snapshot(&self) -> Result<String> {
        let snapshot = self.inner.record.read().clone();
        serde_json::to_string_pretty(&snapshot)
            .map_err(|e| WeatherError::Preferences(format!("Failed to serialize: {}", e)))
    }

    /// Saved city name, if any.
    pub fn city_name(&self) -> Option<String> {
        self.inner.record.read().city_name.clone()
    }

    /// Saved latitude, or `0.0` when never saved.
    pub fn latitude(&self) -> f32 {
        self.inner.record.read().latitude.unwrap_or(0.0)
    }

    /// Saved longitude, or `0.0` when never saved.
    pub fn longitude(&self) -> f32 {
        self.inner.record.read().longitude.unwrap_or(0.0)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_error(path: &Path, e: std::io::Error) -> WeatherError {
    WeatherError::Preferences(format!("Failed to write {}: {}", path.display(), e))
}
