//! Weather repository: the single entry point for callers.
//!
//! Combines the forecast API, the `weather_data` table and the location
//! preferences. A refresh replaces the whole cache: the API always returns a
//! complete forecast window, so old rows are never merged with new ones.

use crate::api::WeatherApi;
use crate::dao::{LiveWeatherData, WeatherDao};
use crate::preferences::PreferencesStore;
use crate::types::{Result, SavedLocation};

pub struct WeatherRepository<A> {
    dao: WeatherDao,
    api: A,
    prefs: PreferencesStore,
}

impl<A: WeatherApi> WeatherRepository<A> {
    pub fn new(dao: WeatherDao, api: A, prefs: PreferencesStore) -> Self {
        Self { dao, api, prefs }
    }

    /// Location currently stored in preferences.
    ///
    /// Fields are read independently; coordinates default to `0.0`.
    pub fn get_saved_location(&self) -> SavedLocation {
        SavedLocation {
            city_name: self.prefs.city_name(),
            latitude: Some(self.prefs.latitude()),
            longitude: Some(self.prefs.longitude()),
        }
    }

    /// Overwrite the stored location.
    pub fn save_location(&self, name: &str, latitude: f64, longitude: f64) {
        self.prefs.save_location(name, latitude, longitude);
    }

    /// Fetch a fresh forecast and replace the cached rows with it.
    ///
    /// Returns the number of rows stored. Errors propagate unchanged. The
    /// clear and the insert are separate writes: if the insert fails the
    /// table is left empty.
    ///
    /// One refresh at a time per database; concurrent callers, including
    /// other repositories over the same `WeatherDatabase`, queue behind it.
    pub async fn fetch_weather(
        &self,
        latitude: Option<f32>,
        longitude: Option<f32>,
    ) -> Result<usize> {
        let _refresh = self.dao.lock_refresh().await;

        let response = self.api.get_weather(latitude, longitude).await?;
        let records = response.into_records()?;
        let count = records.len();

        self.dao.clear().await?;
        self.dao.insert(records).await?;

        tracing::info!("Weather cache refreshed with {} hourly rows", count);
        Ok(count)
    }

    /// Live view of the cached rows, ordered by time label.
    pub fn get_weather(&self) -> LiveWeatherData {
        self.dao.query_all()
    }

    /// The preferences store backing this repository.
    pub fn preferences(&self) -> &PreferencesStore {
        &self.prefs
    }
}
