use serde::{Deserialize, Serialize};
use weatherapp_core::{AppError, DatabaseError, NetworkError, WeatherError as CoreWeatherError};

/// A cached hourly temperature row from the `weather_data` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    /// Assigned by SQLite on insert
    pub id: i64,
    /// Free-form time label as returned by the API (e.g. "2025-01-01T00:00")
    pub time: String,
    /// Degrees Celsius
    pub temperature: f64,
}

/// A row waiting to be inserted; the id is always chosen by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWeatherRecord {
    pub time: String,
    pub temperature: f64,
}

impl NewWeatherRecord {
    pub fn new(time: impl Into<String>, temperature: f64) -> Self {
        Self {
            time: time.into(),
            temperature,
        }
    }
}

/// Location as read back from the preferences store.
///
/// Coordinates are always populated (0.0 when never saved) so the value can
/// be passed straight to `WeatherRepository::fetch_weather`.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedLocation {
    pub city_name: Option<String>,
    pub latitude: Option<f32>,
    pub longitude: Option<f32>,
}

/// Forecast payload returned by the remote API.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
    pub hourly: HourlyData,
}

/// Parallel hourly arrays; index `i` of each belongs to the same hour.
#[derive(Debug, Clone, Deserialize)]
pub struct HourlyData {
    pub time: Vec<String>,
    pub temperature_2m: Vec<f64>,
}

impl ForecastResponse {
    /// Zip the hourly arrays into insertable rows.
    ///
    /// The temperature series drives the zip: every temperature needs a time
    /// label at the same index, surplus time labels are ignored.
    pub fn into_records(self) -> Result<Vec<NewWeatherRecord>, WeatherError> {
        let HourlyData {
            time,
            temperature_2m,
        } = self.hourly;

        if temperature_2m.len() > time.len() {
            return Err(WeatherError::MismatchedHourly {
                times: time.len(),
                temperatures: temperature_2m.len(),
            });
        }

        Ok(temperature_2m
            .into_iter()
            .zip(time)
            .map(|(temperature, time)| NewWeatherRecord { time, temperature })
            .collect())
    }
}

/// Weather data layer errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
    #[error("Preferences error: {0}")]
    Preferences(String),
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Hourly arrays misaligned: {times} time labels for {temperatures} temperatures")]
    MismatchedHourly { times: usize, temperatures: usize },
}

pub type Result<T, E = WeatherError> = std::result::Result<T, E>;

impl From<WeatherError> for AppError {
    fn from(e: WeatherError) -> Self {
        match e {
            WeatherError::Storage(db) => AppError::Database(db),
            WeatherError::Preferences(s) => {
                AppError::Weather(CoreWeatherError::PreferencesError(s))
            }
            WeatherError::Network(n) => AppError::Network(n),
            WeatherError::Api { status, message } if status >= 500 => {
                AppError::Network(NetworkError::ServerError { status, message })
            }
            WeatherError::Api { message, .. } => {
                AppError::Weather(CoreWeatherError::ApiError(message))
            }
            WeatherError::Parse(s) => AppError::Network(NetworkError::InvalidResponse(s)),
            e @ WeatherError::MismatchedHourly { .. } => {
                AppError::Weather(CoreWeatherError::InvalidForecast(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn forecast(time: &[&str], temps: &[f64]) -> ForecastResponse {
        ForecastResponse {
            latitude: None,
            longitude: None,
            timezone: None,
            hourly: HourlyData {
                time: time.iter().map(|t| t.to_string()).collect(),
                temperature_2m: temps.to_vec(),
            },
        }
    }

    #[test]
    fn test_into_records_zips_by_index() {
        let records = forecast(&["2025-01-01T00:00", "2025-01-01T01:00"], &[18.2, 17.9])
            .into_records()
            .unwrap();

        assert_eq!(
            records,
            vec![
                NewWeatherRecord::new("2025-01-01T00:00", 18.2),
                NewWeatherRecord::new("2025-01-01T01:00", 17.9),
            ]
        );
    }

    #[test]
    fn test_into_records_ignores_surplus_times() {
        let records = forecast(&["00:00", "01:00", "02:00"], &[1.0, 2.0])
            .into_records()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].time, "01:00");
    }

    #[test]
    fn test_into_records_rejects_missing_times() {
        let err = forecast(&["00:00"], &[1.0, 2.0]).into_records().unwrap_err();
        assert!(matches!(
            err,
            WeatherError::MismatchedHourly {
                times: 1,
                temperatures: 2
            }
        ));
    }

    #[test]
    fn test_forecast_deserializes_open_meteo_payload() {
        let json = r#"{
            "latitude": -12.0,
            "longitude": -77.0,
            "generationtime_ms": 0.05,
            "timezone": "GMT",
            "hourly_units": {"time": "iso8601", "temperature_2m": "°C"},
            "hourly": {
                "time": ["2025-01-01T00:00"],
                "temperature_2m": [18.2]
            }
        }"#;

        let response: ForecastResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.timezone.as_deref(), Some("GMT"));
        assert_eq!(response.hourly.temperature_2m, vec![18.2]);
    }

    #[test]
    fn test_api_error_maps_by_status() {
        let server: AppError = WeatherError::Api {
            status: 502,
            message: "bad gateway".into(),
        }
        .into();
        assert!(matches!(server, AppError::Network(NetworkError::ServerError { status: 502, .. })));

        let client: AppError = WeatherError::Api {
            status: 400,
            message: "Parameter 'latitude' is missing".into(),
        }
        .into();
        assert!(matches!(client, AppError::Weather(CoreWeatherError::ApiError(_))));
    }

    #[test]
    fn test_mismatch_maps_to_invalid_forecast() {
        let app: AppError = WeatherError::MismatchedHourly {
            times: 0,
            temperatures: 1,
        }
        .into();
        assert!(matches!(app, AppError::Weather(CoreWeatherError::InvalidForecast(_))));
    }
}
