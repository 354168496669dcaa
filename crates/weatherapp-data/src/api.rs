//! Remote forecast API.
//!
//! `OpenMeteoClient` talks to Open-Meteo (free, no API key required).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use weatherapp_core::{ReqwestErrorExt, WeatherConfig};

use crate::types::{ForecastResponse, Result, WeatherError};

pub const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com";
const FORECAST_PATH: &str = "/v1/forecast";
const HOURLY_VARIABLES: &str = "temperature_2m";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Source of hourly forecasts.
#[async_trait]
pub trait WeatherApi: Send + Sync {
    /// Fetch the hourly forecast for a coordinate pair.
    ///
    /// A missing coordinate is passed through; the service decides whether
    /// to reject the request.
    async fn get_weather(
        &self,
        latitude: Option<f32>,
        longitude: Option<f32>,
    ) -> Result<ForecastResponse>;
}

#[async_trait]
impl<T: WeatherApi + ?Sized> WeatherApi for Arc<T> {
    async fn get_weather(
        &self,
        latitude: Option<f32>,
        longitude: Option<f32>,
    ) -> Result<ForecastResponse> {
        (**self).get_weather(latitude, longitude).await
    }
}

/// Error body returned by Open-Meteo for rejected requests.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    reason: String,
}

#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| e.into_network_error())?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Client for the public Open-Meteo endpoint with the default timeout.
    pub fn open_meteo() -> Result<Self> {
        Self::new(OPEN_METEO_BASE_URL, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn from_config(config: &WeatherConfig) -> Result<Self> {
        Self::new(
            config.api_base_url.as_str(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl WeatherApi for OpenMeteoClient {
    #[instrument(skip(self), level = "debug")]
    async fn get_weather(
        &self,
        latitude: Option<f32>,
        longitude: Option<f32>,
    ) -> Result<ForecastResponse> {
        let url = format!("{}{}", self.base_url, FORECAST_PATH);

        let mut query: Vec<(&str, String)> = Vec::with_capacity(3);
        if let Some(lat) = latitude {
            query.push(("latitude", lat.to_string()));
        }
        if let Some(lon) = longitude {
            query.push(("longitude", lon.to_string()));
        }
        query.push(("hourly", HOURLY_VARIABLES.to_string()));

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| e.into_network_error())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.reason)
                .unwrap_or(body);
            tracing::warn!("Forecast request rejected ({}): {}", status, message);
            return Err(WeatherError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|e| e.into_network_error())?;
        let forecast: ForecastResponse =
            serde_json::from_str(&body).map_err(|e| WeatherError::Parse(e.to_string()))?;

        tracing::debug!(
            "Received {} hourly temperatures",
            forecast.hourly.temperature_2m.len()
        );
        Ok(forecast)
    }
}
