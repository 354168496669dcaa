//! Weather data layer for WeatherApp
//!
//! Fetches hourly temperatures from an Open-Meteo compatible API, caches them
//! in SQLite and persists the user's selected location.

pub mod api;
pub mod dao;
pub mod db;
pub mod preferences;
pub mod repository;
pub mod types;

pub use api::{OpenMeteoClient, WeatherApi};
pub use dao::{LiveWeatherData, WeatherDao};
pub use db::WeatherDatabase;
pub use preferences::PreferencesStore;
pub use repository::WeatherRepository;
pub use types::*;
