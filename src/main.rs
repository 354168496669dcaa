use anyhow::{Context, Result};
use weatherapp_core::{AppError, Config, ConfigError};
use weatherapp_data::{OpenMeteoClient, PreferencesStore, WeatherDatabase, WeatherRepository};

#[tokio::main]
async fn main() -> Result<()> {
    weatherapp_core::init()?;

    let config = match Config::load_validated() {
        Ok(config) => config,
        Err(e) => match e.downcast::<ConfigError>() {
            Ok(config_err) => {
                let app_err = AppError::from(config_err);
                eprintln!("{}", app_err.user_message());
                return Err(app_err.into());
            }
            Err(e) => return Err(e),
        },
    };
    tracing::info!("Data directory: {}", config.data_dir.display());

    let db = WeatherDatabase::open(config.database_path())
        .context("Failed to open weather database")?;
    let prefs = PreferencesStore::open(config.preferences_path())
        .context("Failed to open preferences")?;
    let api = OpenMeteoClient::from_config(&config.weather)
        .context("Failed to create weather API client")?;

    let repo = WeatherRepository::new(db.weather_dao(), api, prefs);

    let mut saved = repo.get_saved_location();
    if saved.city_name.is_none() {
        if let Some(default) = &config.weather.default_location {
            tracing::info!("No saved location, using default: {}", default.city_name);
            repo.save_location(&default.city_name, default.latitude, default.longitude);
            saved = repo.get_saved_location();
        }
    }

    let city = saved.city_name.clone().unwrap_or_else(|| "(unnamed)".to_string());
    println!(
        "Location: {} ({}, {})",
        city,
        saved.latitude.unwrap_or_default(),
        saved.longitude.unwrap_or_default()
    );

    if let Err(e) = repo.fetch_weather(saved.latitude, saved.longitude).await {
        let app_err = AppError::from(e);
        tracing::error!("Refresh failed: {}", app_err);
        eprintln!("{}", app_err.user_message());
    }

    let rows = repo.get_weather().current();
    if rows.is_empty() {
        println!("No cached forecast.");
    }
    for row in &rows {
        println!("{:<20} {:>6.1} °C", row.time, row.temperature);
    }

    repo.preferences().flush().await?;
    Ok(())
}
