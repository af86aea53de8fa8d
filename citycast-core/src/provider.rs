use crate::{
    Config, LocationId, WeatherError, WeatherSnapshot, provider::openweather::OpenWeatherClient,
};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

pub mod openweather;

/// Source of current conditions for a single location.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch(&self, id: &LocationId) -> Result<WeatherSnapshot, WeatherError>;
}

/// Construct the OpenWeather provider from config.
///
/// Fails with [`WeatherError::Configuration`] when no API key is configured.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn WeatherProvider>, WeatherError> {
    let api_key = config.api_key()?;

    let mut client = OpenWeatherClient::with_timeout(api_key.to_owned(), config.request_timeout())?;
    if let Some(base_url) = &config.openweather.base_url {
        client = client.with_base_url(base_url);
    }

    Ok(Arc::new(client))
}
