use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::{
    error::WeatherError,
    model::{LocationId, WeatherSnapshot, Wind},
};

use super::WeatherProvider;

const OPENWEATHER_API_BASE: &str = "https://api.openweathermap.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Current-conditions client for the OpenWeather `data/2.5/weather` endpoint.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    api_key: String,
    http: Client,
    base_url: String,
}

impl OpenWeatherClient {
    pub fn new(api_key: String) -> Result<Self, WeatherError> {
        Self::with_timeout(api_key, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(api_key: String, timeout: Duration) -> Result<Self, WeatherError> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            WeatherError::Configuration(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            api_key,
            http,
            base_url: OPENWEATHER_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    #[instrument(skip_all, fields(id = %id), level = "debug")]
    async fn fetch_current(&self, id: &LocationId) -> Result<WeatherSnapshot, WeatherError> {
        if self.api_key.trim().is_empty() {
            return Err(WeatherError::Configuration("OPENWEATHER_API_KEY missing".to_string()));
        }

        let url = format!("{}/data/2.5/weather", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[
                ("id", id.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = res.status();
        if !status.is_success() {
            let body = match res.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(error = %e, "failed to read OpenWeather error body");
                    String::new()
                }
            };
            debug!(status = status.as_u16(), "OpenWeather returned an error status");
            return Err(map_status(status, id, &body));
        }

        let body = res.text().await.map_err(|e| transport_error(&e))?;
        let raw: Value = serde_json::from_str(&body).map_err(|e| {
            WeatherError::unavailable(
                Some(status.as_u16()),
                format!("malformed OpenWeather body ({e}): {}", truncate_body(&body)),
            )
        })?;

        Ok(normalize(id, raw))
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn fetch(&self, id: &LocationId) -> Result<WeatherSnapshot, WeatherError> {
        self.fetch_current(id).await
    }
}

fn transport_error(err: &reqwest::Error) -> WeatherError {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    WeatherError::unavailable(err.status().map(|s| s.as_u16()), reason)
}

fn map_status(status: StatusCode, id: &LocationId, body: &str) -> WeatherError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            WeatherError::UpstreamAuth {
                status: status.as_u16(),
            }
        }
        StatusCode::TOO_MANY_REQUESTS => WeatherError::UpstreamRateLimited,
        StatusCode::NOT_FOUND => WeatherError::LocationNotFound(id.clone()),
        _ => WeatherError::unavailable(Some(status.as_u16()), truncate_body(body)),
    }
}

/// Map a provider payload onto a snapshot; absent or mistyped fields become `None`.
fn normalize(requested: &LocationId, raw: Value) -> WeatherSnapshot {
    let id = match raw.get("id") {
        Some(Value::Number(n)) => LocationId::new(n.to_string()),
        Some(Value::String(s)) if !s.is_empty() => LocationId::new(s.clone()),
        _ => requested.clone(),
    };

    let name = raw.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    let weather = raw
        .pointer("/weather/0/description")
        .and_then(Value::as_str)
        .unwrap_or(WeatherSnapshot::NO_DESCRIPTION)
        .to_string();

    let temp = number(&raw, "/main/temp");
    let temp_min = number(&raw, "/main/temp_min");
    let temp_max = number(&raw, "/main/temp_max");
    let pressure = number(&raw, "/main/pressure");
    let humidity = number(&raw, "/main/humidity");
    let visibility = number(&raw, "/visibility");
    let wind = Wind {
        speed: number(&raw, "/wind/speed"),
        deg: number(&raw, "/wind/deg"),
    };
    let sunrise = raw.pointer("/sys/sunrise").and_then(Value::as_i64);
    let sunset = raw.pointer("/sys/sunset").and_then(Value::as_i64);

    WeatherSnapshot {
        id,
        name,
        weather,
        temp,
        temp_min,
        temp_max,
        pressure,
        humidity,
        visibility,
        wind,
        sunrise,
        sunset,
        raw,
    }
}

fn number(raw: &Value, pointer: &str) -> Option<f64> {
    raw.pointer(pointer).and_then(Value::as_f64)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
