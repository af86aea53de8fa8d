use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Opaque identifier of a monitored location.
///
/// Roster sources carry city codes either as JSON numbers or strings; both are kept as
/// their exact textual form so cache keys and provider calls see the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LocationId(String);

impl LocationId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<u64> for LocationId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for LocationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(serde_json::Number),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n.to_string())),
            Raw::Text(s) => Ok(Self(s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: Option<f64>,
    pub deg: Option<f64>,
}

/// Normalized current conditions for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub id: LocationId,
    pub name: String,
    pub weather: String,
    pub temp: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
    /// Meters.
    pub visibility: Option<f64>,
    pub wind: Wind,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
    /// Untouched provider payload.
    pub raw: serde_json::Value,
}

impl WeatherSnapshot {
    /// Placeholder used when the provider gives no description.
    pub const NO_DESCRIPTION: &'static str = "N/A";

    pub fn sunrise_utc(&self) -> Option<DateTime<Utc>> {
        self.sunrise.and_then(|ts| DateTime::from_timestamp(ts, 0))
    }

    pub fn sunset_utc(&self) -> Option<DateTime<Utc>> {
        self.sunset.and_then(|ts| DateTime::from_timestamp(ts, 0))
    }
}
