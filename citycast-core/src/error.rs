//! Closed error taxonomy surfaced by the aggregation core.

use thiserror::Error;

use crate::model::LocationId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WeatherError {
    /// Local misconfiguration; retrying cannot help.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("OpenWeather rejected the configured API key (HTTP {status})")]
    UpstreamAuth { status: u16 },

    #[error("OpenWeather rate limit exceeded (HTTP 429)")]
    UpstreamRateLimited,

    #[error("City id {0} not found at OpenWeather")]
    LocationNotFound(LocationId),

    #[error("Failed to fetch data from OpenWeather{}: {reason}", status_suffix(.status))]
    UpstreamUnavailable {
        status: Option<u16>,
        reason: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl WeatherError {
    pub(crate) fn unavailable(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            status,
            reason: reason.into(),
        }
    }

    /// Transient failures a caller may retry after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamRateLimited | Self::UpstreamUnavailable { .. })
    }

    /// Failures that affect every location, not just the one requested.
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::UpstreamAuth { .. })
    }

    /// Status a request-routing layer answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Configuration(_) => 500,
            Self::LocationNotFound(_) => 404,
            Self::UpstreamAuth { .. }
            | Self::UpstreamRateLimited
            | Self::UpstreamUnavailable { .. } => 502,
        }
    }
}
