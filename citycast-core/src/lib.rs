//! Core library for `citycast`.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The monitored location roster and its file sources
//! - An OpenWeather client that normalizes responses into snapshots
//! - A TTL snapshot cache and the aggregation engine fanning out over the roster
//! - Token-guarded entry points for a request-routing layer
//!
//! It is used by `citycast-cli`, but can also be embedded in a server.

pub mod access;
pub mod cache;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod model;
pub mod provider;

pub use access::{AccessError, ApiError, Claims, TokenVerifier, WeatherApi};
pub use cache::{SnapshotCache, TtlCache};
pub use config::Config;
pub use directory::LocationDirectory;
pub use engine::{AggregationEngine, FanOutReport};
pub use error::WeatherError;
pub use model::{LocationId, WeatherSnapshot, Wind};
pub use provider::{WeatherProvider, openweather::OpenWeatherClient, provider_from_config};
