use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::error::WeatherError;

pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";
pub const BASE_URL_ENV: &str = "OPENWEATHER_BASE_URL";
pub const ROSTER_PATH_ENV: &str = "CITIES_JSON_PATH";

/// File name shared by every roster candidate location.
pub const ROSTER_FILE_NAME: &str = "cities.json";

/// Provider access settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenWeatherConfig {
    pub api_key: Option<String>,

    /// Overrides the public API host, e.g. to point at a local mock.
    pub base_url: Option<String>,

    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RosterConfig {
    /// Explicit roster file; tried before the default locations.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    pub snapshot_ttl_secs: Option<u64>,
    pub roster_ttl_secs: Option<u64>,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// [openweather]
/// api_key = "..."
///
/// [roster]
/// path = "/srv/citycast/cities.json"
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub openweather: OpenWeatherConfig,

    #[serde(default)]
    pub roster: RosterConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(300);
    pub const DEFAULT_ROSTER_TTL: Duration = Duration::from_secs(3600);

    /// Load config from disk (or defaults on first run), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_file()?;
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Load config from disk only, or return an empty default if it doesn't exist yet.
    pub fn load_file() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = project_dirs()
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Overlay values from the environment; `lookup` is `std::env::var` outside of tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_blank(API_KEY_ENV) {
            self.openweather.api_key = Some(key);
        }
        if let Some(url) = non_blank(BASE_URL_ENV) {
            self.openweather.base_url = Some(url);
        }
        if let Some(path) = non_blank(ROSTER_PATH_ENV) {
            self.roster.path = Some(PathBuf::from(path));
        }
    }

    /// Provider access key; absence is fatal and checked before any network call.
    pub fn api_key(&self) -> Result<&str, WeatherError> {
        self.openweather
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                WeatherError::Configuration(format!(
                    "{API_KEY_ENV} missing.\n\
                     Hint: run `citycast configure` or export {API_KEY_ENV}."
                ))
            })
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.openweather.api_key = Some(api_key);
    }

    pub fn request_timeout(&self) -> Duration {
        self.openweather
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(Self::DEFAULT_TIMEOUT)
    }

    pub fn snapshot_ttl(&self) -> Duration {
        self.cache
            .snapshot_ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(Self::DEFAULT_SNAPSHOT_TTL)
    }

    pub fn roster_ttl(&self) -> Duration {
        self.cache
            .roster_ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(Self::DEFAULT_ROSTER_TTL)
    }

    /// Roster files in priority order: explicit override, working directory, shared data dir.
    pub fn roster_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(3);

        if let Some(path) = &self.roster.path {
            candidates.push(path.clone());
        }
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join(ROSTER_FILE_NAME));
        }
        if let Some(dirs) = project_dirs() {
            candidates.push(dirs.data_dir().join(ROSTER_FILE_NAME));
        }

        candidates
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "citycast", "citycast")
}
