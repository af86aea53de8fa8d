//! Roster of monitored locations, loaded from the first readable `cities.json` candidate.

use serde::Deserialize;
use std::{collections::HashSet, path::PathBuf, time::Duration};
use tracing::{debug, info, instrument, warn};

use crate::{
    cache::TtlCache,
    config::Config,
    error::WeatherError,
    model::LocationId,
};

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(rename = "List")]
    list: Vec<RosterRecord>,
}

#[derive(Debug, Deserialize)]
struct RosterRecord {
    #[serde(rename = "CityCode")]
    city_code: LocationId,
}

/// Resolves and caches the ordered roster of [`LocationId`]s.
///
/// Concurrent callers hitting an expired roster may each reload it; the source is a local
/// file so no coordination is attempted.
#[derive(Debug)]
pub struct LocationDirectory {
    candidates: Vec<PathBuf>,
    roster: TtlCache<(), Vec<LocationId>>,
}

impl LocationDirectory {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

    /// `candidates` are tried in order; the first one that reads and parses wins.
    pub fn new(candidates: Vec<PathBuf>, ttl: Duration) -> Self {
        Self {
            candidates,
            roster: TtlCache::new(ttl),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.roster_candidates(), config.roster_ttl())
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn resolve(&self) -> Result<Vec<LocationId>, WeatherError> {
        if let Some(ids) = self.roster.get(&()) {
            debug!(count = ids.len(), "roster cache hit");
            return Ok(ids);
        }

        let ids = self.load().await?;
        self.roster.put((), ids.clone());
        Ok(ids)
    }

    async fn load(&self) -> Result<Vec<LocationId>, WeatherError> {
        for path in &self.candidates {
            let contents = match tokio::fs::read_to_string(path).await {
                Ok(contents) => contents,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "roster candidate unreadable");
                    continue;
                }
            };

            match parse_roster(&contents) {
                Ok(ids) => {
                    info!(path = %path.display(), count = ids.len(), "loaded roster");
                    return Ok(ids);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "roster candidate is not valid");
                }
            }
        }

        let tried: Vec<String> = self
            .candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        Err(WeatherError::Configuration(format!(
            "cities.json not found (tried: {}).\n\
             Hint: set CITIES_JSON_PATH or place one in the working directory.",
            if tried.is_empty() {
                "no candidates".to_string()
            } else {
                tried.join(", ")
            }
        )))
    }
}

/// Parse a roster document, dropping duplicate codes after their first occurrence.
pub fn parse_roster(contents: &str) -> Result<Vec<LocationId>, serde_json::Error> {
    let file: RosterFile = serde_json::from_str(contents)?;

    let mut seen = HashSet::with_capacity(file.list.len());
    let mut ids = Vec::with_capacity(file.list.len());
    for record in file.list {
        if seen.insert(record.city_code.clone()) {
            ids.push(record.city_code);
        } else {
            warn!(id = %record.city_code, "duplicate city code in roster ignored");
        }
    }

    Ok(ids)
}
