use anyhow::{Context, Result};
use citycast_core::{
    AggregationEngine, Config, LocationDirectory, LocationId, SnapshotCache, provider_from_config,
};
use clap::{Parser, Subcommand};
use inquire::{Password, Text};
use std::{path::PathBuf, sync::Arc};
use tracing::debug;

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "citycast", version, about = "Cached weather for a roster of cities")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key and an optional roster file.
    Configure,

    /// List the monitored city ids.
    Roster,

    /// Show current weather for one city id.
    Show {
        /// City id as known to OpenWeather, e.g. 1248991.
        id: String,

        /// Print the normalized snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show current weather for every city in the roster.
    All {
        /// Print the snapshots as JSON.
        #[arg(long)]
        json: bool,

        /// Also list cities that could not be fetched.
        #[arg(long)]
        report: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Roster => {
                let config = Config::load()?;
                let ids = LocationDirectory::from_config(&config).resolve().await?;
                output::print_roster(&ids);
                Ok(())
            }
            Command::Show { id, json } => {
                let engine = engine(&Config::load()?)?;
                let snapshot = engine.get_one(&LocationId::new(id)).await?;
                if json {
                    output::print_json(&snapshot)
                } else {
                    output::print_snapshot(&snapshot);
                    Ok(())
                }
            }
            Command::All { json, report } => {
                let engine = engine(&Config::load()?)?;
                let fan_out = engine.get_all_report().await?;
                if report {
                    output::print_failures(&fan_out.failed);
                }
                let snapshots = fan_out.into_result()?;

                if json {
                    output::print_json(&snapshots)?;
                } else {
                    for snapshot in &snapshots {
                        output::print_snapshot(snapshot);
                    }
                }
                Ok(())
            }
        }
    }
}

fn engine(config: &Config) -> Result<AggregationEngine> {
    let provider = provider_from_config(config)?;
    let directory = Arc::new(LocationDirectory::from_config(config));
    let cache = Arc::new(SnapshotCache::new(config.snapshot_ttl()));
    debug!(candidates = ?directory.candidates(), "engine ready");

    Ok(AggregationEngine::new(directory, provider, cache))
}

fn configure() -> Result<()> {
    // File values only; env overrides must not end up on disk.
    let mut config = Config::load_file()?;

    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    config.set_api_key(api_key.trim().to_string());

    let current = config.roster.path.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
    let roster = Text::new("Roster file (empty for defaults):")
        .with_default(&current)
        .prompt()
        .context("Failed to read roster path")?;
    config.roster.path = Some(roster.trim()).filter(|p| !p.is_empty()).map(PathBuf::from);

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}
