use anyhow::{Context, Result};
use citycast_core::{LocationId, WeatherError, WeatherSnapshot};
use serde::Serialize;

pub fn print_roster(ids: &[LocationId]) {
    for id in ids {
        println!("{id}");
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

pub fn print_snapshot(s: &WeatherSnapshot) {
    let name = if s.name.is_empty() {
        "(unnamed)"
    } else {
        s.name.as_str()
    };

    println!("{name} [{}]", s.id);
    println!("  {}", s.weather);
    println!(
        "  Temperature: {} (min {}, max {})",
        with_unit(s.temp, "°C"),
        with_unit(s.temp_min, "°C"),
        with_unit(s.temp_max, "°C"),
    );
    println!("  Pressure:    {}", with_unit(s.pressure, " hPa"));
    println!("  Humidity:    {}", with_unit(s.humidity, "%"));
    println!("  Visibility:  {}", with_unit(s.visibility, " m"));
    println!(
        "  Wind:        {} at {}",
        with_unit(s.wind.speed, " m/s"),
        with_unit(s.wind.deg, "°")
    );
    println!("  Sunrise:     {}", clock(s.sunrise_utc()));
    println!("  Sunset:      {}", clock(s.sunset_utc()));
    println!();
}

pub fn print_failures(failed: &[(LocationId, WeatherError)]) {
    if failed.is_empty() {
        return;
    }
    eprintln!("{} location(s) could not be fetched:", failed.len());
    for (id, err) in failed {
        eprintln!("  {id}: {err}");
    }
}

fn with_unit(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{v}{unit}"),
        None => "n/a".to_string(),
    }
}

fn clock(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map(|t| t.format("%H:%M UTC").to_string()).unwrap_or_else(|| "n/a".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_unit_formats_missing_values() {
        assert_eq!(with_unit(Some(12.5), "°C"), "12.5°C");
        assert_eq!(with_unit(None, "°C"), "n/a");
    }

    #[test]
    fn clock_formats_utc() {
        let t = chrono::DateTime::from_timestamp(1_700_000_000, 0);
        assert_eq!(clock(t), "22:13 UTC");
        assert_eq!(clock(None), "n/a");
    }
}
