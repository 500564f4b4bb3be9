use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;

use crate::models::Config;
use crate::schedule;

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    validate(&config)?;
    Ok(config)
}

/// Reject bad weekdays, times and timezones at startup so workers never
/// trip over them mid-cycle.
fn validate(config: &Config) -> Result<()> {
    config
        .service
        .timezone
        .parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {}", config.service.timezone, e))?;

    if config.users.is_empty() {
        bail!("No users configured");
    }

    for user in &config.users {
        for pref in &user.preferences {
            if schedule::parse_weekday(&pref.weekday).is_none() {
                bail!(
                    "{}: unknown weekday '{}' in {} preference",
                    user.name,
                    pref.weekday,
                    pref.class_type
                );
            }
            for time in &pref.times {
                schedule::parse_time_of_day(time).with_context(|| {
                    format!(
                        "{}: bad time '{}' in {} preference",
                        user.name, time, pref.class_type
                    )
                })?;
            }
        }
    }
    Ok(())
}
