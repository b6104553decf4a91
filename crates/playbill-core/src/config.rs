use anyhow::Result;
use chrono::TimeDelta;
use config::Config;
use serde::Deserialize;

use crate::constants::{
    CONFIG_FILE, DEFAULT_HORIZON_DAYS, DEFAULT_MAX_OCCURRENCES, DEFAULT_TZID, ENV_PREFIX,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub logging: LoggingConfig,
    pub timeline: TimelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimelineConfig {
    /// Zone used for sequences that carry no TZID of their own.
    pub default_tzid: String,
    pub horizon_days: i64,
    pub max_occurrences: usize,
}

impl TimelineConfig {
    /// ## Summary
    /// Returns the configured look-ahead as a duration.
    #[must_use]
    pub fn horizon(&self) -> TimeDelta {
        TimeDelta::try_days(self.horizon_days).unwrap_or(TimeDelta::MAX)
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            default_tzid: DEFAULT_TZID.to_string(),
            horizon_days: DEFAULT_HORIZON_DAYS,
            max_occurrences: usize::try_from(DEFAULT_MAX_OCCURRENCES).unwrap_or(usize::MAX),
        }
    }
}

impl Settings {
    /// ## Summary
    /// Loads configuration from environment variables and an optional `playbill.toml`.
    /// Environment variables take precedence over file values.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails.
    pub fn load() -> Result<Self> {
        Ok(Config::builder()
            .set_default("logging.level", "info")?
            .set_default("timeline.default_tzid", DEFAULT_TZID)?
            .set_default("timeline.horizon_days", DEFAULT_HORIZON_DAYS)?
            .set_default(
                "timeline.max_occurrences",
                i64::from(DEFAULT_MAX_OCCURRENCES),
            )?
            // TOML file
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            // Env
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Settings>()?)
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    Settings::load()
}
