/// Application name, used for the config file and environment prefix.
pub const APP_NAME: &str = "playbill";

/// Optional TOML config file read next to the working directory.
pub const CONFIG_FILE: &str = const_str::concat!(APP_NAME, ".toml");

/// Prefix for environment overrides, e.g. `PLAYBILL_TIMELINE__HORIZON_DAYS`.
pub const ENV_PREFIX: &str = "PLAYBILL";

/// Zone assumed for sequences authored without a TZID.
pub const DEFAULT_TZID: &str = "UTC";

/// Default look-ahead of a timeline window, in days.
pub const DEFAULT_HORIZON_DAYS: i64 = 7;

/// Default cap on occurrences pulled from the merge iterator for one window.
pub const DEFAULT_MAX_OCCURRENCES: u32 = 500;
