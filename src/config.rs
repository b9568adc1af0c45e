//! Settings read from `SLOTGRID_*` environment variables.
//!
//! Every setting has a default; an unset or unparsable variable falls back
//! to it.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where WAL files live.
    /// Env: `SLOTGRID_DATA_DIR`. Default: `./data`.
    pub data_dir: PathBuf,

    /// Appends since the last compaction that trigger the next one.
    /// Env: `SLOTGRID_COMPACT_THRESHOLD`. Default: `1000`.
    pub compact_threshold: u64,

    /// How often the compactor checks the threshold.
    /// Env: `SLOTGRID_COMPACT_INTERVAL_SECS`. Default: `30`.
    pub compact_interval: Duration,

    /// Weeks a pattern is replicated forward when the caller doesn't say.
    /// Env: `SLOTGRID_REPLICATE_WEEKS`. Default: `12`.
    pub replicate_weeks: u32,

    /// Months ahead "weekends off" pins when the caller doesn't say.
    /// Env: `SLOTGRID_WEEKEND_HORIZON_MONTHS`. Default: `3`.
    pub weekend_horizon_months: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
            replicate_weeks: 12,
            weekend_horizon_months: 3,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any name → value source. `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("SLOTGRID_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: parse_or(
                &lookup,
                "SLOTGRID_COMPACT_THRESHOLD",
                defaults.compact_threshold,
            ),
            compact_interval: Duration::from_secs(parse_or(
                &lookup,
                "SLOTGRID_COMPACT_INTERVAL_SECS",
                defaults.compact_interval.as_secs(),
            )),
            replicate_weeks: parse_or(&lookup, "SLOTGRID_REPLICATE_WEEKS", defaults.replicate_weeks),
            weekend_horizon_months: parse_or(
                &lookup,
                "SLOTGRID_WEEKEND_HORIZON_MONTHS",
                defaults.weekend_horizon_months,
            ),
        }
    }

    /// WAL file for one named store, e.g. a tenant or an environment.
    pub fn wal_path(&self, name: &str) -> PathBuf {
        let safe: String = name
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        let safe = if safe.is_empty() { "default".to_string() } else { safe };
        self.data_dir.join(format!("{safe}.wal"))
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    lookup(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
