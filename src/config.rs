//! Monitor configuration.
//!
//! ## Environment Variables
//!
//! - `HEAP_PRESSURE_LOOKBACK_MS`: trailing window for GC overhead (default: 10000)
//! - `HEAP_PRESSURE_SAMPLE_MS`: bucket granularity of that window (default: 2000)
use crate::{
    error::{ConfigError, WindowError},
    window,
};
use serde::{Deserialize, Serialize};
use std::{env, time::Duration};

pub const LOOKBACK_ENV: &str = "HEAP_PRESSURE_LOOKBACK_MS";
pub const SAMPLE_ENV: &str = "HEAP_PRESSURE_SAMPLE_MS";

const DEFAULT_LOOKBACK_MS: u64 = 10_000;
const DEFAULT_SAMPLE_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub lookback_ms: u64,
    pub sample_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            lookback_ms: DEFAULT_LOOKBACK_MS,
            sample_interval_ms: DEFAULT_SAMPLE_MS,
        }
    }
}

impl MonitorConfig {
    pub fn new(lookback: Duration, sample_interval: Duration) -> Self {
        Self {
            lookback_ms: u64::try_from(lookback.as_millis()).unwrap_or(u64::MAX),
            sample_interval_ms: u64::try_from(sample_interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Defaults overridden by whichever environment variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = parse_ms(LOOKBACK_ENV, lookup(LOOKBACK_ENV))? {
            config.lookback_ms = ms;
        }
        if let Some(ms) = parse_ms(SAMPLE_ENV, lookup(SAMPLE_ENV))? {
            config.sample_interval_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn lookback(&self) -> Duration {
        Duration::from_millis(self.lookback_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Same checks as [`WindowedSum::new`](crate::window::WindowedSum::new).
    pub fn validate(&self) -> Result<(), WindowError> {
        window::bucket_count(self.lookback(), self.sample_interval()).map(|_| ())
    }
}

fn parse_ms(var: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    match value {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value: v }),
    }
}
