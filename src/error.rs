use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MonitorError {
    #[error("Invalid window: {0}")]
    Window(#[from] WindowError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("lookback must be greater than zero")]
    ZeroLookback,
    #[error("bucket duration must be greater than zero")]
    ZeroBucket,
    #[error("bucket duration {bucket:?} is longer than lookback {lookback:?}")]
    BucketExceedsLookback { lookback: Duration, bucket: Duration },
    #[error("window needs {count} buckets, at most {max} are supported")]
    TooManyBuckets { count: u128, max: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{var} must be a whole number of milliseconds, got {value:?}")]
    InvalidEnv { var: &'static str, value: String },
    #[error(transparent)]
    Window(#[from] WindowError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Listener {0} is not registered")]
    ListenerNotFound(u64),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolQueryError {
    #[error("Usage of pool {pool} is unavailable: {reason}")]
    Unavailable { pool: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArenaError {
    #[error("Out of memory: requested {requested} bytes with {used} of {capacity} in use")]
    OutOfMemory {
        requested: u64,
        used: u64,
        capacity: u64,
    },
}

#[derive(Debug, Error)]
pub enum DemoError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode snapshot: {0}")]
    Json(#[from] serde_json::Error),
}
