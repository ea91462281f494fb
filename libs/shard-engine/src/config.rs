use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;

/// Timing knobs of the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// How often the shard topology is re-checked.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay before the next fetch when a shard's last page was empty.
    /// A non-empty page is followed by an immediate fetch.
    #[serde(default = "default_fetch_interval_ms")]
    pub fetch_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    15_000
}
fn default_fetch_interval_ms() -> u64 {
    3_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            fetch_interval_ms: default_fetch_interval_ms(),
        }
    }
}

impl EngineConfig {
    pub fn new(poll_interval: Duration, fetch_interval: Duration) -> Self {
        Self {
            poll_interval_ms: millis(poll_interval),
            fetch_interval_ms: millis(fetch_interval),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.poll_interval_ms == 0 {
            return Err(EngineError::Config("poll_interval_ms must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
