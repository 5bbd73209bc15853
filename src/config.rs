use crate::error::Result;
use crate::utils::parse_duration;
use std::env;
use std::time::Duration;

/// Environment variable read by [`LockerConfig::from_env`].
pub const DEFAULT_DURATION_ENV: &str = "LOCKER_DEFAULT_DURATION";

#[derive(Debug, Clone)]
pub struct LockerConfig {
    /// Name given to the table's timer thread
    pub thread_name: String,
    /// Lease used by `Locker::lock_default`
    pub default_duration: Duration,
}

impl LockerConfig {
    pub fn new() -> Self {
        Self {
            thread_name: "locker-timer".to_string(),
            default_duration: Duration::from_secs(30),
        }
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = duration;
        self
    }

    /// Defaults, overridden by `LOCKER_DEFAULT_DURATION` (e.g. "500ms", "30s") when set.
    pub fn from_env() -> Result<Self> {
        let config = Self::new();
        match env::var(DEFAULT_DURATION_ENV) {
            Ok(raw) => Ok(config.with_default_duration(parse_duration(&raw)?)),
            Err(_) => Ok(config),
        }
    }
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self::new()
    }
}
