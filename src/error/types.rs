use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockerError {
    #[error("lock already exists")]
    LockExists,

    #[error("invalid key")]
    InvalidKey,

    #[error("invalid secret")]
    InvalidSecret,

    #[error("Invalid duration format '{input}': {message}")]
    InvalidDuration { input: String, message: String },

    #[error("Failed to start timer thread: {0}")]
    TimerSpawn(#[source] io::Error),
}

impl LockerError {
    /// The lock this call referred to no longer exists (never taken, released or expired).
    pub fn is_stale(&self) -> bool {
        matches!(self, LockerError::InvalidKey)
    }

    /// The lock exists but belongs to someone else.
    pub fn is_rejected(&self) -> bool {
        matches!(self, LockerError::LockExists | LockerError::InvalidSecret)
    }

    pub fn invalid_duration(input: impl Into<String>, message: impl Into<String>) -> Self {
        LockerError::InvalidDuration {
            input: input.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LockerError>;
