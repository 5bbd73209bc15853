//! In-process keyed lock table with secret-guarded, self-expiring locks

pub mod config;
pub mod error;
pub mod lock;
pub mod utils;

pub use config::LockerConfig;
pub use error::{LockerError, Result};
pub use lock::{ExpiringValue, Locker, Scheduler, TimerHandle};
