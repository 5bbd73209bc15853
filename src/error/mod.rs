mod types;

pub use types::{LockerError, Result};
