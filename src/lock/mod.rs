mod table;
pub mod timer;
mod value;

pub use table::Locker;
pub use timer::{Callback, Scheduler, TimerHandle};
pub use value::ExpiringValue;
