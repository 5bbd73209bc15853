use super::timer::{Callback, Scheduler, TimerHandle};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A secret paired with a one-shot expiry deadline.
///
/// The deadline is armed as soon as the value is created. When it passes,
/// `on_expiry` runs once, off the caller's thread, unless the timer was
/// stopped or renewed first.
pub struct ExpiringValue<V> {
    secret: V,
    duration: Duration,
    timer: TimerHandle,
    on_expiry: Callback,
    scheduler: Scheduler,
}

impl<V> ExpiringValue<V> {
    /// Store `secret` and start a timer that calls `on_expiry` after `duration`
    pub fn new<F>(scheduler: &Scheduler, secret: V, duration: Duration, on_expiry: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let on_expiry: Callback = Arc::new(on_expiry);
        let timer = scheduler.schedule(duration, Arc::clone(&on_expiry));

        Self {
            secret,
            duration,
            timer,
            on_expiry,
            scheduler: scheduler.clone(),
        }
    }

    pub fn secret(&self) -> &V {
        &self.secret
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Cancel the pending deadline.
    ///
    /// `false` means `on_expiry` has already been claimed and will run (or has run).
    pub fn stop_timer(&self) -> bool {
        self.timer.cancel()
    }

    /// Re-arm the deadline a full `duration` from now.
    ///
    /// Only works while the current deadline is still pending. Once it has fired
    /// this returns `false` and leaves the value without a deadline.
    pub fn reset_timer(&mut self) -> bool {
        if !self.timer.cancel() {
            return false;
        }

        self.timer = self
            .scheduler
            .schedule(self.duration, Arc::clone(&self.on_expiry));

        true
    }

    /// Whether the current deadline has fired
    pub fn is_expired(&self) -> bool {
        self.timer.is_fired()
    }
}

impl<V> fmt::Debug for ExpiringValue<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // secret deliberately omitted
        f.debug_struct("ExpiringValue")
            .field("duration", &self.duration)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}
