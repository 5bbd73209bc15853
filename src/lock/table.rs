use super::timer::Scheduler;
use super::value::ExpiringValue;
use crate::config::LockerConfig;
use crate::error::{LockerError, Result};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use tracing::{debug, warn};

type OnExpire = Box<dyn FnOnce() + Send + 'static>;

struct Entry<V> {
    // distinguishes this lease from a later one on the same key
    id: u64,
    value: ExpiringValue<V>,
}

struct Inner<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    next_id: AtomicU64,
    scheduler: Scheduler,
    config: LockerConfig,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash,
{
    fn read(&self) -> RwLockReadGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop `key` only if it still holds the lease that expired
    fn remove_expired(&self, key: &K, id: u64) {
        let mut entries = self.write();
        if entries.get(key).map(|entry| entry.id) == Some(id) {
            entries.remove(key);
            debug!("Lock expired and removed (lease {})", id);
        } else {
            debug!("Expired lease {} already replaced or released", id);
        }
    }
}

/// Looks up `key` and checks its secret in one step
fn verify<'a, K, V>(
    entries: &'a mut HashMap<K, Entry<V>>,
    key: &K,
    secret: &V,
) -> Result<&'a mut Entry<V>>
where
    K: Eq + Hash,
    V: PartialEq,
{
    let entry = entries.get_mut(key).ok_or(LockerError::InvalidKey)?;
    if entry.value.secret() != secret {
        return Err(LockerError::InvalidSecret);
    }
    Ok(entry)
}

/// A table of secret-guarded locks that release themselves after a timeout.
///
/// A key is locked while it has an entry. Acquisition fails fast with
/// [`LockerError::LockExists`] instead of waiting. Releasing or renewing a
/// lock requires the secret it was taken with.
///
/// Cloning yields another handle to the same table. Each table runs one
/// timer thread, which stops when the last handle is dropped.
pub struct Locker<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Locker<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Locker<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: PartialEq + Send + Sync + 'static,
{
    pub fn new() -> Result<Self> {
        Self::with_config(LockerConfig::new())
    }

    pub fn with_config(config: LockerConfig) -> Result<Self> {
        let scheduler = Scheduler::spawn(&config.thread_name)?;

        Ok(Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                scheduler,
                config,
            }),
        })
    }

    pub fn config(&self) -> &LockerConfig {
        &self.inner.config
    }

    /// Whether `key` is currently locked
    pub fn status(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Number of keys currently locked
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock `key` for `duration` unless it is already locked
    pub fn lock(&self, key: K, secret: V, duration: Duration) -> Result<()> {
        self.insert(key, secret, duration, None)
    }

    /// Like [`Locker::lock`], using the configured default duration
    pub fn lock_default(&self, key: K, secret: V) -> Result<()> {
        let duration = self.inner.config.default_duration;
        self.insert(key, secret, duration, None)
    }

    /// Like [`Locker::lock`], calling `on_expire` if the lock times out.
    ///
    /// `on_expire` runs on its own thread before the key is released, so a slow
    /// callback holds only this key. It is not called when the lock is unlocked
    /// or removed first.
    pub fn lock_with_expiry<F>(
        &self,
        key: K,
        secret: V,
        duration: Duration,
        on_expire: F,
    ) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.insert(key, secret, duration, Some(Box::new(on_expire)))
    }

    fn insert(
        &self,
        key: K,
        secret: V,
        duration: Duration,
        on_expire: Option<OnExpire>,
    ) -> Result<()> {
        let mut entries = self.inner.write();

        if entries.contains_key(&key) {
            debug!("Lock rejected, key already locked");
            return Err(LockerError::LockExists);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let on_expiry =
            expiry_callback(Arc::downgrade(&self.inner), key.clone(), id, on_expire);
        let value = ExpiringValue::new(&self.inner.scheduler, secret, duration, on_expiry);

        entries.insert(key, Entry { id, value });
        debug!("Lock acquired (lease {}, duration {:?})", id, duration);

        Ok(())
    }

    /// Release `key` if `secret` matches the one it was locked with
    pub fn unlock(&self, key: &K, secret: &V) -> Result<bool> {
        let mut entries = self.inner.write();
        let entry = verify(&mut *entries, key, secret)?;

        // Proceeds even if the deadline already fired; the stale callback finds
        // its lease gone and leaves the table alone.
        entry.value.stop_timer();
        let id = entry.id;
        entries.remove(key);
        debug!("Lock released (lease {})", id);

        Ok(true)
    }

    /// Renew `key` for another full duration from now
    ///
    /// Returns `Ok(false)` if the lock has already timed out; the entry may
    /// still be visible until its expiry callback removes it.
    pub fn reset(&self, key: &K, secret: &V) -> Result<bool> {
        let mut entries = self.inner.write();
        let entry = verify(&mut *entries, key, secret)?;

        let renewed = entry.value.reset_timer();
        if renewed {
            debug!("Lock renewed (lease {})", entry.id);
        } else {
            debug!("Lock renewal too late (lease {})", entry.id);
        }

        Ok(renewed)
    }

    /// Remove `key` regardless of its secret.
    ///
    /// Never fails and is safe to repeat; the return value only says whether a
    /// lock was present. The lock's expiry callback will not run.
    pub fn remove(&self, key: &K) -> bool {
        match self.inner.write().remove(key) {
            Some(entry) => {
                entry.value.stop_timer();
                debug!("Lock removed (lease {})", entry.id);
                true
            }
            None => false,
        }
    }
}

/// Builds the closure a lease's timer runs: the caller's callback, then removal.
///
/// Holds the table weakly so pending timers never keep a dropped table alive.
fn expiry_callback<K, V>(
    table: Weak<Inner<K, V>>,
    key: K,
    id: u64,
    on_expire: Option<OnExpire>,
) -> impl Fn() + Send + Sync + 'static
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    // The timer may re-arm this closure on renewal but fires it at most once.
    let on_expire = Mutex::new(on_expire);

    move || {
        let callback = on_expire
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(callback) = callback {
            if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
                warn!("Expiry callback panicked (lease {}); releasing lock anyway", id);
            }
        }

        if let Some(inner) = table.upgrade() {
            inner.remove_expired(&key, id);
        }
    }
}

impl<K, V> fmt::Debug for Locker<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let locked = self
            .inner
            .entries
            .read()
            .map(|entries| entries.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len());

        f.debug_struct("Locker")
            .field("locked", &locked)
            .field("config", &self.inner.config)
            .finish()
    }
}
