use crate::error::{LockerError, Result};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Work run when a deadline passes. Shared so a renewed timer can re-arm the same callback.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELED: u8 = 2;

// Deadlines too far out for `Instant` are clamped to this.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Handle to one armed deadline.
///
/// The deadline moves from pending to exactly one of fired or canceled. Whichever
/// of [`TimerHandle::cancel`] and the scheduler thread makes that move first wins.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    state: Arc<AtomicU8>,
    shared: Weak<Shared>,
}

impl TimerHandle {
    fn new(shared: &Arc<Shared>) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
            shared: Arc::downgrade(shared),
        }
    }

    /// Cancel the deadline.
    ///
    /// Returns `false` once the scheduler has claimed it, whether or not the
    /// callback has finished. A canceled deadline gives up its callback, and
    /// whatever that captured, within the next few cancellations.
    pub fn cancel(&self) -> bool {
        if self
            .state
            .compare_exchange(PENDING, CANCELED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if let Some(shared) = self.shared.upgrade() {
            shared.discard_canceled();
        }
        true
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    pub fn is_fired(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRED
    }

    fn claim(&self) -> bool {
        self.state
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct Deadline {
    at: Instant,
    seq: u64,
    handle: TimerHandle,
    callback: Callback,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    // Reversed: BinaryHeap is a max-heap and the earliest deadline must sit on top
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Queue {
    deadlines: BinaryHeap<Deadline>,
    next_seq: u64,
    // canceled deadlines still sitting in `deadlines`
    canceled: usize,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    wakeup: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compact the heap once canceled deadlines are at least as many as live ones
    fn discard_canceled(&self) {
        let mut queue = self.lock();
        queue.canceled += 1;

        if queue.canceled * 2 >= queue.deadlines.len() {
            queue.deadlines.retain(|deadline| deadline.handle.is_pending());
            queue.canceled = 0;
        }
    }
}

// Stops the timer thread once every Scheduler clone is gone.
struct ShutdownGuard {
    shared: Arc<Shared>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let mut queue = self.shared.lock();
        queue.shutdown = true;
        let discarded = std::mem::take(&mut queue.deadlines);
        drop(queue);
        self.shared.wakeup.notify_all();

        for deadline in &discarded {
            deadline.handle.cancel();
        }
    }
}

/// One-shot deadline scheduler backed by a single background thread.
///
/// Deadlines are claimed in order on that thread, and each claimed callback
/// then runs on a short-lived thread of its own, so a slow callback never
/// holds up later deadlines. A callback that panics is logged.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
    _guard: Arc<ShutdownGuard>,
}

impl Scheduler {
    /// Start the timer thread
    pub fn spawn(thread_name: &str) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                deadlines: BinaryHeap::new(),
                next_seq: 0,
                canceled: 0,
                shutdown: false,
            }),
            wakeup: Condvar::new(),
        });

        let worker = Arc::clone(&shared);
        // Detached: the thread exits on its own once shutdown is flagged
        let _detached = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || run(&worker))
            .map_err(LockerError::TimerSpawn)?;

        debug!("Timer thread started: {}", thread_name);

        Ok(Self {
            _guard: Arc::new(ShutdownGuard {
                shared: Arc::clone(&shared),
            }),
            shared,
        })
    }

    /// Arm a deadline `after` from now
    pub fn schedule(&self, after: Duration, callback: Callback) -> TimerHandle {
        let now = Instant::now();
        let at = now
            .checked_add(after)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let handle = TimerHandle::new(&self.shared);

        let mut queue = self.shared.lock();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.deadlines.push(Deadline {
            at,
            seq,
            handle: handle.clone(),
            callback,
        });
        drop(queue);

        self.shared.wakeup.notify_one();
        handle
    }

    /// Deadlines still queued, including canceled ones not yet compacted away
    pub fn queued(&self) -> usize {
        self.shared.lock().deadlines.len()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("queued", &self.queued())
            .finish()
    }
}

fn run(shared: &Shared) {
    let mut queue = shared.lock();

    loop {
        if queue.shutdown {
            break;
        }

        let now = Instant::now();
        let next_at = match queue.deadlines.peek() {
            Some(next) => next.at,
            None => {
                queue = shared
                    .wakeup
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            }
        };

        if next_at > now {
            queue = shared
                .wakeup
                .wait_timeout(queue, next_at - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            continue;
        }

        let Some(due) = queue.deadlines.pop() else {
            continue;
        };

        if !due.handle.claim() {
            queue.canceled = queue.canceled.saturating_sub(1);
            continue;
        }

        drop(queue);
        fire(due.callback);
        queue = shared.lock();
    }

    debug!("Timer thread stopped");
}

fn fire(callback: Callback) {
    let task = Arc::clone(&callback);
    let spawned = thread::Builder::new()
        .name("locker-expiry".to_string())
        .spawn(move || invoke(&task));

    if let Err(e) = spawned {
        warn!("Failed to spawn expiry thread, running callback inline: {}", e);
        invoke(&callback);
    }
}

fn invoke(callback: &Callback) {
    if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
        warn!("Timer callback panicked");
    }
}
