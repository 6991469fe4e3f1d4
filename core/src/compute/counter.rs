use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Join primitive for a group of scheduled tasks.
///
/// The scheduler increments the counter when a counted task is queued and
/// decrements it once the task has finished (or panicked). Waiting is
/// all-or-nothing: callers only ever observe "still running" or "zero".
///
/// Cloning a counter creates another handle to the same count.
///
/// # Example
///
/// ```
/// use nova_core::compute::{AtomicCounter, Priority, TaskScheduler};
///
/// let scheduler = TaskScheduler::new(2);
/// let counter = AtomicCounter::new();
/// for _ in 0..4 {
///     scheduler.spawn_counted(Priority::High, &counter, || {});
/// }
/// scheduler.wait_for_counter(&counter);
/// assert!(counter.is_zero());
/// ```
#[derive(Clone, Default)]
pub struct AtomicCounter {
    inner: Arc<CounterInner>,
}

#[derive(Default)]
struct CounterInner {
    value: AtomicUsize,
    lock: Mutex<()>,
    reached_zero: Condvar,
}

impl AtomicCounter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of unfinished tasks.
    pub fn value(&self) -> usize {
        self.inner.value.load(Ordering::Acquire)
    }

    /// Returns `true` once every counted task has finished.
    pub fn is_zero(&self) -> bool {
        self.value() == 0
    }

    pub(crate) fn increment(&self) {
        self.inner.value.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decrement(&self) {
        let previous = self.inner.value.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "AtomicCounter decremented below zero");
        if previous == 1 {
            // Taking the lock orders the notification after a waiter's check.
            let _guard = self.inner.lock.lock();
            self.inner.reached_zero.notify_all();
        }
    }

    /// Parks the calling thread until the counter reaches zero or `timeout`
    /// elapses. Returns whether the counter is zero.
    pub fn wait_zero_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.inner.lock.lock();
        if self.is_zero() {
            return true;
        }
        self.inner.reached_zero.wait_for(&mut guard, timeout);
        self.is_zero()
    }
}

impl std::fmt::Debug for AtomicCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicCounter")
            .field("value", &self.value())
            .finish()
    }
}
