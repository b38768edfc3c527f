//! A thread-safe spy for testing callback-driven mpv scripts.
//!
//! Callbacks run on dispatcher threads, so asserting on them means waiting.
//! A [`Fence`] records every value its recorder sees and lets the test block
//! until enough calls have arrived.
//!
//! ```
//! use std::time::Duration;
//!
//! use mpv_ipc::Fence;
//!
//! let fence: Fence<i32> = Fence::new();
//! let mut record = fence.recorder();
//! std::thread::spawn(move || record(&7));
//!
//! assert_eq!(fence.wait(1, Duration::from_secs(5)), vec![7]);
//! ```

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// How long [`Fence::wait_default`] waits.
pub const DEFAULT_FENCE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Shared<T> {
    calls: Mutex<Vec<T>>,
    arrived: Condvar,
}

/// Records values from any thread and hands them back in arrival order.
#[derive(Debug)]
pub struct Fence<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Fence<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for Fence<T> {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                calls: Mutex::new(Vec::new()),
                arrived: Condvar::new(),
            }),
        }
    }
}

impl<T> Fence<T> {
    /// Creates an empty fence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.shared
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one call.
    pub fn record(&self, value: T) {
        self.lock().push(value);
        self.shared.arrived.notify_all();
    }

    /// Blocks until at least `runs` calls were recorded or `timeout` passes,
    /// then returns and forgets every recorded call.
    pub fn wait(&self, runs: usize, timeout: Duration) -> Vec<T> {
        let deadline = Instant::now() + timeout;
        let mut calls = self.lock();
        while calls.len() < runs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let (guard, _) = self
                .shared
                .arrived
                .wait_timeout(calls, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            calls = guard;
        }
        std::mem::take(&mut *calls)
    }

    /// [`Fence::wait`] for a single call with [`DEFAULT_FENCE_TIMEOUT`].
    pub fn wait_default(&self) -> Vec<T> {
        self.wait(1, DEFAULT_FENCE_TIMEOUT)
    }

    /// Forgets every recorded call.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl<T: Clone + Send + 'static> Fence<T> {
    /// A callback that records a clone of each value it is given.
    ///
    /// Fits every callback slot of [`Client`](crate::Client): pass
    /// `fence.recorder()` where a `FnMut(&T)` is expected.
    #[must_use]
    pub fn recorder(&self) -> impl FnMut(&T) + Send + use<T> {
        let fence = self.clone();
        move |value: &T| fence.record(value.clone())
    }
}
