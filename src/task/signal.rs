// src/task/signal.rs

//! Process-wide stop flag.
//!
//! The flag is set at most once and is read by every run-loop. It is paired
//! with a [`CancellationToken`] and a condition variable so that blocked
//! suspension points (timed sleeps on threads, async sleeps, queue receives,
//! permit acquisition) wake up as soon as the flag is set instead of at their
//! next scheduled wake-up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Inner {
    flag: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
    token: CancellationToken,
}

/// Cloneable handle to the shared stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns `true` only for the call that actually set it.
    pub fn trigger(&self) -> bool {
        if self.inner.flag.swap(true, Ordering::SeqCst) {
            return false;
        }

        // Notify under the lock so a sleeper between its flag check and its
        // wait cannot miss the wake-up.
        {
            let _guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.inner.cvar.notify_all();
        }
        self.inner.token.cancel();
        true
    }

    pub fn is_set(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Block the calling thread for up to `duration`.
    ///
    /// Returns `true` if the stop flag is set (possibly cutting the sleep
    /// short), `false` if the full duration elapsed. A duration too large to
    /// represent as a deadline sleeps until the flag is set.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if self.is_set() {
                return true;
            }

            guard = match deadline {
                None => self
                    .inner
                    .cvar
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.inner
                        .cvar
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Resolves once the flag is set.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// Async counterpart of [`StopSignal::sleep`].
    pub async fn sleep_async(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.inner.token.cancelled() => true,
            _ = tokio::time::sleep(duration) => self.is_set(),
        }
    }

    /// Token that is cancelled together with this signal.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }
}
