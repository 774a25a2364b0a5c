// src/exec/completion.rs

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::types::TaskExit;

/// One-shot record of how a run-loop ended.
///
/// Set once by whichever backend ran the task, waited on by the service with
/// bounded timeouts.
#[derive(Debug, Default)]
pub struct Completion {
    exit: Mutex<Option<TaskExit>>,
    cvar: Condvar,
}

impl Completion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record the exit. The first call wins; returns whether this one did.
    pub fn finish(&self, exit: TaskExit) -> bool {
        let mut slot = self.exit.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(exit);
        self.cvar.notify_all();
        true
    }

    pub fn is_done(&self) -> bool {
        self.exit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn exit(&self) -> Option<TaskExit> {
        self.exit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait up to `timeout` for the run-loop to finish; `true` if it has.
    ///
    /// A timeout too large to represent as a deadline waits indefinitely.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.exit.lock().unwrap_or_else(PoisonError::into_inner);

        while slot.is_none() {
            slot = match deadline {
                None => self.cvar.wait(slot).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.cvar
                        .wait_timeout(slot, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        true
    }
}

/// Travels with a run-loop; records [`TaskExit::Abandoned`] if the run-loop
/// is dropped before it could report anything else.
#[derive(Debug)]
pub struct CompletionGuard {
    completion: Arc<Completion>,
}

impl CompletionGuard {
    pub fn new(completion: Arc<Completion>) -> Self {
        Self { completion }
    }

    pub fn finish(self, exit: TaskExit) {
        self.completion.finish(exit);
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.completion.finish(TaskExit::Abandoned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn first_exit_wins() {
        let c = Completion::new();
        assert!(c.finish(TaskExit::Returned));
        assert!(!c.finish(TaskExit::Failed("late".into())));
        assert_eq!(c.exit(), Some(TaskExit::Returned));
    }

    #[test]
    fn wait_times_out_then_sees_finish() {
        let c = Completion::new();
        assert!(!c.wait_timeout(Duration::from_millis(10)));

        let remote = Arc::clone(&c);
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.finish(TaskExit::Returned);
        });

        assert!(c.wait_timeout(Duration::from_secs(5)));
        t.join().unwrap();
    }

    #[test]
    fn unbounded_wait_returns_once_finished() {
        let c = Completion::new();
        c.finish(TaskExit::Returned);
        assert!(c.wait_timeout(Duration::MAX));

        let c = Completion::new();
        let remote = Arc::clone(&c);
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.finish(TaskExit::Returned);
        });
        assert!(c.wait_timeout(Duration::MAX));
        t.join().unwrap();
    }

    #[test]
    fn dropped_guard_marks_abandoned() {
        let c = Completion::new();
        drop(CompletionGuard::new(Arc::clone(&c)));
        assert_eq!(c.exit(), Some(TaskExit::Abandoned));

        let c = Completion::new();
        CompletionGuard::new(Arc::clone(&c)).finish(TaskExit::Returned);
        assert_eq!(c.exit(), Some(TaskExit::Returned));
    }
}
