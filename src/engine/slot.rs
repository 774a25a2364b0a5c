// src/engine/slot.rs

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::exec::Completion;
use crate::task::StopHook;
use crate::types::{TaskExit, TaskName, TaskState};

/// Lifecycle bookkeeping for one created task.
pub(crate) struct TaskSlot {
    name: TaskName,
    state: TaskState,
    stop_hook: Option<StopHook>,
    completion: Option<Arc<Completion>>,
    thread: Option<JoinHandle<()>>,
    exit: Option<TaskExit>,
}

impl fmt::Debug for TaskSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSlot")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}

impl TaskSlot {
    pub(crate) fn new(name: TaskName) -> Self {
        Self {
            name,
            state: TaskState::Created,
            stop_hook: None,
            completion: None,
            thread: None,
            exit: None,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state
    }

    pub(crate) fn exit(&self) -> Option<&TaskExit> {
        self.exit.as_ref()
    }

    pub(crate) fn completion(&self) -> Option<&Arc<Completion>> {
        self.completion.as_ref()
    }

    /// Whether the run-loop has returned (or never existed).
    pub(crate) fn has_exited(&self) -> bool {
        self.completion.as_ref().is_none_or(|c| c.is_done())
    }

    pub(crate) fn advance(&mut self, next: TaskState) {
        if self.state.can_advance_to(next) {
            debug!(task = %self.name, from = %self.state, to = %next, "task state changed");
            self.state = next;
        } else {
            warn!(
                task = %self.name,
                from = %self.state,
                to = %next,
                "ignoring backwards state transition"
            );
        }
    }

    /// Excluded during initialisation; never launched.
    pub(crate) fn mark_skipped(&mut self, reason: String) {
        self.exit = Some(TaskExit::Skipped(reason));
        self.advance(TaskState::Stopped);
    }

    /// Failed before or during launch; never launched.
    pub(crate) fn mark_failed(&mut self, reason: String) {
        self.exit = Some(TaskExit::Failed(reason));
        self.advance(TaskState::Stopped);
    }

    pub(crate) fn mark_running(
        &mut self,
        stop_hook: Option<StopHook>,
        completion: Arc<Completion>,
        thread: Option<JoinHandle<()>>,
    ) {
        self.stop_hook = stop_hook;
        self.completion = Some(completion);
        self.thread = thread;
        self.advance(TaskState::Running);
    }

    /// Non-blocking stop request. Only meaningful while `Running`.
    pub(crate) fn request_stop(&mut self) {
        if self.state != TaskState::Running {
            return;
        }
        self.advance(TaskState::Stopping);
        if let Some(hook) = &self.stop_hook {
            debug!(task = %self.name, "invoking stop hook");
            hook();
        }
    }

    /// Block until the run-loop returns, waking every `poll` to report a
    /// task that is slow to stop.
    pub(crate) fn await_termination(&mut self, poll: Duration) {
        if self.state != TaskState::Stopping {
            return;
        }
        let Some(completion) = self.completion.clone() else {
            self.advance(TaskState::Stopped);
            return;
        };

        let started = Instant::now();
        let mut slices: u32 = 0;
        while !completion.wait_timeout(poll) {
            slices += 1;
            warn!(
                task = %self.name,
                waited_ms = started.elapsed().as_millis() as u64,
                slices,
                "task has not stopped yet; still waiting"
            );
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(task = %self.name, "task thread ended abnormally");
            }
        }

        self.exit = completion.exit();
        self.advance(TaskState::Stopped);
        info!(
            task = %self.name,
            exit = ?self.exit,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "task stopped"
        );
    }
}
