// src/types.rs

use std::fmt;

/// Canonical task name type used throughout the crate.
pub type TaskName = String;

/// Lifecycle state every task moves through.
///
/// Transitions are strictly forward:
/// `Created -> Initialized -> Running -> Stopping -> Stopped`.
/// A task may jump straight to `Stopped` (skipped during initialisation, or
/// its launch failed), but it never re-enters an earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskState {
    Created,
    Initialized,
    Running,
    Stopping,
    Stopped,
}

impl TaskState {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_advance_to(self, next: TaskState) -> bool {
        next > self
    }

    pub fn is_terminal(self) -> bool {
        self == TaskState::Stopped
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Created => "created",
            TaskState::Initialized => "initialized",
            TaskState::Running => "running",
            TaskState::Stopping => "stopping",
            TaskState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// How a task's run-loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExit {
    /// The run-loop returned `Ok(())`.
    Returned,
    /// The run-loop returned an error.
    Failed(String),
    /// The run-loop panicked.
    Panicked(String),
    /// The run-loop was handed to a scheduler that dropped it before it ran.
    Abandoned,
    /// Excluded during initialisation.
    Skipped(String),
}

impl TaskExit {
    pub fn is_clean(&self) -> bool {
        matches!(self, TaskExit::Returned | TaskExit::Skipped(_))
    }
}
