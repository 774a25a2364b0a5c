// src/task/mod.rs

//! The task contract.
//!
//! A task goes through four phases driven by the service:
//!
//! 1. constructed by its [`TaskSpec`] factory (`Created`)
//! 2. [`Task::initialize`] acquires resources and resolves options; it may
//!    ask to be skipped (`Initialized`, or straight to `Stopped`)
//! 3. [`Task::run`] hands back the run-loop; its [`RunLoop`] variant decides
//!    the scheduling strategy: a dedicated thread or the shared cooperative
//!    loop (`Running`)
//! 4. on shutdown the service sets the stop flag, calls the task's
//!    [`StopHook`] if it has one, and waits for the run-loop to return
//!    (`Stopping` then `Stopped`)
//!
//! Execution patterns (periodic, queue consumer, poller, one-shot) live in
//! [`crate::patterns`] and are plain `Task` implementations.

pub mod context;
pub mod signal;
pub mod spec;

use std::fmt;

use futures::future::BoxFuture;

use crate::errors::TaskError;

pub use context::{Registry, TaskContext};
pub use signal::StopSignal;
pub use spec::{TaskSpec, short_type_name};

/// Extra unblocking work a task needs when a stop is requested.
///
/// Must be idempotent, non-blocking and callable from any thread.
pub type StopHook = Box<dyn Fn() + Send + Sync>;

/// A task's run-loop, tagged with where it must run.
pub enum RunLoop {
    /// Runs on a dedicated OS thread and may block freely.
    Blocking(Box<dyn FnOnce() -> anyhow::Result<()> + Send>),
    /// Runs on the shared cooperative loop; must only suspend at `.await`.
    Cooperative(BoxFuture<'static, anyhow::Result<()>>),
}

impl RunLoop {
    pub fn blocking<F>(f: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        RunLoop::Blocking(Box::new(f))
    }

    pub fn cooperative<F>(fut: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        RunLoop::Cooperative(Box::pin(fut))
    }

    pub fn is_cooperative(&self) -> bool {
        matches!(self, RunLoop::Cooperative(_))
    }
}

impl fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunLoop::Blocking(_) => f.write_str("RunLoop::Blocking"),
            RunLoop::Cooperative(_) => f.write_str("RunLoop::Cooperative"),
        }
    }
}

/// A unit of lifecycle-managed work.
pub trait Task: Send + 'static {
    /// Acquire resources and resolve configuration.
    ///
    /// Return [`TaskError::Skip`] to be excluded from the running set without
    /// failing the service.
    fn initialize(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let _ = ctx;
        Ok(())
    }

    /// Protocol-specific unblocking to perform when a stop is requested.
    ///
    /// Captured once, right before [`Task::run`].
    fn stop_hook(&self) -> Option<StopHook> {
        None
    }

    /// Consume the task and produce its run-loop.
    fn run(self: Box<Self>, ctx: TaskContext) -> RunLoop;
}
