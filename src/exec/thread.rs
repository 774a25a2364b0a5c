// src/exec/thread.rs

//! Thread-owned execution: one OS thread per task.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::exec::completion::{Completion, CompletionGuard};
use crate::exec::exit_from_outcome;
use crate::task::TaskContext;

/// Spawn a dedicated thread named `service.task` running `body`.
///
/// The body runs inside the task's span; its result (or panic) is recorded
/// in `completion` before the thread exits.
pub fn spawn_thread(
    ctx: &TaskContext,
    body: Box<dyn FnOnce() -> anyhow::Result<()> + Send>,
    completion: Arc<Completion>,
) -> std::io::Result<JoinHandle<()>> {
    let span = ctx.span().clone();
    let task = ctx.name().to_string();

    thread::Builder::new()
        .name(ctx.logger_name())
        .spawn(move || {
            let guard = CompletionGuard::new(completion);
            let outcome = span.in_scope(|| {
                debug!(task = %task, "thread-owned run-loop starting");
                catch_unwind(AssertUnwindSafe(body))
            });
            guard.finish(exit_from_outcome(&task, outcome));
        })
}
