// src/exec/mod.rs

//! Execution backends.
//!
//! - [`completion`] tracks when a launched run-loop has actually returned.
//! - [`thread`] runs blocking run-loops on dedicated OS threads.
//! - [`loop_host`] owns the single shared cooperative scheduler and the
//!   thread-safe hand-off used to put work on it.
//!
//! Both backends report through the same [`Completion`], so the service can
//! wait for either kind of task the same way.

pub mod completion;
pub mod loop_host;
pub mod thread;

use std::any::Any;

use tracing::{error, info};

use crate::types::TaskExit;

pub use completion::{Completion, CompletionGuard};
pub use loop_host::{LOOP_HOST, LoopClosed, LoopHandle, LoopHost};
pub use thread::spawn_thread;

/// Turn the result of a (panic-guarded) run-loop into a [`TaskExit`],
/// logging anything that went wrong.
///
/// A failing or panicking run-loop only ends its own task; the rest of the
/// service keeps running.
pub fn exit_from_outcome(
    task: &str,
    outcome: std::thread::Result<anyhow::Result<()>>,
) -> TaskExit {
    match outcome {
        Ok(Ok(())) => {
            info!(task = %task, "run-loop returned");
            TaskExit::Returned
        }
        Ok(Err(err)) => {
            error!(task = %task, error = %format!("{err:#}"), "run-loop failed; task stopped");
            TaskExit::Failed(format!("{err:#}"))
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            error!(task = %task, panic = %msg, "run-loop panicked; task stopped");
            TaskExit::Panicked(msg)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_exits() {
        assert_eq!(exit_from_outcome("t", Ok(Ok(()))), TaskExit::Returned);
        assert_eq!(
            exit_from_outcome("t", Ok(Err(anyhow::anyhow!("boom")))),
            TaskExit::Failed("boom".to_string())
        );

        let payload = std::panic::catch_unwind(|| -> anyhow::Result<()> { panic!("kaput") });
        assert_eq!(
            exit_from_outcome("t", payload),
            TaskExit::Panicked("kaput".to_string())
        );
    }
}
