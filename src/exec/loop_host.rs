// src/exec/loop_host.rs

//! The shared cooperative loop.
//!
//! [`LoopHost`] is an ordinary task: registered like any other, started
//! before everything that depends on it and stopped after. While running it
//! owns a single-threaded tokio runtime on its own OS thread. Other threads
//! put work on it only through the [`LoopHandle`] it publishes, which
//! marshals every request over a channel.

use std::fmt;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::TaskError;
use crate::task::{RunLoop, StopHook, Task, TaskContext};
use crate::types::TaskName;

/// Registered name of the loop host task.
pub const LOOP_HOST: &str = "LoopHost";

enum LoopCommand {
    Spawn {
        task: TaskName,
        future: BoxFuture<'static, ()>,
    },
    Stop,
}

impl fmt::Debug for LoopCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopCommand::Spawn { task, .. } => f.debug_struct("Spawn").field("task", task).finish(),
            LoopCommand::Stop => f.write_str("Stop"),
        }
    }
}

/// The loop no longer accepts work.
#[derive(Debug, Clone, Copy, Error)]
#[error("cooperative loop is no longer accepting work")]
pub struct LoopClosed;

/// Thread-safe hand-off to the cooperative loop.
///
/// Published by [`LoopHost`] during initialisation; look it up with
/// `ctx.dependency::<LoopHandle>(LOOP_HOST)`.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    tx: mpsc::UnboundedSender<LoopCommand>,
}

impl LoopHandle {
    /// Schedule `future` on the loop. Callable from any thread.
    pub fn spawn<F>(&self, task: &str, future: F) -> Result<(), LoopClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tx
            .send(LoopCommand::Spawn {
                task: task.to_string(),
                future: Box::pin(future),
            })
            .map_err(|_| LoopClosed)
    }

    /// Ask the loop to finish its current work and return.
    ///
    /// Nothing handed off after this runs.
    pub fn request_stop(&self) {
        if self.tx.send(LoopCommand::Stop).is_err() {
            debug!("loop already gone; stop request ignored");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Task that owns and drives the cooperative loop.
#[derive(Default)]
pub struct LoopHost {
    runtime: Option<Runtime>,
    rx: Option<mpsc::UnboundedReceiver<LoopCommand>>,
    handle: Option<LoopHandle>,
}

impl Task for LoopHost {
    fn initialize(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name(ctx.logger_name())
            .build()
            .map_err(|e| TaskError::Fatal(anyhow::Error::new(e).context("building loop runtime")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = LoopHandle { tx };
        ctx.publish(handle.clone());

        self.runtime = Some(runtime);
        self.rx = Some(rx);
        self.handle = Some(handle);
        Ok(())
    }

    fn stop_hook(&self) -> Option<StopHook> {
        let handle = self.handle.clone()?;
        Some(Box::new(move || handle.request_stop()))
    }

    fn run(self: Box<Self>, _ctx: TaskContext) -> RunLoop {
        let LoopHost { runtime, rx, .. } = *self;

        RunLoop::blocking(move || {
            let (Some(runtime), Some(rx)) = (runtime, rx) else {
                anyhow::bail!("loop host started without being initialised");
            };

            info!("cooperative loop running");
            runtime.block_on(serve(rx));
            info!("cooperative loop drained");
            Ok(())
        })
    }
}

/// Accept hand-offs until a stop is requested, then wait for everything
/// already on the loop to return.
async fn serve(mut rx: mpsc::UnboundedReceiver<LoopCommand>) {
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut stopping = false;

    loop {
        tokio::select! {
            cmd = rx.recv(), if !stopping => match cmd {
                Some(LoopCommand::Spawn { task, future }) => {
                    debug!(task = %task, "scheduling cooperative run-loop");
                    tasks.spawn(future);
                }
                Some(LoopCommand::Stop) | None => {
                    info!(
                        in_flight = tasks.len(),
                        "stop requested; draining cooperative run-loops"
                    );
                    stopping = true;
                    rx.close();
                }
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(err) = joined {
                    warn!(error = %err, "cooperative run-loop did not complete");
                }
            }
            else => break,
        }
    }

    // Anything queued behind the stop request is dropped unrun.
    while let Ok(cmd) = rx.try_recv() {
        if let LoopCommand::Spawn { task, .. } = cmd {
            warn!(task = %task, "dropping run-loop handed off after stop");
        }
    }
}
