// src/patterns/oneshot.rs

//! Closures as tasks: run once, then the task is done.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::task::{RunLoop, Task, TaskContext, TaskSpec};
use crate::types::TaskName;

type Body = Box<dyn FnOnce(&TaskContext) -> anyhow::Result<()> + Send>;
type HostedBody = Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Runs a closure once on a dedicated thread.
pub struct OneShot {
    body: Body,
}

impl OneShot {
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce(&TaskContext) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            body: Box::new(body),
        }
    }

    pub fn spec<F>(name: impl Into<TaskName>, body: F) -> TaskSpec
    where
        F: Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let body = Arc::new(body);
        TaskSpec::new(name, move || {
            let body = Arc::clone(&body);
            OneShot::new(move |ctx: &TaskContext| body(ctx))
        })
    }
}

impl Task for OneShot {
    fn run(self: Box<Self>, ctx: TaskContext) -> RunLoop {
        let body = self.body;
        RunLoop::blocking(move || body(&ctx))
    }
}

/// Runs a future once on the shared loop.
pub struct HostedOneShot {
    body: HostedBody,
}

impl HostedOneShot {
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            body: Box::new(move |ctx| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(body(ctx))
            }),
        }
    }

    /// Spec depending on the loop host.
    pub fn spec<F, Fut>(name: impl Into<TaskName>, body: F) -> TaskSpec
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let body = Arc::new(body);
        TaskSpec::new(name, move || {
            let body = Arc::clone(&body);
            HostedOneShot::new(move |ctx| body(ctx))
        })
        .on_loop()
    }
}

impl Task for HostedOneShot {
    fn run(self: Box<Self>, ctx: TaskContext) -> RunLoop {
        RunLoop::Cooperative((self.body)(ctx))
    }
}
