// src/patterns/periodic.rs

//! Fixed-interval re-invocation, thread-owned or loop-hosted.
//!
//! Both variants run the same algorithm: check the stop flag, time one
//! `execute`, sleep whatever is left of the interval (cut short by a stop),
//! repeat. Only the sleep primitive differs. An `execute` error ends the
//! task's run-loop.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tracing::trace;

use crate::errors::TaskError;
use crate::patterns::cadence::Cadence;
use crate::task::{RunLoop, Task, TaskContext, TaskSpec, short_type_name};

/// Work run by [`Periodic`] on its own thread.
pub trait PeriodicJob: Send + 'static {
    /// Used when no `interval` option is set.
    const INTERVAL: Duration = Duration::from_secs(1);

    fn initialize(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let _ = ctx;
        Ok(())
    }

    /// One iteration. May block.
    fn execute(&mut self, ctx: &TaskContext) -> anyhow::Result<()>;
}

/// Work run by [`AsyncPeriodic`] on the shared loop.
pub trait AsyncPeriodicJob: Send + 'static {
    const INTERVAL: Duration = Duration::from_secs(1);

    fn initialize(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let _ = ctx;
        Ok(())
    }

    /// One iteration. Must not block the loop thread.
    fn execute<'a>(&'a mut self, ctx: &'a TaskContext) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Thread-owned periodic task.
pub struct Periodic<J> {
    job: J,
    cadence: Option<Cadence>,
}

impl<J: PeriodicJob> Periodic<J> {
    pub fn new(job: J) -> Self {
        Self { job, cadence: None }
    }

    /// Spec named after the job type.
    pub fn spec() -> TaskSpec
    where
        J: Default,
    {
        TaskSpec::new(short_type_name::<J>(), || Periodic::new(J::default()))
    }
}

impl<J: PeriodicJob> Task for Periodic<J> {
    fn initialize(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let cadence = Cadence::from_options(ctx.options(), J::INTERVAL)?;
        self.job.initialize(ctx)?;
        self.cadence = Some(cadence);
        Ok(())
    }

    fn run(self: Box<Self>, ctx: TaskContext) -> RunLoop {
        let Periodic { mut job, cadence } = *self;
        let cadence = cadence.unwrap_or_else(|| Cadence::new(J::INTERVAL));

        RunLoop::blocking(move || {
            while !ctx.should_stop() {
                let started = Instant::now();
                job.execute(&ctx)?;

                let elapsed = started.elapsed();
                trace!(elapsed_ms = elapsed.as_millis() as u64, "iteration finished");
                if let Some(left) = cadence.remaining(elapsed) {
                    ctx.stop().sleep(left);
                }
            }
            Ok(())
        })
    }
}

/// Loop-hosted periodic task. Its spec depends on the loop host.
pub struct AsyncPeriodic<J> {
    job: J,
    cadence: Option<Cadence>,
}

impl<J: AsyncPeriodicJob> AsyncPeriodic<J> {
    pub fn new(job: J) -> Self {
        Self { job, cadence: None }
    }

    pub fn spec() -> TaskSpec
    where
        J: Default,
    {
        TaskSpec::new(short_type_name::<J>(), || AsyncPeriodic::new(J::default())).on_loop()
    }
}

impl<J: AsyncPeriodicJob> Task for AsyncPeriodic<J> {
    fn initialize(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let cadence = Cadence::from_options(ctx.options(), J::INTERVAL)?;
        self.job.initialize(ctx)?;
        self.cadence = Some(cadence);
        Ok(())
    }

    fn run(self: Box<Self>, ctx: TaskContext) -> RunLoop {
        let AsyncPeriodic { mut job, cadence } = *self;
        let cadence = cadence.unwrap_or_else(|| Cadence::new(J::INTERVAL));

        RunLoop::cooperative(async move {
            while !ctx.should_stop() {
                let started = Instant::now();
                job.execute(&ctx).await?;

                let elapsed = started.elapsed();
                trace!(elapsed_ms = elapsed.as_millis() as u64, "iteration finished");
                if let Some(left) = cadence.remaining(elapsed) {
                    ctx.stop().sleep_async(left).await;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskOptions;
    use std::sync::{Arc, Mutex};

    struct Stamp {
        at: Arc<Mutex<Vec<Instant>>>,
        limit: usize,
    }

    impl PeriodicJob for Stamp {
        const INTERVAL: Duration = Duration::from_millis(20);

        fn execute(&mut self, ctx: &TaskContext) -> anyhow::Result<()> {
            let mut at = self.at.lock().unwrap();
            at.push(Instant::now());
            if at.len() >= self.limit {
                ctx.stop().trigger();
            }
            Ok(())
        }
    }

    #[test]
    fn thread_variant_stops_at_top_of_iteration() {
        let at = Arc::new(Mutex::new(Vec::new()));
        let ctx = TaskContext::detached("Stamp", TaskOptions::empty("Stamp"));
        let mut task = Box::new(Periodic::new(Stamp {
            at: Arc::clone(&at),
            limit: 3,
        }));
        task.initialize(&ctx).unwrap();

        let RunLoop::Blocking(body) = task.run(ctx) else {
            panic!("expected a thread-owned run-loop");
        };
        body().unwrap();

        let at = at.lock().unwrap();
        assert_eq!(at.len(), 3);
        assert!(at[1] - at[0] >= Duration::from_millis(15));
    }

    struct Failing;

    impl PeriodicJob for Failing {
        fn execute(&mut self, _ctx: &TaskContext) -> anyhow::Result<()> {
            anyhow::bail!("upstream unavailable")
        }
    }

    #[test]
    fn execute_error_ends_the_run_loop() {
        let ctx = TaskContext::detached("Failing", TaskOptions::empty("Failing"));
        let task = Box::new(Periodic::new(Failing));
        let RunLoop::Blocking(body) = task.run(ctx) else {
            panic!("expected a thread-owned run-loop");
        };
        let err = body().unwrap_err();
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[derive(Default)]
    struct Noop;

    impl AsyncPeriodicJob for Noop {
        fn execute<'a>(&'a mut self, _ctx: &'a TaskContext) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async { anyhow::Ok(()) })
        }
    }

    #[test]
    fn async_variant_spec_depends_on_loop() {
        let spec = AsyncPeriodic::<Noop>::spec();
        assert_eq!(spec.name(), "Noop");
        assert_eq!(spec.dependencies(), &[crate::exec::LOOP_HOST]);
    }
}
