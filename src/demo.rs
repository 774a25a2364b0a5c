// src/demo.rs

//! Demonstration tasks wired up by the `taskhost` binary.
//!
//! - `LoopHost`: the shared cooperative loop.
//! - `EchoQueue`: loop-hosted queue consumer that logs each item.
//! - `Heartbeat`: thread-owned periodic producer feeding `EchoQueue`.
//! - `ClockPoller`: persisted poller over a coarse wall clock.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::engine::Service;
use crate::errors::{Result, TaskError};
use crate::exec::LoopHost;
use crate::patterns::{
    Fetch, Periodic, PeriodicJob, Poller, QueueConsumer, QueueHandle, WorkHandler,
};
use crate::task::{TaskContext, TaskSpec};

/// Logs every submitted line after a short pause.
#[derive(Debug, Default)]
pub struct EchoQueue;

impl WorkHandler for EchoQueue {
    type Item = String;

    fn handle(self: Arc<Self>, item: String) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            info!(item = %item, "echo");
            anyhow::Ok(())
        })
    }
}

/// Counts beats and hands each one to `EchoQueue` when it is running.
#[derive(Debug, Default)]
pub struct Heartbeat {
    beats: u64,
    queue: Option<QueueHandle<String>>,
}

impl PeriodicJob for Heartbeat {
    const INTERVAL: Duration = Duration::from_secs(1);

    fn initialize(&mut self, ctx: &TaskContext) -> std::result::Result<(), TaskError> {
        self.queue = ctx.dependency("EchoQueue");
        if self.queue.is_none() {
            info!("EchoQueue is not running; beats will only be logged");
        }
        Ok(())
    }

    fn execute(&mut self, _ctx: &TaskContext) -> anyhow::Result<()> {
        self.beats += 1;
        info!(beat = self.beats, "heartbeat");

        if let Some(queue) = &self.queue {
            if let Err(err) = queue.submit_blocking(format!("beat {}", self.beats)) {
                debug!(error = %err, "beat not queued");
            }
        }
        Ok(())
    }
}

/// Wall clock truncated to ten-second buckets, so changes are visible but
/// infrequent.
#[derive(Debug, Default)]
pub struct ClockPoller;

impl Fetch for ClockPoller {
    type Value = u64;

    const INTERVAL: Duration = Duration::from_secs(1);

    fn fetch(&mut self, _ctx: &TaskContext) -> anyhow::Result<u64> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
        Ok(now.as_secs() / 10 * 10)
    }

    fn on_value_changed(&mut self, old: Option<&u64>, new: &u64) {
        info!(?old, new, "clock bucket changed");
    }
}

/// The demo service, configured from `config`.
pub fn service(config: &ConfigFile) -> Result<Service> {
    let mut service = Service::from_config(config);

    service.register(TaskSpec::of::<LoopHost>())?;
    service.register(QueueConsumer::<EchoQueue>::spec())?;
    service.register(Periodic::<Heartbeat>::spec().after("EchoQueue"))?;
    service.register(Poller::<ClockPoller>::spec().with_default("persist", true))?;

    Ok(service)
}
