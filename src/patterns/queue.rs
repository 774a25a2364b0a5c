// src/patterns/queue.rs

//! Bounded-concurrency consumption of submitted work.
//!
//! The buffer holds at most `C` unstarted items and at most `C` handlers run
//! at once, where `C` is the task's `concurrency` option. Producers are
//! pushed back (block, or get [`SubmitError::Full`]) as soon as `C` items
//! are waiting, even if none of them has started yet.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, error, info, warn};

use crate::errors::{ServiceError, TaskError};
use crate::task::{RunLoop, Task, TaskContext, TaskSpec, short_type_name};

/// Processes one work item at a time; many may run concurrently.
pub trait WorkHandler: Send + Sync + 'static {
    type Item: Send + 'static;

    /// Used when no `concurrency` option is set.
    const CONCURRENCY: usize = 4;

    fn initialize(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let _ = ctx;
        Ok(())
    }

    /// Handle one item. A failure is logged; the consumer keeps going.
    fn handle(self: Arc<Self>, item: Self::Item) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// Why an item was not accepted. The item is handed back.
#[derive(PartialEq, Eq)]
pub enum SubmitError<T> {
    Full(T),
    Closed(T),
}

impl<T> SubmitError<T> {
    pub fn into_inner(self) -> T {
        match self {
            SubmitError::Full(item) | SubmitError::Closed(item) => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, SubmitError::Full(_))
    }
}

impl<T> fmt::Debug for SubmitError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Full(_) => f.write_str("Full(..)"),
            SubmitError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for SubmitError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Full(_) => f.write_str("work queue is full"),
            SubmitError::Closed(_) => f.write_str("work queue consumer has stopped"),
        }
    }
}

impl<T> std::error::Error for SubmitError<T> {}

/// Producer side of a [`QueueConsumer`], published under the consumer's
/// task name.
pub struct QueueHandle<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for QueueHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> fmt::Debug for QueueHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueHandle")
            .field("capacity", &self.tx.max_capacity())
            .field("free", &self.tx.capacity())
            .finish()
    }
}

impl<T: Send + 'static> QueueHandle<T> {
    /// Enqueue, waiting for space.
    pub async fn submit(&self, item: T) -> Result<(), SubmitError<T>> {
        self.tx
            .send(item)
            .await
            .map_err(|e| SubmitError::Closed(e.0))
    }

    /// Enqueue from an OS thread, blocking it until there is space.
    ///
    /// Panics if called from within an async runtime; use
    /// [`QueueHandle::submit`] there.
    pub fn submit_blocking(&self, item: T) -> Result<(), SubmitError<T>> {
        self.tx
            .blocking_send(item)
            .map_err(|e| SubmitError::Closed(e.0))
    }

    /// Enqueue only if there is space right now.
    pub fn try_submit(&self, item: T) -> Result<(), SubmitError<T>> {
        self.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(item) => SubmitError::Full(item),
            mpsc::error::TrySendError::Closed(item) => SubmitError::Closed(item),
        })
    }

    /// Maximum number of waiting items.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Loop-hosted consumer with at most `concurrency` handlers in flight.
pub struct QueueConsumer<H: WorkHandler> {
    handler: H,
    concurrency: usize,
    rx: Option<mpsc::Receiver<H::Item>>,
}

impl<H: WorkHandler> QueueConsumer<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            concurrency: H::CONCURRENCY,
            rx: None,
        }
    }

    /// Spec named after the handler type, depending on the loop host.
    pub fn spec() -> TaskSpec
    where
        H: Default,
    {
        TaskSpec::new(short_type_name::<H>(), || QueueConsumer::new(H::default())).on_loop()
    }
}

impl<H: WorkHandler> Task for QueueConsumer<H> {
    fn initialize(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let requested = ctx
            .options()
            .get_or::<i64>("concurrency", H::CONCURRENCY as i64)?;
        // Both the permit pool and the channel buffer are sized from this.
        self.concurrency = usize::try_from(requested)
            .ok()
            .filter(|n| (1..=Semaphore::MAX_PERMITS).contains(n))
            .ok_or_else(|| {
                ServiceError::Config(format!(
                    "option '{}' must be between 1 and {} (got {requested})",
                    ctx.options().key_for("concurrency"),
                    Semaphore::MAX_PERMITS
                ))
            })?;

        self.handler.initialize(ctx)?;

        let (tx, rx) = mpsc::channel(self.concurrency);
        ctx.publish(QueueHandle::<H::Item> { tx });
        self.rx = Some(rx);
        debug!(concurrency = self.concurrency, "work queue ready");
        Ok(())
    }

    fn run(self: Box<Self>, ctx: TaskContext) -> RunLoop {
        let QueueConsumer {
            handler,
            concurrency,
            rx,
        } = *self;

        RunLoop::cooperative(async move {
            let Some(rx) = rx else {
                anyhow::bail!("queue consumer started without being initialised");
            };
            consume(Arc::new(handler), rx, concurrency, ctx).await
        })
    }
}

async fn consume<H: WorkHandler>(
    handler: Arc<H>,
    mut rx: mpsc::Receiver<H::Item>,
    concurrency: usize,
    ctx: TaskContext,
) -> anyhow::Result<()> {
    let permits = Arc::new(Semaphore::new(concurrency));
    let mut in_flight: JoinSet<anyhow::Result<()>> = JoinSet::new();
    let stop = ctx.stop().clone();

    loop {
        while let Some(done) = in_flight.try_join_next() {
            log_item_outcome(done);
        }
        if stop.is_set() {
            break;
        }

        let permit = tokio::select! {
            _ = stop.cancelled() => break,
            permit = Arc::clone(&permits).acquire_owned() => permit?,
        };

        let item = tokio::select! {
            _ = stop.cancelled() => break,
            item = rx.recv() => match item {
                Some(item) => item,
                None => {
                    debug!("every producer is gone");
                    break;
                }
            },
        };

        let handler = Arc::clone(&handler);
        in_flight.spawn(
            async move {
                let _permit = permit;
                handler.handle(item).await
            }
            .instrument(ctx.span().clone()),
        );
    }

    rx.close();
    let unstarted = rx.len();
    if unstarted > 0 {
        warn!(unstarted, "dropping queued work items on stop");
    }

    if !in_flight.is_empty() {
        info!(in_flight = in_flight.len(), "waiting for in-flight work items");
    }
    while let Some(done) = in_flight.join_next().await {
        log_item_outcome(done);
    }
    Ok(())
}

fn log_item_outcome(outcome: Result<anyhow::Result<()>, JoinError>) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %format!("{err:#}"), "work item failed"),
        Err(err) => error!(error = %err, "work item panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Options, TaskOptions};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Sink;

    impl WorkHandler for Sink {
        type Item = u32;
        const CONCURRENCY: usize = 2;

        fn handle(self: Arc<Self>, _item: u32) -> BoxFuture<'static, anyhow::Result<()>> {
            Box::pin(async { anyhow::Ok(()) })
        }
    }

    #[test]
    fn buffer_capacity_equals_concurrency() {
        let ctx = TaskContext::detached("Sink", TaskOptions::empty("Sink"));
        let mut consumer = QueueConsumer::new(Sink);
        consumer.initialize(&ctx).unwrap();

        let handle: QueueHandle<u32> = ctx.dependency("Sink").unwrap();
        assert_eq!(handle.capacity(), 2);
        handle.try_submit(1).unwrap();
        handle.try_submit(2).unwrap();
        let err = handle.try_submit(3).unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_inner(), 3);
    }

    #[test]
    fn concurrency_option_is_validated() {
        let overrides = Options::new().with("Sink_concurrency", 0);
        let opts = TaskOptions::resolve("Sink", &BTreeMap::new(), &overrides);
        let ctx = TaskContext::detached("Sink", opts);
        let err = QueueConsumer::new(Sink).initialize(&ctx).unwrap_err();
        assert!(!err.is_skip());
        assert!(err.to_string().contains("Sink_concurrency"));
    }

    #[test]
    fn concurrency_beyond_permit_limit_is_rejected() {
        for value in [i64::MAX, Semaphore::MAX_PERMITS as i64 + 1] {
            let overrides = Options::new().with("Sink_concurrency", value);
            let opts = TaskOptions::resolve("Sink", &BTreeMap::new(), &overrides);
            let ctx = TaskContext::detached("Sink", opts);
            let err = QueueConsumer::new(Sink).initialize(&ctx).unwrap_err();
            assert!(!err.is_skip());
            assert!(err.to_string().contains("between 1 and"), "{err}");
            assert!(ctx.dependency::<QueueHandle<u32>>("Sink").is_none());
        }

        let overrides = Options::new().with("Sink_concurrency", Semaphore::MAX_PERMITS as i64);
        let opts = TaskOptions::resolve("Sink", &BTreeMap::new(), &overrides);
        let ctx = TaskContext::detached("Sink", opts);
        let mut consumer = QueueConsumer::new(Sink);
        consumer.initialize(&ctx).unwrap();
        assert_eq!(consumer.concurrency, Semaphore::MAX_PERMITS);
    }
}
