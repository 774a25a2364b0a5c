// src/engine/service.rs

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{Instrument, debug, error, info, warn};

use crate::config::{ConfigFile, Options, TaskOptions};
use crate::dag::{DependencyGraph, StartOrder};
use crate::engine::slot::TaskSlot;
use crate::errors::{Result, ServiceError, TaskError};
use crate::exec::{
    Completion, CompletionGuard, LOOP_HOST, LoopHandle, exit_from_outcome, spawn_thread,
};
use crate::task::{Registry, RunLoop, StopSignal, TaskContext, TaskSpec};
use crate::types::{TaskExit, TaskName, TaskState};

/// Slice length used while waiting for a task to stop, unless configured.
pub const DEFAULT_JOIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How every created task ended, in stop order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    exits: Vec<(TaskName, TaskExit)>,
}

impl StopReport {
    pub fn exits(&self) -> &[(TaskName, TaskExit)] {
        &self.exits
    }

    pub fn exit_of(&self, task: &str) -> Option<&TaskExit> {
        self.exits
            .iter()
            .find(|(name, _)| name == task)
            .map(|(_, exit)| exit)
    }

    /// No task failed, panicked or was abandoned.
    pub fn is_clean(&self) -> bool {
        self.exits.iter().all(|(_, exit)| exit.is_clean())
    }
}

/// A set of registered tasks and the orchestration around them.
///
/// Usage is register, then [`Service::start_all`] (or [`Service::run`]),
/// then [`Service::stop_all`]. Dropping a started service stops it.
pub struct Service {
    name: Arc<str>,
    join_poll_interval: Duration,
    options: Options,
    specs: Vec<TaskSpec>,
    graph: Option<DependencyGraph>,
    order: Option<StartOrder>,
    slots: Vec<TaskSlot>,
    stop: StopSignal,
    registry: Arc<Registry>,
    started: bool,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("join_poll_interval", &self.join_poll_interval)
            .field("specs", &self.specs)
            .field("slots", &self.slots)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            join_poll_interval: DEFAULT_JOIN_POLL_INTERVAL,
            options: Options::new(),
            specs: Vec::new(),
            graph: None,
            order: None,
            slots: Vec::new(),
            stop: StopSignal::new(),
            registry: Arc::new(Registry::new()),
            started: false,
        }
    }

    pub fn from_config(config: &ConfigFile) -> Self {
        Self::new(config.service.name.clone())
            .with_join_poll_interval(config.service.join_poll_interval())
            .with_options(config.options.clone())
    }

    /// Merge externally supplied option values; later values win.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options.merge(options);
        self
    }

    pub fn with_join_poll_interval(mut self, interval: Duration) -> Self {
        self.join_poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_task(mut self, spec: TaskSpec) -> Result<Self> {
        self.register(spec)?;
        Ok(self)
    }

    /// Add a task. Registration order is the tie-break for start order.
    pub fn register(&mut self, spec: TaskSpec) -> Result<()> {
        if self.started {
            return Err(ServiceError::Config(format!(
                "cannot register '{}' after the service has started",
                spec.name()
            )));
        }
        if self.specs.iter().any(|s| s.name() == spec.name()) {
            return Err(ServiceError::DuplicateTask(spec.name().to_string()));
        }

        debug!(
            service = %self.name,
            task = %spec.name(),
            deps = ?spec.dependencies(),
            "registered task"
        );
        self.specs.push(spec);
        self.graph = None;
        self.order = None;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn join_poll_interval(&self) -> Duration {
        self.join_poll_interval
    }

    /// Registered task names, in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name())
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Compute (and remember) the start order.
    ///
    /// Fails on unknown dependencies and cycles; nothing is constructed.
    pub fn resolve(&mut self) -> Result<StartOrder> {
        let graph = DependencyGraph::build(
            self.specs
                .iter()
                .map(|s| (s.name().to_string(), s.dependencies().to_vec())),
        )?;
        let order = graph.resolve()?;

        info!(service = %self.name, order = ?order.start(), "resolved start order");
        self.graph = Some(graph);
        self.order = Some(order.clone());
        Ok(order)
    }

    pub fn start_order(&self) -> Option<&StartOrder> {
        self.order.as_ref()
    }

    /// Options a task would see if it were initialised now.
    pub fn effective_options(&self, task: &str) -> Option<TaskOptions> {
        let spec = self.specs.iter().find(|s| s.name() == task)?;
        Some(self.options_for(spec))
    }

    /// Externally supplied option keys that no registered task reads.
    pub fn unclaimed_options(&self) -> Vec<&str> {
        self.options.unclaimed(self.specs.iter().map(|s| s.prefix()))
    }

    fn options_for(&self, spec: &TaskSpec) -> TaskOptions {
        let others: Vec<&str> = self
            .specs
            .iter()
            .filter(|s| s.name() != spec.name())
            .map(|s| s.prefix())
            .collect();
        TaskOptions::resolve_excluding(spec.prefix(), spec.defaults(), &self.options, &others)
    }

    /// Construct, initialise and launch every task in dependency order.
    ///
    /// A skipped task is marked `Stopped` and startup continues. A fatal
    /// initialisation or launch failure stops whatever is already running
    /// (in reverse order) and is returned.
    pub fn start_all(&mut self) -> Result<()> {
        if self.started {
            return Err(ServiceError::Config(format!(
                "service '{}' has already been started",
                self.name
            )));
        }

        let order = self.resolve()?;
        self.started = true;
        info!(service = %self.name, tasks = order.len(), "starting tasks");

        for name in order.start() {
            let mut slot = TaskSlot::new(name.clone());
            let result = self.bring_up(name, &mut slot);
            self.slots.push(slot);

            if let Err(err) = result {
                error!(
                    service = %self.name,
                    task = %name,
                    error = %err,
                    "startup failed; stopping tasks already running"
                );
                self.stop_all();
                return Err(err);
            }
        }

        info!(
            service = %self.name,
            running = ?self.running_tasks(),
            "startup complete"
        );
        Ok(())
    }

    fn bring_up(&self, name: &str, slot: &mut TaskSlot) -> Result<()> {
        let spec = self
            .specs
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| ServiceError::Config(format!("task '{name}' is not registered")))?;

        let options = self.options_for(spec);
        let ctx = TaskContext::new(
            Arc::clone(&self.name),
            name.to_string(),
            options,
            self.stop.clone(),
            Arc::clone(&self.registry),
        );

        let mut task = spec.create();
        match ctx.span().in_scope(|| task.initialize(&ctx)) {
            Ok(()) => slot.advance(TaskState::Initialized),
            Err(TaskError::Skip(reason)) => {
                self.registry.withdraw(name);
                let dependents = self
                    .graph
                    .as_ref()
                    .map(|g| g.dependents_of(name))
                    .unwrap_or_default();
                if dependents.is_empty() {
                    info!(task = %name, reason = %reason, "task skipped");
                } else {
                    warn!(
                        task = %name,
                        reason = %reason,
                        dependents = ?dependents,
                        "task skipped; dependents will run without it"
                    );
                }
                slot.mark_skipped(reason);
                return Ok(());
            }
            Err(TaskError::Fatal(source)) => {
                self.registry.withdraw(name);
                slot.mark_failed(format!("{source:#}"));
                return Err(ServiceError::TaskFailed {
                    task: name.to_string(),
                    source,
                });
            }
        }

        let stop_hook = task.stop_hook();
        let run_loop = ctx.span().in_scope(|| task.run(ctx.clone()));
        let cooperative = run_loop.is_cooperative();
        let completion = Completion::new();

        let launched = match run_loop {
            RunLoop::Blocking(body) => spawn_thread(&ctx, body, Arc::clone(&completion))
                .map(Some)
                .map_err(|e| ServiceError::TaskFailed {
                    task: name.to_string(),
                    source: anyhow::Error::new(e).context("spawning task thread"),
                }),
            RunLoop::Cooperative(future) => {
                hand_off(&self.registry, &ctx, future, Arc::clone(&completion)).map(|()| None)
            }
        };

        match launched {
            Ok(thread) => {
                slot.mark_running(stop_hook, completion, thread);
                info!(
                    task = %name,
                    mode = if cooperative { "loop" } else { "thread" },
                    "task running"
                );
                Ok(())
            }
            Err(err) => {
                self.registry.withdraw(name);
                slot.mark_failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Stop every started task in reverse start order and wait for each.
    ///
    /// The stop flag is set once up front, so every run-loop sees it at the
    /// same time; tasks are then visited one by one for their stop hooks and
    /// joined. Safe to call more than once.
    pub fn stop_all(&mut self) -> StopReport {
        if self.stop.trigger() {
            info!(service = %self.name, "stop requested; stopping tasks in reverse start order");
        }

        let poll = self.join_poll_interval;
        for slot in self.slots.iter_mut().rev() {
            slot.request_stop();
            slot.await_termination(poll);
        }

        let exits = self
            .slots
            .iter()
            .rev()
            .filter_map(|s| s.exit().map(|exit| (s.name().to_string(), exit.clone())))
            .collect();
        StopReport { exits }
    }

    /// Start everything, wait for `shutdown` (or for every task to exit on
    /// its own, or for the stop flag), then stop everything.
    ///
    /// Blocks the calling thread; must not be called from inside an async
    /// runtime.
    pub fn run<F>(&mut self, shutdown: F) -> Result<StopReport>
    where
        F: Future<Output = ()>,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        self.start_all()?;

        let completions: Vec<Arc<Completion>> = self
            .slots
            .iter()
            .filter_map(|s| s.completion().cloned())
            .collect();
        let stop = self.stop.clone();
        let poll = self.join_poll_interval;

        runtime.block_on(async {
            tokio::select! {
                _ = shutdown => info!("shutdown requested"),
                _ = stop.cancelled() => info!("stop flag set; shutting down"),
                _ = all_exited(&completions, poll) => info!("every task has exited"),
            }
        });

        Ok(self.stop_all())
    }

    /// Current lifecycle state of a registered task.
    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        if let Some(slot) = self.slots.iter().find(|s| s.name() == task) {
            return Some(slot.state());
        }
        self.specs
            .iter()
            .any(|s| s.name() == task)
            .then_some(TaskState::Created)
    }

    /// How a task's run-loop ended, if it has.
    pub fn exit_of(&self, task: &str) -> Option<TaskExit> {
        let slot = self.slots.iter().find(|s| s.name() == task)?;
        slot.exit()
            .cloned()
            .or_else(|| slot.completion().and_then(|c| c.exit()))
    }

    /// Tasks currently in the `Running` state, in start order.
    pub fn running_tasks(&self) -> Vec<TaskName> {
        self.slots
            .iter()
            .filter(|s| s.state() == TaskState::Running)
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Whether every launched run-loop has returned.
    pub fn all_exited(&self) -> bool {
        self.slots.iter().all(|s| s.has_exited())
    }

    /// Something a task published during initialisation.
    pub fn lookup<T>(&self, task: &str) -> Option<T>
    where
        T: std::any::Any + Send + Sync + Clone,
    {
        self.registry.lookup(task)
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        if self.slots.iter().any(|s| !s.state().is_terminal()) {
            warn!(service = %self.name, "service dropped with tasks still running; stopping them");
            self.stop_all();
        }
    }
}

/// Put a cooperative run-loop on the shared loop.
fn hand_off(
    registry: &Registry,
    ctx: &TaskContext,
    future: BoxFuture<'static, anyhow::Result<()>>,
    completion: Arc<Completion>,
) -> Result<()> {
    let task = ctx.name().to_string();
    let handle: LoopHandle = registry
        .lookup(LOOP_HOST)
        .ok_or_else(|| ServiceError::LoopHostUnavailable(task.clone()))?;

    let guard = CompletionGuard::new(completion);
    let name = task.clone();
    let wrapped = async move {
        let outcome = AssertUnwindSafe(future).catch_unwind().await;
        guard.finish(exit_from_outcome(&name, outcome));
    }
    .instrument(ctx.span().clone());

    handle
        .spawn(&task, wrapped)
        .map_err(|e| ServiceError::TaskFailed {
            task,
            source: e.into(),
        })
}

async fn all_exited(completions: &[Arc<Completion>], poll: Duration) {
    while !completions.iter().all(|c| c.is_done()) {
        tokio::time::sleep(poll).await;
    }
}
