// src/task/context.rs

//! Per-task runtime context and the export registry used for dependency
//! lookups.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{Span, debug, info_span};

use crate::config::TaskOptions;
use crate::errors::TaskError;
use crate::task::signal::StopSignal;
use crate::types::TaskName;

type Export = Arc<dyn Any + Send + Sync>;

/// Typed handles published by live tasks, keyed by publishing task.
///
/// A task publishes whatever its dependents need to talk to it (a loop
/// handle, a queue sender, a cached value). A skipped task never publishes,
/// so its dependents simply find nothing.
#[derive(Default)]
pub struct Registry {
    exports: RwLock<HashMap<(TaskName, TypeId), Export>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exports = self.exports.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&str> = exports.keys().map(|(name, _)| name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        f.debug_struct("Registry").field("tasks", &names).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish<T>(&self, task: &str, value: T)
    where
        T: Any + Send + Sync,
    {
        let mut exports = self.exports.write().unwrap_or_else(PoisonError::into_inner);
        exports.insert((task.to_string(), TypeId::of::<T>()), Arc::new(value));
    }

    pub fn lookup<T>(&self, task: &str) -> Option<T>
    where
        T: Any + Send + Sync + Clone,
    {
        let exports = self.exports.read().unwrap_or_else(PoisonError::into_inner);
        exports
            .get(&(task.to_string(), TypeId::of::<T>()))
            .and_then(|export| export.downcast_ref::<T>())
            .cloned()
    }

    /// Drop everything `task` published.
    pub fn withdraw(&self, task: &str) {
        let mut exports = self.exports.write().unwrap_or_else(PoisonError::into_inner);
        exports.retain(|(name, _), _| name != task);
    }
}

/// Everything a task can see about its environment.
///
/// Cheap to clone; handed to `initialize` by reference and to `run` by value.
#[derive(Debug, Clone)]
pub struct TaskContext {
    service: Arc<str>,
    name: TaskName,
    options: Arc<TaskOptions>,
    stop: StopSignal,
    registry: Arc<Registry>,
    span: Span,
}

impl TaskContext {
    pub(crate) fn new(
        service: Arc<str>,
        name: TaskName,
        options: TaskOptions,
        stop: StopSignal,
        registry: Arc<Registry>,
    ) -> Self {
        let span = info_span!("task", service = %service, task = %name);
        Self {
            service,
            name,
            options: Arc::new(options),
            stop,
            registry,
            span,
        }
    }

    /// A context that is not attached to any service.
    ///
    /// Useful for driving a task's logic directly, e.g. in tests.
    pub fn detached(name: impl Into<TaskName>, options: TaskOptions) -> Self {
        Self::new(
            Arc::from("detached"),
            name.into(),
            options,
            StopSignal::new(),
            Arc::new(Registry::new()),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// `service.task`; used for thread names and diagnostics.
    pub fn logger_name(&self) -> String {
        format!("{}.{}", self.service, self.name)
    }

    pub fn options(&self) -> &TaskOptions {
        &self.options
    }

    pub fn stop(&self) -> &StopSignal {
        &self.stop
    }

    pub fn should_stop(&self) -> bool {
        self.stop.is_set()
    }

    /// Tracing span scoped to this task for its whole lifetime.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Make `value` available to dependents under this task's name.
    pub fn publish<T>(&self, value: T)
    where
        T: Any + Send + Sync,
    {
        debug!(task = %self.name, export = std::any::type_name::<T>(), "published export");
        self.registry.publish(&self.name, value);
    }

    /// Look up something a dependency published.
    ///
    /// Returns `None` when the dependency was skipped or never published a
    /// value of that type; callers that can run without it should use this.
    pub fn dependency<T>(&self, task: &str) -> Option<T>
    where
        T: Any + Send + Sync + Clone,
    {
        self.registry.lookup(task)
    }

    /// Like [`TaskContext::dependency`], but an absent dependency skips the
    /// calling task as well.
    pub fn require<T>(&self, task: &str) -> Result<T, TaskError>
    where
        T: Any + Send + Sync + Clone,
    {
        self.dependency(task).ok_or_else(|| {
            TaskError::skip(format!("required dependency '{task}' is not available"))
        })
    }
}
