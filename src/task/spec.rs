// src/task/spec.rs

use std::collections::BTreeMap;
use std::fmt;

use crate::exec::loop_host::LOOP_HOST;
use crate::task::Task;
use crate::types::TaskName;

type Factory = Box<dyn Fn() -> Box<dyn Task> + Send + Sync>;

/// Static description of a task registered with a service.
///
/// A spec is everything the orchestrator needs *before* any task exists:
/// name, dependencies, option namespace and defaults, and a factory that
/// constructs the task in its `Created` state.
pub struct TaskSpec {
    name: TaskName,
    deps: Vec<TaskName>,
    option_prefix: Option<String>,
    defaults: BTreeMap<String, toml::Value>,
    factory: Factory,
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .field("option_prefix", &self.option_prefix)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl TaskSpec {
    /// Register a task under an explicit name.
    pub fn new<T, F>(name: impl Into<TaskName>, factory: F) -> Self
    where
        T: Task,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            deps: Vec::new(),
            option_prefix: None,
            defaults: BTreeMap::new(),
            factory: Box::new(move || Box::new(factory()) as Box<dyn Task>),
        }
    }

    /// Register a task named after its concrete type.
    pub fn of<T>() -> Self
    where
        T: Task + Default,
    {
        Self::new(short_type_name::<T>(), T::default)
    }

    /// Declare a dependency on another task by name.
    pub fn after(mut self, dep: impl Into<TaskName>) -> Self {
        let dep = dep.into();
        if !self.deps.contains(&dep) {
            self.deps.push(dep);
        }
        self
    }

    /// Declare a dependency on a task registered with [`TaskSpec::of`].
    pub fn after_task<T: 'static>(self) -> Self {
        self.after(short_type_name::<T>())
    }

    /// Declare a dependency on the shared cooperative loop.
    ///
    /// Every task whose run-loop is cooperative needs this, so the loop is
    /// running before the task launches and stops only after it.
    pub fn on_loop(self) -> Self {
        self.after(LOOP_HOST)
    }

    /// Resolve options under `prefix` instead of the task name.
    pub fn option_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.option_prefix = Some(prefix.into());
        self
    }

    /// Static default for an option, used unless overridden externally.
    pub fn with_default(mut self, option: &str, value: impl Into<toml::Value>) -> Self {
        self.defaults.insert(option.to_string(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[TaskName] {
        &self.deps
    }

    pub fn prefix(&self) -> &str {
        self.option_prefix.as_deref().unwrap_or(&self.name)
    }

    pub fn defaults(&self) -> &BTreeMap<String, toml::Value> {
        &self.defaults
    }

    pub(crate) fn create(&self) -> Box<dyn Task> {
        (self.factory)()
    }
}

/// Last path segment of a type name, without generic arguments.
///
/// `my_app::tasks::Heartbeat` becomes `Heartbeat`.
pub fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
