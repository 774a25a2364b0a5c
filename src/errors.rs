// src/errors.rs

//! Crate-wide error types.
//!
//! - [`ServiceError`] covers everything that stops a service from starting
//!   or being configured: bad config, unresolvable dependency graphs, fatal
//!   task initialisation.
//! - [`TaskError`] is what a single task reports from `initialize`: either a
//!   non-fatal [`TaskError::Skip`] or a [`TaskError::Fatal`] failure.

use thiserror::Error;

use crate::types::TaskName;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Task registered more than once: {0}")]
    DuplicateTask(TaskName),

    #[error("task '{task}' depends on unregistered task '{dependency}'")]
    UnknownDependency {
        task: TaskName,
        dependency: TaskName,
    },

    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    #[error("task '{task}' failed to start: {source}")]
    TaskFailed {
        task: TaskName,
        #[source]
        source: anyhow::Error,
    },

    #[error("task '{0}' is loop-hosted but no running LoopHost is available")]
    LoopHostUnavailable(TaskName),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Outcome of a failed `Task::initialize`.
#[derive(Error, Debug)]
pub enum TaskError {
    /// Exclude this task from the running set without failing the service.
    #[error("task skipped: {0}")]
    Skip(String),

    /// Abort service startup.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl TaskError {
    pub fn skip(reason: impl Into<String>) -> Self {
        TaskError::Skip(reason.into())
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, TaskError::Skip(_))
    }
}

impl From<ServiceError> for TaskError {
    fn from(err: ServiceError) -> Self {
        TaskError::Fatal(anyhow::Error::new(err))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ServiceError>;
