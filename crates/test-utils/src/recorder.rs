//! A task that records its lifecycle into a shared [`EventLog`].
//!
//! Events are plain strings:
//! - `init:Name`
//! - `saw:Name:Dep` / `missing:Name:Dep` for optional dependencies
//! - `run:Name` when the run-loop starts
//! - `hook:Name` when the stop hook is invoked
//! - `exit:Name` when the run-loop returns normally

use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskhost::errors::TaskError;
use taskhost::task::{RunLoop, StopHook, Task, TaskContext, TaskSpec};

/// Shared, ordered record of lifecycle events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events.lock().unwrap().iter().any(|e| e == event)
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.lock().unwrap().iter().position(|e| e == event)
    }

    /// Task names of events of one kind, in order, e.g. `with_kind("init")`.
    pub fn with_kind(&self, kind: &str) -> Vec<String> {
        let prefix = format!("{kind}:");
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }
}

/// What every recording task publishes during initialisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published(pub String);

#[derive(Debug, Clone)]
enum Init {
    Ok,
    Skip(String),
    Fatal(String),
}

#[derive(Debug, Clone, Copy)]
enum Body {
    UntilStopped,
    Return,
    Fail,
    Panic,
}

/// Builder for a recording task spec.
#[derive(Debug, Clone)]
pub struct Recording {
    name: String,
    log: EventLog,
    deps: Vec<String>,
    optional: Vec<String>,
    required: Vec<String>,
    init: Init,
    body: Body,
    cooperative: bool,
}

impl Recording {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            deps: Vec::new(),
            optional: Vec::new(),
            required: Vec::new(),
            init: Init::Ok,
            body: Body::UntilStopped,
            cooperative: false,
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.deps.push(dep.to_string());
        self
    }

    /// Depend on `dep` and record whether its export was there.
    pub fn uses(mut self, dep: &str) -> Self {
        self.deps.push(dep.to_string());
        self.optional.push(dep.to_string());
        self
    }

    /// Depend on `dep` and skip if its export is missing.
    pub fn requires(mut self, dep: &str) -> Self {
        self.deps.push(dep.to_string());
        self.required.push(dep.to_string());
        self
    }

    pub fn skip_on_init(mut self, reason: &str) -> Self {
        self.init = Init::Skip(reason.to_string());
        self
    }

    pub fn fail_on_init(mut self, msg: &str) -> Self {
        self.init = Init::Fatal(msg.to_string());
        self
    }

    /// Run-loop returns `Ok` right away.
    pub fn returns(mut self) -> Self {
        self.body = Body::Return;
        self
    }

    /// Run-loop returns an error right away.
    pub fn fails(mut self) -> Self {
        self.body = Body::Fail;
        self
    }

    pub fn panics(mut self) -> Self {
        self.body = Body::Panic;
        self
    }

    /// Run on the shared loop instead of a thread.
    pub fn on_loop(mut self) -> Self {
        self.cooperative = true;
        self
    }

    pub fn spec(self) -> TaskSpec {
        let mut spec = TaskSpec::new(self.name.clone(), {
            let cfg = self.clone();
            move || RecordingTask { cfg: cfg.clone() }
        });
        for dep in &self.deps {
            spec = spec.after(dep.clone());
        }
        if self.cooperative {
            spec = spec.on_loop();
        }
        spec
    }
}

struct RecordingTask {
    cfg: Recording,
}

impl Task for RecordingTask {
    fn initialize(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let cfg = &self.cfg;
        cfg.log.push(format!("init:{}", cfg.name));

        match &cfg.init {
            Init::Ok => {}
            Init::Skip(reason) => return Err(TaskError::skip(reason.clone())),
            Init::Fatal(msg) => return Err(TaskError::Fatal(anyhow::anyhow!(msg.clone()))),
        }

        for dep in &cfg.optional {
            let seen = ctx.dependency::<Published>(dep).is_some();
            let kind = if seen { "saw" } else { "missing" };
            cfg.log.push(format!("{kind}:{}:{dep}", cfg.name));
        }
        for dep in &cfg.required {
            ctx.require::<Published>(dep)?;
        }

        ctx.publish(Published(cfg.name.clone()));
        Ok(())
    }

    fn stop_hook(&self) -> Option<StopHook> {
        let log = self.cfg.log.clone();
        let name = self.cfg.name.clone();
        Some(Box::new(move || log.push(format!("hook:{name}"))))
    }

    fn run(self: Box<Self>, ctx: TaskContext) -> RunLoop {
        let Recording {
            name,
            log,
            body,
            cooperative,
            ..
        } = self.cfg;

        if cooperative {
            RunLoop::cooperative(async move {
                log.push(format!("run:{name}"));
                match body {
                    Body::UntilStopped => ctx.stop().cancelled().await,
                    Body::Return => {}
                    Body::Fail => anyhow::bail!("{name} failed"),
                    Body::Panic => panic!("{name} panicked"),
                }
                log.push(format!("exit:{name}"));
                Ok(())
            })
        } else {
            RunLoop::blocking(move || {
                log.push(format!("run:{name}"));
                match body {
                    Body::UntilStopped => {
                        while !ctx.stop().sleep(Duration::from_secs(60)) {}
                    }
                    Body::Return => {}
                    Body::Fail => anyhow::bail!("{name} failed"),
                    Body::Panic => panic!("{name} panicked"),
                }
                log.push(format!("exit:{name}"));
                Ok(())
            })
        }
    }
}
