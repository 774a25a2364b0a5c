// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod demo;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod patterns;
pub mod task;
pub mod types;

use std::path::Path;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, Options, default_config_path, load_and_validate};
use crate::engine::{Service, wait_for_shutdown_signal};

pub use crate::engine::StopReport;
pub use crate::errors::{ServiceError, TaskError};
pub use crate::exec::{LOOP_HOST, LoopHandle, LoopHost};
pub use crate::task::{RunLoop, StopHook, StopSignal, Task, TaskContext, TaskSpec};
pub use crate::types::{TaskExit, TaskName, TaskState};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and `--set` overrides
/// - the demo service
/// - OS signal handling
///
/// Blocks until a shutdown signal arrives (or every task has exited), then
/// stops all tasks in reverse start order.
pub fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let overrides = Options::from_assignments(args.set.iter().map(String::as_str))?;
    let mut cfg = cfg.with_overrides(overrides);
    if let Some(name) = args.name {
        cfg.service.name = name;
    }

    let mut service = demo::service(&cfg)?;
    for key in service.unclaimed_options() {
        warn!(key = %key, "option does not belong to any registered task; ignored");
    }

    if args.dry_run {
        print_dry_run(&mut service)?;
        return Ok(());
    }

    let report = service.run(async {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "failed to listen for shutdown signals");
            std::future::pending::<()>().await;
        }
    })?;

    if report.is_clean() {
        info!("all tasks stopped cleanly");
    } else {
        warn!(exits = ?report.exits(), "some tasks did not stop cleanly");
    }
    Ok(())
}

/// Explicit path must exist; the default path is optional.
fn load_config(path: Option<&str>) -> Result<ConfigFile> {
    if let Some(path) = path {
        return Ok(load_and_validate(path)?);
    }

    let default = default_config_path();
    if Path::new(&default).exists() {
        Ok(load_and_validate(&default)?)
    } else {
        debug!(path = %default.display(), "no config file; using defaults");
        Ok(ConfigFile::default())
    }
}

/// Print start/stop order and every task's effective options.
fn print_dry_run(service: &mut Service) -> Result<()> {
    let order = service.resolve()?;

    println!("taskhost dry-run");
    println!("  service.name = {}", service.name());
    println!(
        "  service.join_poll_interval_ms = {}",
        service.join_poll_interval().as_millis()
    );
    println!();

    println!("start order ({}):", order.len());
    for (i, name) in order.start().iter().enumerate() {
        println!("  {}. {name}", i + 1);
        if let Some(options) = service.effective_options(name) {
            for (key, value) in options.iter() {
                println!("      {key} = {value}");
            }
        }
    }
    println!();
    println!("stop order: {}", order.stop().join(" -> "));

    debug!("dry-run complete (nothing started)");
    Ok(())
}
