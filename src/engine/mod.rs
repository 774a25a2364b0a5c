// src/engine/mod.rs

//! Orchestration engine.
//!
//! - [`service`] owns the registered task specs, resolves them into a start
//!   order and drives every task through its lifecycle.
//! - [`slot`] is the per-task bookkeeping the service keeps once a task has
//!   been created (state, stop hook, completion).
//! - [`shutdown`] turns OS signals into a future usable with
//!   [`Service::run`].

pub mod service;
pub mod shutdown;
pub mod slot;

pub use service::{Service, StopReport};
pub use shutdown::wait_for_shutdown_signal;
