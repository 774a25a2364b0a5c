// src/dag/mod.rs

//! Dependency graph over registered tasks.
//!
//! - [`graph`] holds the task dependency DAG and computes the start order
//!   (stop order is its exact reverse).

pub mod graph;

pub use graph::{DependencyGraph, StartOrder};
