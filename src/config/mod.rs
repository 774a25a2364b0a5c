// src/config/mod.rs

//! Configuration loading and validation for taskhost.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants (`validate.rs`).
//! - Resolve namespaced task options (`options.rs`).

pub mod loader;
pub mod model;
pub mod options;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, RawConfigFile, ServiceSection};
pub use options::{FlagStyle, Options, TaskOptions, normalize_key};
