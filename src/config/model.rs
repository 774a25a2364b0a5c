// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::config::options::Options;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [service]
/// name = "taskhost"
/// join_poll_interval_ms = 500
///
/// [options]
/// Heartbeat_interval = 2.0
/// "EchoQueue-concurrency" = 2
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Service-wide behaviour from `[service]`.
    #[serde(default)]
    pub service: ServiceSection,

    /// Pre-resolved task options from `[options]`, keyed by
    /// `<prefix>_<option>` (hyphens are accepted in place of underscores).
    #[serde(default)]
    pub options: toml::Table,
}

/// `[service]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    /// Service name; prefixes every task logger and thread name.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// How long a single wait slice lasts while joining a task at shutdown.
    ///
    /// Each elapsed slice without the task finishing produces a diagnostic.
    #[serde(default = "default_join_poll_interval_ms")]
    pub join_poll_interval_ms: u64,
}

fn default_service_name() -> String {
    "taskhost".to_string()
}

fn default_join_poll_interval_ms() -> u64 {
    500
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            join_poll_interval_ms: default_join_poll_interval_ms(),
        }
    }
}

impl ServiceSection {
    pub fn join_poll_interval(&self) -> Duration {
        Duration::from_millis(self.join_poll_interval_ms)
    }
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` (see `validate.rs`) or
/// [`ConfigFile::default`].
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub service: ServiceSection,
    pub options: Options,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(service: ServiceSection, options: Options) -> Self {
        Self { service, options }
    }

    /// Apply `KEY=VALUE` overrides on top of the file's `[options]`.
    pub fn with_overrides(mut self, overrides: Options) -> Self {
        self.options.merge(overrides);
        self
    }
}
