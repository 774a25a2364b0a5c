#![allow(dead_code)]

use taskhost::config::{ConfigFile, RawConfigFile};
use taskhost::errors::ServiceError;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn service_name(mut self, name: &str) -> Self {
        self.config.service.name = name.to_string();
        self
    }

    pub fn join_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.service.join_poll_interval_ms = ms;
        self
    }

    /// Raw `[options]` entry; the key is used exactly as given.
    pub fn option(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.config.options.insert(key.to_string(), value.into());
        self
    }

    pub fn try_build(self) -> Result<ConfigFile, ServiceError> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
