// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::config::options::Options;
use crate::errors::{Result, ServiceError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ServiceError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_service_section(&raw)?;
        let options = collect_options(raw.options)?;
        Ok(ConfigFile::new_unchecked(raw.service, options))
    }
}

fn validate_service_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.service.name.trim().is_empty() {
        return Err(ServiceError::Config(
            "[service].name must not be empty".to_string(),
        ));
    }

    if cfg.service.join_poll_interval_ms == 0 {
        return Err(ServiceError::Config(
            "[service].join_poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn collect_options(table: toml::Table) -> Result<Options> {
    let mut options = Options::new();

    for (key, value) in table {
        if key.trim().is_empty() {
            return Err(ServiceError::Config(
                "[options] contains an empty key".to_string(),
            ));
        }
        if let toml::Value::Table(_) = value {
            return Err(ServiceError::Config(format!(
                "[options].{key} must be a scalar or array, not a table"
            )));
        }
        options.set(&key, value);
    }

    Ok(options)
}
