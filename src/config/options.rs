// src/config/options.rs

//! Namespaced task options.
//!
//! Every task resolves its options under `<prefix>_<option>`, where the
//! prefix is the task name unless the task's spec overrides it. Externally
//! supplied values ([`Options`]) are merged over the task's registered defaults
//! exactly once, when the task is initialised, producing an immutable
//! [`TaskOptions`] snapshot.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use crate::errors::{Result, ServiceError};

/// Normalise an externally supplied option key.
///
/// Leading dashes are stripped and GNU-style hyphens become underscores, so
/// `--Heartbeat-interval`, `Heartbeat-interval` and `Heartbeat_interval` all
/// name the same option.
pub fn normalize_key(key: &str) -> String {
    key.trim().trim_start_matches('-').replace('-', "_")
}

/// Build the namespaced key for `option` under `prefix`.
///
/// Both halves are normalised; the option name is also lowercased, so
/// `Heartbeat-Interval` and `Heartbeat_interval` name the same option.
pub fn namespaced_key(prefix: &str, option: &str) -> String {
    format!(
        "{}_{}",
        normalize_key(prefix),
        normalize_key(option).to_lowercase()
    )
}

/// The option name `key` refers to under `prefix`, if it belongs there.
fn option_under<'k>(prefix: &str, key: &'k str) -> Option<&'k str> {
    key.strip_prefix(normalize_key(prefix).as_str())?
        .strip_prefix('_')
        .filter(|option| !option.is_empty())
}

/// Spelling conventions for external command-line flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagStyle {
    /// `--Task-option`
    Gnu,
    /// `--Task_option`
    Underscore,
    /// Both of the above.
    Mixed,
}

impl FlagStyle {
    /// Flag spellings accepted for a namespaced option key, sorted.
    pub fn flag_names(self, key: &str) -> Vec<String> {
        let key = normalize_key(key);
        let mut names = Vec::new();
        if matches!(self, FlagStyle::Gnu | FlagStyle::Mixed) {
            names.push(format!("--{}", key.replace('_', "-")));
        }
        if matches!(self, FlagStyle::Underscore | FlagStyle::Mixed) {
            names.push(format!("--{key}"));
        }
        names.sort();
        names.dedup();
        names
    }
}

/// Externally supplied option values keyed by namespaced name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    values: BTreeMap<String, toml::Value>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value; the key is normalised first.
    pub fn set(&mut self, key: &str, value: impl Into<toml::Value>) {
        self.values.insert(normalize_key(key), value.into());
    }

    pub fn with(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.values.get(&normalize_key(key))
    }

    /// Overlay `other` on top of `self`; `other` wins on conflicts.
    pub fn merge(&mut self, other: Options) {
        self.values.extend(other.values);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &toml::Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys that fall under none of `prefixes`; such values are never read.
    pub fn unclaimed<'a>(&self, prefixes: impl IntoIterator<Item = &'a str>) -> Vec<&str> {
        let prefixes: Vec<&str> = prefixes.into_iter().collect();
        self.values
            .keys()
            .map(String::as_str)
            .filter(|key| prefixes.iter().all(|p| option_under(p, key).is_none()))
            .collect()
    }

    /// Parse a `KEY=VALUE` assignment as given on the command line.
    ///
    /// The value is read as a TOML literal (`2`, `1.5`, `true`, `"x"`,
    /// `[1, 2]`); anything that does not parse is kept as a plain string.
    pub fn parse_assignment(raw: &str) -> Result<(String, toml::Value)> {
        let (key, value) = raw.split_once('=').ok_or_else(|| {
            ServiceError::Config(format!("option override '{raw}' must look like KEY=VALUE"))
        })?;

        let key = normalize_key(key);
        if key.is_empty() {
            return Err(ServiceError::Config(format!(
                "option override '{raw}' has an empty key"
            )));
        }

        Ok((key, parse_literal(value.trim())))
    }

    /// Build overrides from repeated `--set KEY=VALUE` arguments.
    pub fn from_assignments<'a>(raw: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut options = Options::new();
        for item in raw {
            let (key, value) = Self::parse_assignment(item)?;
            options.values.insert(key, value);
        }
        Ok(options)
    }
}

fn parse_literal(raw: &str) -> toml::Value {
    let doc = format!("v = {raw}");
    toml::from_str::<toml::Table>(&doc)
        .ok()
        .and_then(|mut table| table.remove("v"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

/// Immutable option view for a single task.
///
/// Built once at initialisation from the task's registered defaults plus the
/// service-wide [`Options`]; never changes afterwards.
#[derive(Debug, Clone)]
pub struct TaskOptions {
    prefix: String,
    values: BTreeMap<String, toml::Value>,
}

impl TaskOptions {
    /// Resolve options for a task.
    ///
    /// `defaults` are keyed by bare option name; `overrides` by namespaced
    /// key. Only overrides under this task's prefix are picked up.
    pub fn resolve(
        prefix: &str,
        defaults: &BTreeMap<String, toml::Value>,
        overrides: &Options,
    ) -> Self {
        Self::resolve_excluding(prefix, defaults, overrides, &[])
    }

    /// Like [`TaskOptions::resolve`], but overrides that belong to one of the
    /// longer prefixes in `others` are left to that task.
    ///
    /// With tasks `Clock` and `Clock_sync`, `Clock_sync_interval` belongs to
    /// `Clock_sync` only.
    pub fn resolve_excluding(
        prefix: &str,
        defaults: &BTreeMap<String, toml::Value>,
        overrides: &Options,
        others: &[&str],
    ) -> Self {
        let mut values = BTreeMap::new();

        for (name, value) in defaults {
            values.insert(namespaced_key(prefix, name), value.clone());
        }

        let own_len = normalize_key(prefix).len();
        for (key, value) in overrides.iter() {
            let Some(option) = option_under(prefix, key) else {
                continue;
            };
            let claimed_elsewhere = others.iter().any(|other| {
                normalize_key(other).len() > own_len && option_under(other, key).is_some()
            });
            if !claimed_elsewhere {
                values.insert(namespaced_key(prefix, option), value.clone());
            }
        }

        Self {
            prefix: normalize_key(prefix),
            values,
        }
    }

    /// An option view with nothing set.
    pub fn empty(prefix: &str) -> Self {
        Self {
            prefix: normalize_key(prefix),
            values: BTreeMap::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key_for(&self, option: &str) -> String {
        namespaced_key(&self.prefix, option)
    }

    /// Typed lookup; `Ok(None)` if unset.
    pub fn get<T: DeserializeOwned>(&self, option: &str) -> Result<Option<T>> {
        let key = self.key_for(option);
        match self.values.get(&key) {
            None => Ok(None),
            Some(value) => value.clone().try_into::<T>().map(Some).map_err(|e| {
                ServiceError::Config(format!(
                    "option '{key}' has an unexpected type ({value}): {e}"
                ))
            }),
        }
    }

    /// Typed lookup with a default for unset options.
    pub fn get_or<T: DeserializeOwned>(&self, option: &str, default: T) -> Result<T> {
        Ok(self.get(option)?.unwrap_or(default))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &toml::Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_accept_gnu_and_underscore_spellings() {
        assert_eq!(normalize_key("--Heartbeat-interval"), "Heartbeat_interval");
        assert_eq!(normalize_key("Heartbeat_interval"), "Heartbeat_interval");
        assert_eq!(namespaced_key("Poller", "Persist-Dir"), "Poller_persist_dir");
    }

    #[test]
    fn flag_names_follow_style() {
        assert_eq!(
            FlagStyle::Gnu.flag_names("thrift_port"),
            vec!["--thrift-port".to_string()]
        );
        assert_eq!(
            FlagStyle::Underscore.flag_names("thrift_port"),
            vec!["--thrift_port".to_string()]
        );
        assert_eq!(
            FlagStyle::Mixed.flag_names("thrift_port"),
            vec!["--thrift-port".to_string(), "--thrift_port".to_string()]
        );
        assert_eq!(FlagStyle::Mixed.flag_names("port").len(), 1);
    }

    #[test]
    fn assignments_parse_as_toml_literals() {
        let opts = Options::from_assignments([
            "Heartbeat-interval=2.5",
            "Queue_concurrency=3",
            "Poller_persist=true",
            "Poller_persist_dir=/var/tmp",
        ])
        .unwrap();

        assert_eq!(opts.get("Heartbeat_interval"), Some(&toml::Value::Float(2.5)));
        assert_eq!(opts.get("Queue_concurrency"), Some(&toml::Value::Integer(3)));
        assert_eq!(opts.get("Poller_persist"), Some(&toml::Value::Boolean(true)));
        assert_eq!(
            opts.get("Poller_persist_dir"),
            Some(&toml::Value::String("/var/tmp".to_string()))
        );
    }

    #[test]
    fn assignment_without_equals_is_rejected() {
        let err = Options::parse_assignment("novalue").unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[test]
    fn overrides_win_over_defaults_and_stay_in_namespace() {
        let mut defaults = BTreeMap::new();
        defaults.insert("interval".to_string(), toml::Value::Float(1.0));
        defaults.insert("persist".to_string(), toml::Value::Boolean(false));

        let overrides = Options::new()
            .with("Clock_interval", 5)
            .with("Other_interval", 9.0);

        let opts = TaskOptions::resolve("Clock", &defaults, &overrides);

        assert_eq!(opts.get_or::<f64>("interval", 0.0).unwrap(), 5.0);
        assert!(!opts.get_or::<bool>("persist", true).unwrap());
        assert_eq!(opts.get::<f64>("missing").unwrap(), None);
        assert!(opts.iter().all(|(k, _)| k.starts_with("Clock_")));
    }

    #[test]
    fn hyphenated_prefix_matches_either_spelling() {
        for raw in ["echo-queue-interval=5", "echo-queue_interval=5", "--echo_queue-Interval=5"] {
            let overrides = Options::from_assignments([raw]).unwrap();
            let opts = TaskOptions::resolve("echo-queue", &BTreeMap::new(), &overrides);
            assert_eq!(opts.get::<f64>("interval").unwrap(), Some(5.0), "{raw}");
            assert_eq!(opts.key_for("interval"), "echo_queue_interval");
        }
    }

    #[test]
    fn option_names_are_case_insensitive() {
        let overrides = Options::from_assignments(["Heartbeat-Interval=5"]).unwrap();
        let opts = TaskOptions::resolve("Heartbeat", &BTreeMap::new(), &overrides);
        assert_eq!(opts.get::<f64>("interval").unwrap(), Some(5.0));
    }

    #[test]
    fn longer_prefix_keeps_its_own_options() {
        let overrides = Options::new()
            .with("Clock_interval", 1)
            .with("Clock_sync_interval", 2);

        let clock =
            TaskOptions::resolve_excluding("Clock", &BTreeMap::new(), &overrides, &["Clock_sync"]);
        assert_eq!(clock.get::<i64>("interval").unwrap(), Some(1));
        assert_eq!(clock.get::<i64>("sync_interval").unwrap(), None);

        let sync =
            TaskOptions::resolve_excluding("Clock_sync", &BTreeMap::new(), &overrides, &["Clock"]);
        assert_eq!(sync.get::<i64>("interval").unwrap(), Some(2));
    }

    #[test]
    fn unclaimed_keys_are_reported() {
        let overrides = Options::new()
            .with("Clock_interval", 1)
            .with("Clok_interval", 2)
            .with("Clock", 3);
        assert_eq!(overrides.unclaimed(["Clock", "echo-queue"]), vec!["Clock", "Clok_interval"]);
    }

    #[test]
    fn type_mismatch_is_a_config_error() {
        let overrides = Options::new().with("Clock_interval", "soon");
        let opts = TaskOptions::resolve("Clock", &BTreeMap::new(), &overrides);
        let err = opts.get::<f64>("interval").unwrap_err();
        assert!(matches!(err, ServiceError::Config(msg) if msg.contains("Clock_interval")));
    }
}
