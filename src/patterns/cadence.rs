// src/patterns/cadence.rs

use std::time::Duration;

use crate::config::TaskOptions;
use crate::errors::{Result, ServiceError};

/// Drift-corrected fixed interval.
///
/// Each iteration is measured from its own start; only the remainder of the
/// interval is slept. An iteration that overran starts the next one
/// immediately, with no attempt to catch up on missed iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    interval: Duration,
}

impl Cadence {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Interval in (fractional) seconds; must be positive and fit in a
    /// [`Duration`].
    pub fn from_secs_f64(secs: f64) -> Result<Self> {
        let invalid = || {
            ServiceError::Config(format!(
                "interval must be a positive number of seconds (got {secs})"
            ))
        };
        if secs.is_nan() || secs <= 0.0 {
            return Err(invalid());
        }
        Duration::try_from_secs_f64(secs)
            .map(Self::new)
            .map_err(|_| invalid())
    }

    /// Read the `interval` option, falling back to `default`.
    pub fn from_options(options: &TaskOptions, default: Duration) -> Result<Self> {
        let secs = options.get_or::<f64>("interval", default.as_secs_f64())?;
        Self::from_secs_f64(secs).map_err(|_| {
            ServiceError::Config(format!(
                "option '{}' must be a positive number of seconds (got {secs})",
                options.key_for("interval")
            ))
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// How long to sleep after an iteration that took `elapsed`.
    ///
    /// `None` when the interval is already used up.
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.interval
            .checked_sub(elapsed)
            .filter(|left| !left.is_zero())
    }
}
