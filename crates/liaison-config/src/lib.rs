//! Shared configuration for modules embedding the liaison middleware.
//!
//! Configuration is layered with `ortho_config`: built-in defaults are
//! overridden by a configuration file, then by `LIAISON_*` environment
//! variables, and finally by command-line flags. The resolved [`Config`]
//! drives the command manager (queue capacities, poll tick, shutdown grace)
//! and the telemetry subscriber (filter and output format).

mod defaults;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_COMMAND_QUEUE_CAPACITY, DEFAULT_LOG_FILTER, DEFAULT_MODULE_NAME,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESPONSE_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_GRACE_MS,
    DEFAULT_TIMEOUT_MS, default_log_filter, default_log_format, default_module_name,
};
pub use logging::{LogArea, LogFormat, MIDDLEWARE_TARGET, area_filter};

/// Resolved middleware configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "LIAISON")]
pub struct Config {
    /// Source name stamped on outgoing commands and responses.
    #[ortho_config(default = default_module_name())]
    pub module_name: String,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Tick between polls of the pending-response pool, in milliseconds.
    #[ortho_config(default = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
    /// Timeout used by waits that do not name one, in milliseconds.
    #[ortho_config(default = DEFAULT_TIMEOUT_MS)]
    pub default_timeout_ms: u64,
    /// Capacity of the inbound command queue.
    #[ortho_config(default = DEFAULT_COMMAND_QUEUE_CAPACITY)]
    pub command_queue_capacity: usize,
    /// Capacity of the inbound response queue.
    #[ortho_config(default = DEFAULT_RESPONSE_QUEUE_CAPACITY)]
    pub response_queue_capacity: usize,
    /// Grace period granted to running executers on shutdown, in milliseconds.
    #[ortho_config(default = DEFAULT_SHUTDOWN_GRACE_MS)]
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            module_name: default_module_name(),
            log_filter: default_log_filter(),
            log_format: default_log_format(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
            response_queue_capacity: DEFAULT_RESPONSE_QUEUE_CAPACITY,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

/// Errors raised when a resolved configuration is unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A field that must be strictly positive was zero.
    #[error("configuration field '{field}' must be greater than zero")]
    Zero {
        /// Name of the offending field.
        field: &'static str,
    },
    /// The module name was empty or whitespace.
    #[error("module name must not be empty")]
    EmptyModuleName,
}

impl Config {
    /// Loads configuration from the process arguments, environment and files.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer fails to parse.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads configuration using an explicit argument list.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer fails to parse.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Checks invariants the loader cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first field that is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.module_name.trim().is_empty() {
            return Err(ConfigError::EmptyModuleName);
        }
        let positive = [
            ("poll_interval_ms", self.poll_interval_ms == 0),
            ("command_queue_capacity", self.command_queue_capacity == 0),
            ("response_queue_capacity", self.response_queue_capacity == 0),
        ];
        positive
            .into_iter()
            .find_map(|(field, is_zero)| is_zero.then_some(field))
            .map_or(Ok(()), |field| Err(ConfigError::Zero { field }))
    }

    /// Module name used as the source of outgoing traffic.
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Poll tick for response waits.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Timeout for waits that do not name one.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Grace period for running executers during shutdown.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Capacity of the inbound command queue.
    #[must_use]
    pub const fn command_queue_capacity(&self) -> usize {
        self.command_queue_capacity
    }

    /// Capacity of the inbound response queue.
    #[must_use]
    pub const fn response_queue_capacity(&self) -> usize {
        self.response_queue_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let config = Config {
            poll_interval_ms: 0,
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "poll_interval_ms"
            })
        );
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let config = Config {
            response_queue_capacity: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "response_queue_capacity"
            })
        ));
    }

    #[test]
    fn rejects_blank_module_name() {
        let config = Config {
            module_name: "  ".to_owned(),
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyModuleName));
    }

    #[test]
    fn exposes_durations() {
        let config = Config::default();
        assert_eq!(
            config.poll_interval(),
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
        );
        assert_eq!(config.default_timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(
            config.shutdown_grace(),
            Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS)
        );
    }
}
