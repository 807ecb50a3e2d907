//! Built-in defaults shared by every module embedding the middleware.

use crate::logging::{LogFormat, area_filter};

/// Module name stamped on outgoing traffic when none is configured.
pub const DEFAULT_MODULE_NAME: &str = "liaison";

/// Fallback level for targets outside the middleware's own areas.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Poll tick used while waiting for responses.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Timeout applied by convenience waits that do not name one.
pub const DEFAULT_TIMEOUT_MS: u64 = 300;

/// Capacity of the bounded inbound command queue.
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 256;

/// Capacity of the bounded inbound response queue.
pub const DEFAULT_RESPONSE_QUEUE_CAPACITY: usize = 256;

/// Grace period granted to running executers during shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 500;

/// Default module name.
#[must_use]
pub fn default_module_name() -> String {
    DEFAULT_MODULE_NAME.to_owned()
}

/// Default filter: [`DEFAULT_LOG_FILTER`] plus each area's own level.
#[must_use]
pub fn default_log_filter() -> String {
    area_filter(DEFAULT_LOG_FILTER)
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
