//! Errors surfaced while starting or stopping the dispatch loops.

use std::io;

use thiserror::Error;

use liaison_config::ConfigError;

/// Errors raised by [`super::CommandManager`] lifecycle calls.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// `start` was called while the loops were running.
    #[error("command manager is already running")]
    AlreadyRunning,
    /// A dispatch thread could not be spawned.
    #[error("failed to spawn {role} loop: {source}")]
    Spawn {
        /// Which loop failed to start.
        role: &'static str,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// A dispatch thread panicked.
    #[error("{role} loop panicked")]
    ThreadPanic {
        /// Which loop panicked.
        role: &'static str,
    },
}
