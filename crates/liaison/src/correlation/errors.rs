//! Errors raised by the correlation engine.
//!
//! Timeouts are not errors: they surface as an exchange whose outcome is
//! [`super::ExchangeOutcome::TimedOut`].

use thiserror::Error;

/// Misuse of a batched or session-batched wait.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    /// Two commands in one batch share a name.
    #[error("batch contains more than one '{name}' command")]
    DuplicateName {
        /// Repeated command name.
        name: String,
    },

    /// A batch was submitted without commands.
    #[error("batch contains no commands")]
    EmptyBatch,

    /// Another caller already holds the parallel-wait session.
    #[error("a parallel-wait session is already open")]
    SessionBusy,

    /// The calling thread does not own the open session.
    #[error("the parallel-wait session is owned by another thread")]
    SessionNotOwned,

    /// No parallel-wait session is open.
    #[error("no parallel-wait session is open")]
    NoSession,
}
