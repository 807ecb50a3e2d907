//! Error types for outbound sends.

use std::io;

use thiserror::Error;

/// Errors reported by a [`super::Transport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No connection to the destination module is available.
    #[error("no connection to '{destination}'")]
    Disconnected {
        /// Module the message was addressed to.
        destination: String,
    },
    /// Writing to the underlying stream failed.
    #[error("failed to write message: {source}")]
    Io {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The transport has been shut down.
    #[error("transport is closed")]
    Closed,
}

impl TransportError {
    /// Creates a disconnected error.
    #[must_use]
    pub fn disconnected(destination: impl Into<String>) -> Self {
        Self::Disconnected {
            destination: destination.into(),
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}
