//! Outbound transport seam and inbound interception hooks.
//!
//! Socket lifecycle, reconnection and framing belong to the transport
//! collaborator. The core only needs a fallible send for each message kind,
//! plus an optional interceptor that may claim inbound responses before they
//! reach the pending-response pool.

mod errors;
#[cfg(any(test, feature = "test-support"))]
mod loopback;

pub use self::errors::TransportError;
#[cfg(any(test, feature = "test-support"))]
pub use self::loopback::LoopbackTransport;

use crate::message::{Command, Response};

/// Sends messages to other modules.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync + 'static {
    /// Sends a command. Implementations should avoid blocking for long.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the command could not be written.
    fn send_command(&self, command: &Command) -> Result<(), TransportError>;

    /// Sends a response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the response could not be written.
    fn send_response(&self, response: &Response) -> Result<(), TransportError>;
}

/// Offered every inbound response before it joins the pending pool.
pub trait ResponseInterceptor: Send + Sync + 'static {
    /// Returns `true` to claim the response; claimed responses are not pooled.
    fn intercept(&self, response: &Response) -> bool;
}
