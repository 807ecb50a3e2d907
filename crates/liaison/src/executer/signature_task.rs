//! Adapter running signature handlers as command tasks.

use tracing::debug;

use crate::message::{Command, Response};
use crate::signature::Signature;

use super::{CancellationToken, CommandTask, EXECUTER_TARGET};

/// What a signature handler wants sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Successful response carrying these parameters.
    Success(String),
    /// Failed response carrying these parameters.
    Failure(String),
    /// No response; the executer substitutes a failure if one is required.
    Silent,
}

impl Reply {
    fn into_response(self, command: &Command) -> Option<Response> {
        match self {
            Self::Success(parameters) => Some(Response::from_command(command, true, parameters)),
            Self::Failure(parameters) => Some(Response::from_command(command, false, parameters)),
            Self::Silent => None,
        }
    }
}

/// Runs the handler selected by a [`Signature`].
///
/// Commands that match no shape are answered with a failure echoing the
/// command. Shapes bound to a type list only are treated the same way.
pub struct SignatureTask {
    signature: Signature<Reply>,
}

impl SignatureTask {
    /// Wraps `signature`.
    #[must_use]
    pub const fn new(signature: Signature<Reply>) -> Self {
        Self { signature }
    }

    /// The wrapped signature.
    #[must_use]
    pub const fn signature(&self) -> &Signature<Reply> {
        &self.signature
    }
}

impl CommandTask for SignatureTask {
    fn run(&self, command: &Command, _cancel: &CancellationToken) -> Option<Response> {
        match self.signature.call(command) {
            Ok(reply) => reply.into_response(command),
            Err(error) => {
                debug!(
                    target: EXECUTER_TARGET,
                    %error,
                    command = %command,
                    "command rejected by signature"
                );
                Some(Response::failure_for(command))
            }
        }
    }
}
