//! In-process transport used by tests.
//!
//! Records every outbound message and, when a responder is installed, feeds
//! scripted responses back into a sink (normally the manager's inbound
//! response queue).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::message::{Command, Response};

use super::{Transport, TransportError};

type Responder = dyn Fn(&Command) -> Option<Response> + Send + Sync;
type Sink = dyn Fn(Response) + Send + Sync;

/// Transport that keeps traffic in memory.
#[derive(Default)]
pub struct LoopbackTransport {
    commands: Mutex<Vec<Command>>,
    responses: Mutex<Vec<Response>>,
    responder: Mutex<Option<(Arc<Responder>, Arc<Sink>)>>,
    failing: AtomicBool,
}

impl LoopbackTransport {
    /// Creates an empty loopback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers each sent command with `responder`, delivering replies to `sink`.
    pub fn respond_with<R, S>(&self, responder: R, sink: S)
    where
        R: Fn(&Command) -> Option<Response> + Send + Sync + 'static,
        S: Fn(Response) + Send + Sync + 'static,
    {
        *self
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((Arc::new(responder), Arc::new(sink)));
    }

    /// Makes every subsequent send fail.
    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Commands sent so far.
    #[must_use]
    pub fn sent_commands(&self) -> Vec<Command> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Responses sent so far.
    #[must_use]
    pub fn sent_responses(&self) -> Vec<Response> {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for LoopbackTransport {
    fn send_command(&self, command: &Command) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.clone());
        let scripted = self
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some((responder, sink)) = scripted
            && let Some(response) = responder(command)
        {
            sink(response);
        }
        Ok(())
    }

    fn send_response(&self, response: &Response) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(response.clone());
        Ok(())
    }
}
