//! Thread-owned batching of commands for one combined wait.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::message::Command;

use super::CorrelationError;

#[derive(Debug)]
struct OpenSession {
    owner: ThreadId,
    queue: Vec<Command>,
}

/// Single exclusive session slot.
///
/// Acquisition never blocks: a second [`ParallelSession::begin`] fails with
/// [`CorrelationError::SessionBusy`]. Only the thread that opened the session
/// may enqueue, commit or cancel; other callers get
/// [`CorrelationError::SessionNotOwned`] and the queue is left untouched.
#[derive(Debug, Default)]
pub(crate) struct ParallelSession {
    slot: Mutex<Option<OpenSession>>,
}

impl ParallelSession {
    fn slot(&self) -> MutexGuard<'_, Option<OpenSession>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn begin(&self) -> Result<(), CorrelationError> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Err(CorrelationError::SessionBusy);
        }
        *slot = Some(OpenSession {
            owner: thread::current().id(),
            queue: Vec::new(),
        });
        Ok(())
    }

    pub(crate) fn enqueue(&self, command: Command) -> Result<usize, CorrelationError> {
        let mut slot = self.slot();
        let session = owned(&mut slot)?;
        if session
            .queue
            .iter()
            .any(|queued| queued.name() == command.name())
        {
            return Err(CorrelationError::DuplicateName {
                name: command.name().to_owned(),
            });
        }
        session.queue.push(command);
        Ok(session.queue.len())
    }

    /// Takes the queued commands while keeping the session held.
    pub(crate) fn drain(&self) -> Result<Vec<Command>, CorrelationError> {
        let mut slot = self.slot();
        let session = owned(&mut slot)?;
        Ok(std::mem::take(&mut session.queue))
    }

    /// Closes the session, returning how many queued commands were dropped.
    pub(crate) fn release(&self) -> Result<usize, CorrelationError> {
        let mut slot = self.slot();
        let dropped = owned(&mut slot)?.queue.len();
        *slot = None;
        Ok(dropped)
    }

    pub(crate) fn is_open(&self) -> bool {
        self.slot().is_some()
    }

    pub(crate) fn is_owned_by_current(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|session| session.owner == thread::current().id())
    }

    pub(crate) fn queued(&self) -> usize {
        self.slot().as_ref().map_or(0, |session| session.queue.len())
    }
}

fn owned<'a>(slot: &'a mut Option<OpenSession>) -> Result<&'a mut OpenSession, CorrelationError> {
    let session = slot.as_mut().ok_or(CorrelationError::NoSession)?;
    if session.owner != thread::current().id() {
        return Err(CorrelationError::SessionNotOwned);
    }
    Ok(session)
}
