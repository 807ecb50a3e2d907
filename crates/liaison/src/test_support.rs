//! Recording doubles shared by unit and behaviour tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::events::{ExecutionReporter, RejectReason};
use crate::executer::ExecutionLink;
use crate::message::{Command, Response};
use crate::transport::LoopbackTransport;

const WAIT_DEADLINE: Duration = Duration::from_secs(2);
const WAIT_TICK: Duration = Duration::from_millis(2);

/// Counts every execution event and keeps rejection reasons for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    started: AtomicUsize,
    finished: AtomicUsize,
    aborted: AtomicUsize,
    unhandled: AtomicUsize,
    terminations: AtomicUsize,
    rejections: Mutex<Vec<(String, RejectReason)>>,
}

impl RecordingReporter {
    /// Number of `execution_started` events.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Number of `execution_finished` events.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Number of `execution_aborted` events.
    #[must_use]
    pub fn aborted(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Number of `command_rejected` events.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.rejections().len()
    }

    /// Command names and reasons of every rejection so far.
    #[must_use]
    pub fn rejections(&self) -> Vec<(String, RejectReason)> {
        self.rejections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of `command_unhandled` events.
    #[must_use]
    pub fn unhandled(&self) -> usize {
        self.unhandled.load(Ordering::SeqCst)
    }

    /// Number of `termination_requested` events.
    #[must_use]
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl ExecutionReporter for RecordingReporter {
    fn execution_started(&self, _command: &Command) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn execution_finished(&self, _command: &Command, _response: Option<&Response>) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn execution_aborted(&self, _command: &Command) {
        self.aborted.fetch_add(1, Ordering::SeqCst);
    }

    fn command_rejected(&self, command: &Command, reason: RejectReason) {
        self.rejections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((command.name().to_owned(), reason));
    }

    fn command_unhandled(&self, _command: &Command) {
        self.unhandled.fetch_add(1, Ordering::SeqCst);
    }

    fn termination_requested(&self, _command: &Command) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Link that sends through `transport` and reports to `reporter`.
pub fn attached_link(
    transport: &Arc<LoopbackTransport>,
    reporter: &Arc<RecordingReporter>,
) -> ExecutionLink {
    ExecutionLink::new(transport.clone(), reporter.clone())
}

/// Polls `condition` until it holds or two seconds pass.
#[must_use]
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_DEADLINE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(WAIT_TICK);
    }
    condition()
}
