//! Worker body shared by the threaded strategies.
//!
//! Each invocation carries a one-shot state cell. The worker settles it to
//! `Completed` once the task returns; the abort path settles it to `Aborted`.
//! Whichever side wins the compare-and-swap sends the response and reports
//! the outcome, so exactly one of "finished" or "aborted" fires.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;

use tracing::warn;

use crate::message::{Command, Response};

use super::shared::ExecuterCore;
use super::{CancellationToken, EXECUTER_TARGET, ExecutionLink};

const EXECUTING: u8 = 0;
const COMPLETED: u8 = 1;
const ABORTED: u8 = 2;

/// One accepted command and the state shared between its worker and aborter.
pub(super) struct Invocation {
    id: u64,
    command: Command,
    link: ExecutionLink,
    token: CancellationToken,
    state: AtomicU8,
}

impl Invocation {
    pub(super) fn new(id: u64, command: Command, link: ExecutionLink) -> Self {
        Self {
            id,
            command,
            link,
            token: CancellationToken::new(),
            state: AtomicU8::new(EXECUTING),
        }
    }

    pub(super) const fn id(&self) -> u64 {
        self.id
    }

    pub(super) const fn command(&self) -> &Command {
        &self.command
    }

    pub(super) const fn link(&self) -> &ExecutionLink {
        &self.link
    }

    fn settle(&self, outcome: u8) -> bool {
        self.state
            .compare_exchange(EXECUTING, outcome, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Runs the task for `invocation` and delivers its outcome.
///
/// Returns without side effects after the task if the invocation was aborted
/// while the task ran.
pub(super) fn run_invocation(core: &ExecuterCore, invocation: &Invocation) {
    let command = invocation.command();
    let link = invocation.link();
    let _entered = link.span().enter();
    let default_failure = Response::failure_for(command);

    link.notify("execution_started", |reporter| {
        reporter.execution_started(command);
    });

    let produced = run_task(core, command, &invocation.token);

    if !invocation.settle(COMPLETED) {
        return;
    }

    let response = match produced {
        Some(response) => Some(response),
        None if core.spec().response_required() => Some(default_failure),
        None => None,
    };
    if let Some(response) = &response {
        link.send_response(response);
    }
    link.notify("execution_finished", |reporter| {
        reporter.execution_finished(command, response.as_ref());
    });
}

/// Aborts `invocation` if it has not settled yet.
pub(super) fn abort_invocation(core: &ExecuterCore, invocation: &Invocation) -> bool {
    if !invocation.settle(ABORTED) {
        return false;
    }
    invocation.token.cancel();
    let command = invocation.command();
    let link = invocation.link();
    if core.spec().response_required() {
        link.send_response(&Response::failure_for(command));
    }
    link.notify("execution_aborted", |reporter| {
        reporter.execution_aborted(command);
    });
    true
}

/// Settles an invocation whose worker never started.
pub(super) fn discard_unstarted(invocation: &Invocation) -> bool {
    invocation.settle(ABORTED)
}

fn run_task(core: &ExecuterCore, command: &Command, token: &CancellationToken) -> Option<Response> {
    match panic::catch_unwind(AssertUnwindSafe(|| core.task().run(command, token))) {
        Ok(response) => response,
        Err(_) => {
            warn!(
                target: EXECUTER_TARGET,
                command = %command,
                "command task panicked"
            );
            None
        }
    }
}

/// Spawns a named worker thread.
pub(super) fn spawn_worker<F>(command_name: &str, body: F) -> io::Result<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(format!("liaison-{command_name}"))
        .spawn(body)
        .map(|_| ())
}
