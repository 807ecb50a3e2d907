//! Executer that runs its task on the dispatch thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::message::Command;

use super::shared::ExecuterCore;
use super::worker::{Invocation, run_invocation};
use super::{CommandTask, Executer, ExecuterSpec, ExecutionLink};

/// Runs each command to completion before `execute` returns.
///
/// The dispatch loop is blocked for the whole task, so only use this for
/// handlers that finish quickly. Aborting is not supported.
pub struct SyncExecuter {
    core: ExecuterCore,
    running: AtomicBool,
    next_id: AtomicU64,
}

impl SyncExecuter {
    /// Creates a synchronous executer for `spec` running `task`.
    #[must_use]
    pub fn new(spec: ExecuterSpec, task: impl CommandTask) -> Self {
        Self {
            core: ExecuterCore::new(spec, Arc::new(task)),
            running: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
        }
    }
}

impl Executer for SyncExecuter {
    fn spec(&self) -> &ExecuterSpec {
        self.core.spec()
    }

    fn busy(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn abort(&self) -> bool {
        false
    }

    fn execute(&self, command: Command) {
        let claimed = self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        let admission = self.core.admit(&command, !claimed);
        let Some(link) = self.core.settle_admission(&command, admission) else {
            if claimed {
                self.running.store(false, Ordering::SeqCst);
            }
            return;
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let invocation = Invocation::new(id, command, link);
        run_invocation(&self.core, &invocation);
        self.running.store(false, Ordering::SeqCst);
    }

    fn attach(&self, link: ExecutionLink) {
        self.core.attach(link);
    }

    fn detach(&self) {
        self.core.detach();
    }

    fn is_attached(&self) -> bool {
        self.core.is_attached()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::executer::CancellationToken;
    use crate::message::Response;
    use crate::test_support::{RecordingReporter, attached_link};
    use crate::transport::LoopbackTransport;

    use super::*;

    fn echo_executer(spec: ExecuterSpec) -> SyncExecuter {
        SyncExecuter::new(spec, |command: &Command, _: &CancellationToken| {
            Some(Response::success_for(command))
        })
    }

    #[test]
    fn runs_task_inline_and_sends_response() {
        let transport = Arc::new(LoopbackTransport::new());
        let reporter = Arc::new(RecordingReporter::default());
        let executer = echo_executer(ExecuterSpec::new("echo"));
        executer.attach(attached_link(&transport, &reporter));

        executer.execute(Command::new("echo", "hi").with_id(1));

        let responses = transport.sent_responses();
        assert_eq!(responses.len(), 1);
        assert!(responses[0].success());
        assert_eq!(responses[0].parameters(), "hi");
        assert_eq!(reporter.started(), 1);
        assert_eq!(reporter.finished(), 1);
        assert!(!executer.is_running());
    }

    #[test]
    fn rejects_missing_parameters() {
        let transport = Arc::new(LoopbackTransport::new());
        let reporter = Arc::new(RecordingReporter::default());
        let executer = echo_executer(ExecuterSpec::new("echo").with_parameters_required(true));
        executer.attach(attached_link(&transport, &reporter));

        executer.execute(Command::new("echo", "   "));

        let responses = transport.sent_responses();
        assert_eq!(responses.len(), 1);
        assert!(!responses[0].success());
        assert_eq!(reporter.started(), 0);
        assert_eq!(reporter.rejected(), 1);
    }

    #[test]
    fn abort_is_not_supported() {
        let executer = echo_executer(ExecuterSpec::new("echo"));
        assert!(!executer.abort());
    }

    #[test]
    fn detached_executer_drops_commands() {
        let executer = echo_executer(ExecuterSpec::new("echo"));
        executer.execute(Command::new("echo", ""));
        assert!(!executer.is_running());
        assert!(!executer.is_attached());
    }

    #[test]
    fn detached_executer_reports_nothing() {
        let transport = Arc::new(LoopbackTransport::new());
        let reporter = Arc::new(RecordingReporter::default());
        let executer = echo_executer(ExecuterSpec::new("echo"));
        executer.attach(attached_link(&transport, &reporter));
        executer.detach();

        executer.execute(Command::new("echo", "hi"));

        assert_eq!(reporter.started(), 0);
        assert_eq!(reporter.rejected(), 0);
        assert!(transport.sent_responses().is_empty());
    }

    #[test]
    fn missing_response_is_replaced_with_failure() {
        let transport = Arc::new(LoopbackTransport::new());
        let reporter = Arc::new(RecordingReporter::default());
        let executer = SyncExecuter::new(
            ExecuterSpec::new("noop"),
            |_: &Command, _: &CancellationToken| None,
        );
        executer.attach(attached_link(&transport, &reporter));

        executer.execute(Command::new("noop", "x").with_id(4));

        let responses = transport.sent_responses();
        assert_eq!(responses.len(), 1);
        assert!(!responses[0].success());
        assert_eq!(responses[0].id(), 4);
    }
}
