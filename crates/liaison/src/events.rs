//! Execution lifecycle notifications.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use strum::{Display, IntoStaticStr};
use tracing::warn;

use crate::executer::EXECUTER_TARGET;
use crate::manager::DISPATCH_TARGET;
use crate::message::{Command, Response};

pub(crate) const EVENTS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::events");

/// Why an executer refused to start a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    /// A single-flight executer was already running.
    Busy,
    /// Parameters were required but the command carried none.
    MissingParameters,
    /// The worker thread could not be spawned.
    SpawnFailed,
}

/// Observer trait used to surface execution events to telemetry sinks.
pub trait ExecutionReporter: Send + Sync {
    /// Invoked when an executer begins running a command.
    fn execution_started(&self, command: &Command);

    /// Invoked after the task completed and its response (if any) was sent.
    fn execution_finished(&self, command: &Command, response: Option<&Response>);

    /// Invoked when a running command was aborted.
    fn execution_aborted(&self, command: &Command);

    /// Invoked when an executer refused a command.
    fn command_rejected(&self, command: &Command, reason: RejectReason);

    /// Invoked when no executer is registered for a command.
    fn command_unhandled(&self, command: &Command);

    /// Invoked when a peer asked this module to terminate.
    fn termination_requested(&self, command: &Command);
}

impl<T> ExecutionReporter for Arc<T>
where
    T: ExecutionReporter + ?Sized,
{
    fn execution_started(&self, command: &Command) {
        (**self).execution_started(command);
    }

    fn execution_finished(&self, command: &Command, response: Option<&Response>) {
        (**self).execution_finished(command, response);
    }

    fn execution_aborted(&self, command: &Command) {
        (**self).execution_aborted(command);
    }

    fn command_rejected(&self, command: &Command, reason: RejectReason) {
        (**self).command_rejected(command, reason);
    }

    fn command_unhandled(&self, command: &Command) {
        (**self).command_unhandled(command);
    }

    fn termination_requested(&self, command: &Command) {
        (**self).termination_requested(command);
    }
}

/// Default reporter that records execution events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredExecutionReporter;

impl StructuredExecutionReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ExecutionReporter for StructuredExecutionReporter {
    fn execution_started(&self, command: &Command) {
        tracing::debug!(
            target: EXECUTER_TARGET,
            event = "execution_started",
            command = command.name(),
            id = command.id(),
            "execution started"
        );
    }

    fn execution_finished(&self, command: &Command, response: Option<&Response>) {
        tracing::debug!(
            target: EXECUTER_TARGET,
            event = "execution_finished",
            command = command.name(),
            id = command.id(),
            success = response.map(Response::success),
            "execution finished"
        );
    }

    fn execution_aborted(&self, command: &Command) {
        tracing::info!(
            target: EXECUTER_TARGET,
            event = "execution_aborted",
            command = command.name(),
            id = command.id(),
            "execution aborted"
        );
    }

    fn command_rejected(&self, command: &Command, reason: RejectReason) {
        tracing::warn!(
            target: EXECUTER_TARGET,
            event = "command_rejected",
            command = command.name(),
            id = command.id(),
            reason = %reason,
            "command rejected"
        );
    }

    fn command_unhandled(&self, command: &Command) {
        tracing::warn!(
            target: DISPATCH_TARGET,
            event = "command_unhandled",
            command = command.name(),
            id = command.id(),
            "no executer registered for command"
        );
    }

    fn termination_requested(&self, command: &Command) {
        tracing::info!(
            target: DISPATCH_TARGET,
            event = "termination_requested",
            source = command.routing().source.as_deref(),
            "termination requested by peer"
        );
    }
}

/// Runs `notify` against `reporter`, discarding any panic it raises.
pub(crate) fn notify<F>(reporter: &dyn ExecutionReporter, event: &'static str, notify: F)
where
    F: FnOnce(&dyn ExecutionReporter),
{
    if panic::catch_unwind(AssertUnwindSafe(|| notify(reporter))).is_err() {
        warn!(
            target: EVENTS_TARGET,
            event,
            "execution reporter panicked; notification discarded"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct PanickingReporter {
        calls: AtomicUsize,
    }

    impl ExecutionReporter for PanickingReporter {
        fn execution_started(&self, _command: &Command) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("observer failure");
        }

        fn execution_finished(&self, _command: &Command, _response: Option<&Response>) {}

        fn execution_aborted(&self, _command: &Command) {}

        fn command_rejected(&self, _command: &Command, _reason: RejectReason) {}

        fn command_unhandled(&self, _command: &Command) {}

        fn termination_requested(&self, _command: &Command) {}
    }

    #[test]
    fn panicking_reporter_is_isolated() {
        let reporter = PanickingReporter {
            calls: AtomicUsize::new(0),
        };
        let command = Command::new("wave", "");
        notify(&reporter, "execution_started", |r| r.execution_started(&command));
        notify(&reporter, "execution_started", |r| r.execution_started(&command));
        assert_eq!(reporter.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reject_reasons_render_snake_case() {
        assert_eq!(RejectReason::MissingParameters.to_string(), "missing_parameters");
        let name: &'static str = RejectReason::SpawnFailed.into();
        assert_eq!(name, "spawn_failed");
    }
}
