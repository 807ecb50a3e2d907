//! State and admission rules shared by every execution strategy.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use crate::events::RejectReason;
use crate::message::{Command, Response};

use super::{CommandTask, EXECUTER_TARGET, ExecuterSpec, ExecutionLink};

/// Outcome of admission control for one command.
pub(super) enum Admission {
    Accepted(ExecutionLink),
    Rejected(ExecutionLink, RejectReason),
    Detached,
}

pub(super) struct ExecuterCore {
    spec: ExecuterSpec,
    task: Arc<dyn CommandTask>,
    link: RwLock<Option<ExecutionLink>>,
}

impl ExecuterCore {
    pub(super) fn new(spec: ExecuterSpec, task: Arc<dyn CommandTask>) -> Self {
        Self {
            spec,
            task,
            link: RwLock::new(None),
        }
    }

    pub(super) const fn spec(&self) -> &ExecuterSpec {
        &self.spec
    }

    pub(super) fn task(&self) -> &dyn CommandTask {
        self.task.as_ref()
    }

    pub(super) fn link(&self) -> Option<ExecutionLink> {
        self.link
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(super) fn attach(&self, link: ExecutionLink) {
        *self.link.write().unwrap_or_else(PoisonError::into_inner) = Some(link);
    }

    pub(super) fn detach(&self) {
        *self.link.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub(super) fn is_attached(&self) -> bool {
        self.link
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Decides whether `command` may start given the strategy's busy state.
    pub(super) fn admit(&self, command: &Command, busy: bool) -> Admission {
        let Some(link) = self.link() else {
            return Admission::Detached;
        };
        if busy {
            return Admission::Rejected(link, RejectReason::Busy);
        }
        if self.spec.parameters_required() && !command.has_parameters() {
            return Admission::Rejected(link, RejectReason::MissingParameters);
        }
        Admission::Accepted(link)
    }

    /// Answers a refused command. Call without holding strategy locks.
    pub(super) fn reject(&self, link: &ExecutionLink, command: &Command, reason: RejectReason) {
        link.notify("command_rejected", |reporter| {
            reporter.command_rejected(command, reason);
        });
        if self.spec.response_required() {
            link.send_response(&Response::failure_for(command));
        }
    }

    pub(super) fn drop_detached(&self, command: &Command) {
        warn!(
            target: EXECUTER_TARGET,
            command = %command,
            executer = self.spec.name(),
            "executer is not attached to a manager; command dropped"
        );
    }

    /// Applies an admission decision, returning the link when accepted.
    pub(super) fn settle_admission(
        &self,
        command: &Command,
        admission: Admission,
    ) -> Option<ExecutionLink> {
        match admission {
            Admission::Accepted(link) => Some(link),
            Admission::Rejected(link, reason) => {
                self.reject(&link, command, reason);
                None
            }
            Admission::Detached => {
                self.drop_detached(command);
                None
            }
        }
    }
}
