//! Executer running any number of invocations concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::events::RejectReason;
use crate::message::Command;

use super::shared::ExecuterCore;
use super::worker::{Invocation, abort_invocation, discard_unstarted, run_invocation, spawn_worker};
use super::{CommandTask, EXECUTER_TARGET, Executer, ExecuterSpec, ExecutionLink};

/// Starts a worker thread per command with no single-flight limit.
///
/// [`Executer::busy`] is always `false`; [`Executer::abort`] aborts every
/// outstanding invocation.
pub struct MultipleExecuter {
    inner: Arc<MultipleInner>,
}

struct MultipleInner {
    core: ExecuterCore,
    workers: Mutex<HashMap<u64, Arc<Invocation>>>,
    next_id: AtomicU64,
}

impl MultipleInner {
    fn workers(&self) -> MutexGuard<'_, HashMap<u64, Arc<Invocation>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MultipleExecuter {
    /// Creates a concurrent executer for `spec` running `task`.
    #[must_use]
    pub fn new(spec: ExecuterSpec, task: impl CommandTask) -> Self {
        Self {
            inner: Arc::new(MultipleInner {
                core: ExecuterCore::new(spec, Arc::new(task)),
                workers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Number of invocations currently tracked.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.inner.workers().len()
    }
}

impl Executer for MultipleExecuter {
    fn spec(&self) -> &ExecuterSpec {
        self.inner.core.spec()
    }

    fn busy(&self) -> bool {
        false
    }

    fn is_running(&self) -> bool {
        !self.inner.workers().is_empty()
    }

    fn abort(&self) -> bool {
        let drained: Vec<Arc<Invocation>> = self.inner.workers().drain().map(|(_, w)| w).collect();
        let mut aborted = false;
        for invocation in &drained {
            aborted |= abort_invocation(&self.inner.core, invocation);
        }
        aborted
    }

    fn execute(&self, command: Command) {
        let core = &self.inner.core;
        let admission = core.admit(&command, false);
        let Some(link) = core.settle_admission(&command, admission) else {
            return;
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let invocation = Arc::new(Invocation::new(id, command, link));
        self.inner.workers().insert(id, Arc::clone(&invocation));

        let inner = Arc::clone(&self.inner);
        let worker_invocation = Arc::clone(&invocation);
        let spawned = spawn_worker(core.spec().name(), move || {
            run_invocation(&inner.core, &worker_invocation);
            inner.workers().remove(&worker_invocation.id());
        });

        if let Err(error) = spawned {
            warn!(
                target: EXECUTER_TARGET,
                %error,
                executer = core.spec().name(),
                "failed to spawn worker"
            );
            self.inner.workers().remove(&id);
            if discard_unstarted(&invocation) {
                core.reject(invocation.link(), invocation.command(), RejectReason::SpawnFailed);
            }
        }
    }

    fn attach(&self, link: ExecutionLink) {
        self.inner.core.attach(link);
    }

    fn detach(&self) {
        self.inner.core.detach();
    }

    fn is_attached(&self) -> bool {
        self.inner.core.is_attached()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::executer::CancellationToken;
    use crate::message::Response;
    use crate::test_support::{RecordingReporter, attached_link, wait_until};
    use crate::transport::LoopbackTransport;

    use super::*;

    fn sleeping_executer(pause: Duration) -> MultipleExecuter {
        MultipleExecuter::new(
            ExecuterSpec::new("look"),
            move |command: &Command, cancel: &CancellationToken| {
                if cancel.sleep(pause) {
                    Some(Response::success_for(command))
                } else {
                    None
                }
            },
        )
    }

    #[test]
    fn runs_invocations_concurrently() {
        let transport = Arc::new(LoopbackTransport::new());
        let reporter = Arc::new(RecordingReporter::default());
        let executer = sleeping_executer(Duration::from_millis(100));
        executer.attach(attached_link(&transport, &reporter));

        for id in 0..3 {
            executer.execute(Command::new("look", "left").with_id(id));
            assert!(!executer.busy());
        }
        assert!(wait_until(|| transport.sent_responses().len() == 3));
        let mut ids: Vec<i32> = transport.sent_responses().iter().map(Response::id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(wait_until(|| !executer.is_running()));
    }

    #[test]
    fn abort_terminates_every_worker() {
        let transport = Arc::new(LoopbackTransport::new());
        let reporter = Arc::new(RecordingReporter::default());
        let executer = sleeping_executer(Duration::from_secs(10));
        executer.attach(attached_link(&transport, &reporter));

        executer.execute(Command::new("look", "left").with_id(1));
        executer.execute(Command::new("look", "right").with_id(2));
        assert!(wait_until(|| reporter.started() == 2));
        assert!(executer.is_running());

        assert!(executer.abort());
        assert!(!executer.is_running());
        assert_eq!(reporter.aborted(), 2);

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(reporter.finished(), 0);
        let responses = transport.sent_responses();
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|response| !response.success()));
    }
}
