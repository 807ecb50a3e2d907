//! Single-flight executer running each invocation on a worker thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::events::RejectReason;
use crate::message::Command;

use super::shared::{Admission, ExecuterCore};
use super::worker::{Invocation, abort_invocation, discard_unstarted, run_invocation, spawn_worker};
use super::{CommandTask, EXECUTER_TARGET, Executer, ExecuterSpec, ExecutionLink};

/// Runs one invocation at a time on a dedicated worker thread.
///
/// [`Executer::busy`] stays `true` for the worker's whole lifetime, so a
/// second command arriving meanwhile is rejected with a failure response.
pub struct AsyncExecuter {
    inner: Arc<AsyncInner>,
}

struct AsyncInner {
    core: ExecuterCore,
    current: Mutex<Option<Arc<Invocation>>>,
    next_id: AtomicU64,
}

impl AsyncInner {
    fn current(&self) -> MutexGuard<'_, Option<Arc<Invocation>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears the slot if it still holds invocation `id`.
    fn release(&self, id: u64) {
        let mut current = self.current();
        if current.as_ref().is_some_and(|invocation| invocation.id() == id) {
            *current = None;
        }
    }
}

impl AsyncExecuter {
    /// Creates a single-flight executer for `spec` running `task`.
    #[must_use]
    pub fn new(spec: ExecuterSpec, task: impl CommandTask) -> Self {
        Self {
            inner: Arc::new(AsyncInner {
                core: ExecuterCore::new(spec, Arc::new(task)),
                current: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

impl Executer for AsyncExecuter {
    fn spec(&self) -> &ExecuterSpec {
        self.inner.core.spec()
    }

    fn busy(&self) -> bool {
        self.inner.current().is_some()
    }

    fn is_running(&self) -> bool {
        self.inner.current().is_some()
    }

    fn abort(&self) -> bool {
        let taken = self.inner.current().take();
        match taken {
            Some(invocation) => abort_invocation(&self.inner.core, &invocation),
            None => false,
        }
    }

    fn execute(&self, command: Command) {
        let core = &self.inner.core;
        let invocation = {
            let mut current = self.inner.current();
            match core.admit(&command, current.is_some()) {
                Admission::Accepted(link) => {
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    let invocation = Arc::new(Invocation::new(id, command, link));
                    *current = Some(Arc::clone(&invocation));
                    invocation
                }
                rejected => {
                    drop(current);
                    core.settle_admission(&command, rejected);
                    return;
                }
            }
        };

        let inner = Arc::clone(&self.inner);
        let worker_invocation = Arc::clone(&invocation);
        let spawned = spawn_worker(core.spec().name(), move || {
            run_invocation(&inner.core, &worker_invocation);
            inner.release(worker_invocation.id());
        });

        if let Err(error) = spawned {
            warn!(
                target: EXECUTER_TARGET,
                %error,
                executer = core.spec().name(),
                "failed to spawn worker"
            );
            self.inner.release(invocation.id());
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
