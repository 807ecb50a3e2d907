//! The command manager: dispatch loops plus the public send/wait surface.
//!
//! A manager owns everything a module needs to talk to its peers: the
//! executer registry, the correlation engine, the two bounded inbound
//! queues and the module's busy/ready flags. Transports feed it through
//! [`CommandManager::enqueue_command`] and
//! [`CommandManager::enqueue_response`]; two background threads drain those
//! queues while the manager is running.

mod dispatch;
mod errors;
mod system;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use liaison_config::Config;

use crate::correlation::{BatchOutcome, CorrelationError, Correlator, Exchange, ResponsePool};
use crate::events::{ExecutionReporter, StructuredExecutionReporter};
use crate::executer::{Executer, ExecutionLink};
use crate::message::{Command, Response};
use crate::queue::{InboundQueue, QueueError};
use crate::registry::{ExecuterRegistry, RegistryError};
use crate::transport::{ResponseInterceptor, Transport, TransportError};

use self::dispatch::{Shared, run_command_loop, run_response_loop};

pub use self::errors::ManagerError;
pub use self::system::SystemCommand;

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

const COMMAND_LOOP: &str = "command";
const RESPONSE_LOOP: &str = "response";

struct DispatchLoops {
    shutdown: Arc<AtomicBool>,
    command_loop: JoinHandle<()>,
    response_loop: JoinHandle<()>,
}

/// Per-module session object tying executers, correlation and transport
/// together.
pub struct CommandManager {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    module_name: String,
    default_timeout: Duration,
    shutdown_grace: Duration,
    next_id: AtomicU8,
    loops: Mutex<Option<DispatchLoops>>,
}

impl CommandManager {
    /// Builds a stopped manager that reports execution events via `tracing`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Config`] when `config` fails validation.
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Result<Self, ManagerError> {
        Self::with_reporter(config, transport, Arc::new(StructuredExecutionReporter::new()))
    }

    /// Builds a stopped manager that reports execution events to `reporter`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Config`] when `config` fails validation.
    pub fn with_reporter(
        config: &Config,
        transport: Arc<dyn Transport>,
        reporter: Arc<dyn ExecutionReporter>,
    ) -> Result<Self, ManagerError> {
        config.validate()?;
        let module_name = config.module_name().to_owned();
        let link = ExecutionLink::new(Arc::clone(&transport), reporter)
            .with_source(module_name.as_str());
        let correlator = Correlator::new(
            Arc::clone(&transport),
            Arc::new(ResponsePool::new()),
            config.poll_interval(),
        )
        .with_source(module_name.as_str());

        let shared = Shared {
            poll_interval: config.poll_interval(),
            registry: ExecuterRegistry::new(link.clone()),
            correlator,
            commands: InboundQueue::new(COMMAND_LOOP, config.command_queue_capacity()),
            responses: InboundQueue::new(RESPONSE_LOOP, config.response_queue_capacity()),
            interceptor: RwLock::new(None),
            link,
            busy: AtomicBool::new(false),
            ready: AtomicBool::new(false),
        };
        Ok(Self {
            shared: Arc::new(shared),
            transport,
            module_name,
            default_timeout: config.default_timeout(),
            shutdown_grace: config.shutdown_grace(),
            next_id: AtomicU8::new(0),
            loops: Mutex::new(None),
        })
    }

    fn loops(&self) -> MutexGuard<'_, Option<DispatchLoops>> {
        self.loops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Source name stamped on outgoing messages.
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Timeout applied when a wait is given `None`.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Executers registered with this manager.
    #[must_use]
    pub fn registry(&self) -> &ExecuterRegistry {
        &self.shared.registry
    }

    /// Registers `executer` and attaches it to this manager.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is already taken.
    pub fn add_executer(&self, executer: Arc<dyn Executer>) -> Result<(), RegistryError> {
        self.shared.registry.add(executer)
    }

    /// Snapshot of the registered executers, ordered by command name.
    #[must_use]
    pub fn executers(&self) -> Vec<Arc<dyn Executer>> {
        self.shared.registry.snapshot()
    }

    /// Correlation engine used by the send/wait calls.
    #[must_use]
    pub fn correlator(&self) -> &Correlator {
        &self.shared.correlator
    }

    /// Installs or removes the inbound response interceptor.
    pub fn set_interceptor(&self, interceptor: Option<Arc<dyn ResponseInterceptor>>) {
        *self
            .shared
            .interceptor
            .write()
            .unwrap_or_else(PoisonError::into_inner) = interceptor;
    }

    /// Inbound callback for commands read by the transport.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the manager is stopped or the queue is
    /// full; the command is dropped.
    pub fn enqueue_command(&self, command: Command) -> Result<(), QueueError> {
        self.shared.commands.push(command)
    }

    /// Inbound callback for responses read by the transport.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the manager is stopped or the queue is
    /// full; the response is dropped.
    pub fn enqueue_response(&self, response: Response) -> Result<(), QueueError> {
        self.shared.responses.push(response)
    }

    /// Sends `command` without waiting for an answer.
    ///
    /// # Errors
    ///
    /// Returns the transport's error when the write fails.
    pub fn send_command(&self, command: Command) -> Result<(), TransportError> {
        self.shared.correlator.send(command).map(|_| ())
    }

    /// Sends `response`, stamping this module as its source if unset.
    ///
    /// # Errors
    ///
    /// Returns the transport's error when the write fails.
    pub fn send_response(&self, mut response: Response) -> Result<(), TransportError> {
        if response.routing().source.is_none() {
            response.routing_mut().source = Some(self.module_name.clone());
        }
        self.transport.send_response(&response)
    }

    /// Sends `command` and waits for its response.
    #[must_use]
    pub fn send_and_wait(&self, command: Command, timeout: Option<Duration>) -> Exchange {
        self.shared
            .correlator
            .send_and_wait(command, self.timeout_or_default(timeout))
    }

    /// Waits for the response to a command sent earlier.
    #[must_use]
    pub fn wait_for_response(&self, command: Command, timeout: Option<Duration>) -> Exchange {
        self.shared
            .correlator
            .wait_for_response(command, self.timeout_or_default(timeout))
    }

    /// Sends a batch of distinctly named commands and waits for all of them.
    ///
    /// # Errors
    ///
    /// See [`Correlator::multiple_send_and_wait`].
    pub fn multiple_send_and_wait(
        &self,
        commands: Vec<Command>,
        timeout: Option<Duration>,
    ) -> Result<BatchOutcome, CorrelationError> {
        self.shared
            .correlator
            .multiple_send_and_wait(commands, self.timeout_or_default(timeout))
    }

    /// Opens the parallel-wait session for the calling thread.
    ///
    /// # Errors
    ///
    /// See [`Correlator::begin_parallel_send_and_wait`].
    pub fn begin_parallel_send_and_wait(&self) -> Result<(), CorrelationError> {
        self.shared.correlator.begin_parallel_send_and_wait()
    }

    /// Queues `command` in the caller's parallel-wait session.
    ///
    /// # Errors
    ///
    /// See [`Correlator::enqueue_command`].
    pub fn enqueue_parallel_command(&self, command: Command) -> Result<usize, CorrelationError> {
        self.shared.correlator.enqueue_command(command)
    }

    /// Sends the session's queued commands as one batch and closes it.
    ///
    /// # Errors
    ///
    /// See [`Correlator::commit_parallel_send_and_wait`].
    pub fn commit_parallel_send_and_wait(
        &self,
        timeout: Option<Duration>,
    ) -> Result<BatchOutcome, CorrelationError> {
        self.shared
            .correlator
            .commit_parallel_send_and_wait(self.timeout_or_default(timeout))
    }

    /// Closes the caller's parallel-wait session without sending.
    ///
    /// # Errors
    ///
    /// See [`Correlator::cancel_parallel_send_and_wait`].
    pub fn cancel_parallel_send_and_wait(&self) -> Result<usize, CorrelationError> {
        self.shared.correlator.cancel_parallel_send_and_wait()
    }

    fn timeout_or_default(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or(self.default_timeout)
    }

    /// Next automatic command id, cycling through `0..=255`.
    #[must_use]
    pub fn next_command_id(&self) -> i32 {
        i32::from(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Sets the flag reported by the `busy` system command.
    pub fn set_busy(&self, busy: bool) {
        self.shared.busy.store(busy, Ordering::SeqCst);
    }

    /// Whether the module reports itself busy.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::SeqCst)
    }

    /// Sets the flag reported by the `ready` system command.
    pub fn set_ready(&self, ready: bool) {
        self.shared.ready.store(ready, Ordering::SeqCst);
    }

    /// Whether the module reports itself ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    /// Whether the dispatch loops are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.loops().is_some()
    }

    /// Starts both dispatch loops.
    ///
    /// Responses pooled before this call are dropped so a restarted manager
    /// never pairs a fresh command with a stale answer.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::AlreadyRunning`] if the loops are running and
    /// [`ManagerError::Spawn`] if a thread cannot be created.
    pub fn start(&self) -> Result<(), ManagerError> {
        let mut loops = self.loops();
        if loops.is_some() {
            return Err(ManagerError::AlreadyRunning);
        }
        let stale = self.shared.correlator.pool().clear();
        if stale > 0 {
            debug!(target: DISPATCH_TARGET, stale, "dropped responses pooled while stopped");
        }
        let shutdown = Arc::new(AtomicBool::new(false));
        self.shared.commands.open();
        self.shared.responses.open();

        let command_loop = match spawn_loop(COMMAND_LOOP, &self.shared, &shutdown, run_command_loop)
        {
            Ok(handle) => handle,
            Err(error) => {
                self.close_queues();
                return Err(error);
            }
        };
        let response_loop =
            match spawn_loop(RESPONSE_LOOP, &self.shared, &shutdown, run_response_loop) {
                Ok(handle) => handle,
                Err(error) => {
                    shutdown.store(true, Ordering::SeqCst);
                    self.close_queues();
                    if command_loop.join().is_err() {
                        warn!(target: DISPATCH_TARGET, "command loop panicked during failed start");
                    }
                    return Err(error);
                }
            };

        *loops = Some(DispatchLoops {
            shutdown,
            command_loop,
            response_loop,
        });
        info!(
            target: DISPATCH_TARGET,
            module = %self.module_name,
            executers = self.shared.registry.len(),
            "command manager started"
        );
        Ok(())
    }

    /// Stops both loops, discards queued work and winds down executers.
    ///
    /// Running executers get the configured grace period to finish before
    /// being aborted. Calling `stop` on a stopped manager does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::ThreadPanic`] if a loop panicked. Shutdown
    /// still completes in that case.
    pub fn stop(&self) -> Result<(), ManagerError> {
        let Some(loops) = self.loops().take() else {
            return Ok(());
        };
        loops.shutdown.store(true, Ordering::SeqCst);
        self.close_queues();
        let command_result = loops
            .command_loop
            .join()
            .map_err(|_| ManagerError::ThreadPanic { role: COMMAND_LOOP });
        let response_result = loops
            .response_loop
            .join()
            .map_err(|_| ManagerError::ThreadPanic { role: RESPONSE_LOOP });

        let dropped_commands = self.shared.commands.discard();
        let dropped_responses = self.shared.responses.discard();
        let dropped_pending = self.shared.correlator.pool().clear();
        debug!(
            target: DISPATCH_TARGET,
            dropped_commands,
            dropped_responses,
            dropped_pending,
            "discarded queued messages"
        );

        self.wind_down_executers();
        info!(target: DISPATCH_TARGET, module = %self.module_name, "command manager stopped");
        command_result.and(response_result)
    }

    fn close_queues(&self) {
        self.shared.commands.close();
        self.shared.responses.close();
    }

    fn wind_down_executers(&self) {
        let executers = self.shared.registry.snapshot();
        let deadline = Instant::now() + self.shutdown_grace;
        while executers.iter().any(|executer| executer.is_running()) && Instant::now() < deadline
        {
            thread::sleep(self.shared.poll_interval.min(self.shutdown_grace));
        }
        for executer in executers.iter().filter(|executer| executer.is_running()) {
            if executer.abort() {
                warn!(
                    target: DISPATCH_TARGET,
                    command = executer.command_name(),
                    "aborted executer still running after shutdown grace"
                );
            }
        }
    }
}

impl Drop for CommandManager {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!(target: DISPATCH_TARGET, %error, "command manager stopped uncleanly");
        }
    }
}

impl std::fmt::Debug for CommandManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandManager")
            .field("module_name", &self.module_name)
            .field("running", &self.is_running())
            .field("queued_commands", &self.shared.commands.len())
            .field("queued_responses", &self.shared.responses.len())
            .field("registry", &self.shared.registry)
            .finish_non_exhaustive()
    }
}

fn spawn_loop(
    role: &'static str,
    shared: &Arc<Shared>,
    shutdown: &Arc<AtomicBool>,
    body: fn(&Shared, &AtomicBool),
) -> Result<JoinHandle<()>, ManagerError> {
    let shared = Arc::clone(shared);
    let shutdown = Arc::clone(shutdown);
    let span = shared.link.span().clone();
    thread::Builder::new()
        .name(format!("liaison-{role}s"))
        .spawn(move || {
            let _entered = span.enter();
            body(&shared, &shutdown);
        })
        .map_err(|source| ManagerError::Spawn { role, source })
}

#[cfg(test)]
mod tests;
