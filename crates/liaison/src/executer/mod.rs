//! Per-command executers.
//!
//! An executer owns one command name and decides how invocations of that
//! command run. All three strategies share the same contract and state
//! machine (Idle, Executing, then Completed or Aborted, then Idle again):
//!
//! - [`SyncExecuter`] runs the task on the dispatch thread.
//! - [`AsyncExecuter`] runs each invocation on its own worker thread and
//!   refuses new work while one is outstanding.
//! - [`MultipleExecuter`] runs any number of invocations concurrently.
//!
//! Tasks implement [`CommandTask`]. Aborting is cooperative: the abort path
//! settles the invocation, answers the command and fires the task's
//! [`CancellationToken`]; a task that finishes afterwards has its result
//! discarded.

mod asynchronous;
mod cancel;
mod multiple;
mod shared;
mod signature_task;
mod sync;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use strum::{Display, EnumString};
use tracing::{Span, warn};

use crate::events::{self, ExecutionReporter};
use crate::message::{Command, Response};
use crate::telemetry;
use crate::transport::Transport;

pub use self::asynchronous::AsyncExecuter;
pub use self::cancel::{CancellationToken, Cancelled};
pub use self::multiple::MultipleExecuter;
pub use self::signature_task::{Reply, SignatureTask};
pub use self::sync::SyncExecuter;

pub(crate) const EXECUTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::executer");

/// Timeout hint used when an executer does not declare one.
pub const DEFAULT_TIMEOUT_HINT: Duration = Duration::from_millis(300);

/// Relative importance advertised for an executer.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Priority {
    /// Background work.
    Low,
    /// Ordinary commands.
    #[default]
    Normal,
    /// Commands that should be served first.
    High,
}

/// Static description of an executer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuterSpec {
    name: String,
    priority: Priority,
    timeout_hint: Duration,
    response_required: bool,
    parameters_required: bool,
}

impl ExecuterSpec {
    /// Describes an executer for `name` that must always answer and accepts
    /// empty parameters.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().to_lowercase(),
            priority: Priority::default(),
            timeout_hint: DEFAULT_TIMEOUT_HINT,
            response_required: true,
            parameters_required: false,
        }
    }

    /// Sets the advertised priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the advertised timeout hint.
    #[must_use]
    pub fn with_timeout_hint(mut self, timeout_hint: Duration) -> Self {
        self.timeout_hint = timeout_hint;
        self
    }

    /// Whether a response must be sent for every invocation.
    #[must_use]
    pub fn with_response_required(mut self, required: bool) -> Self {
        self.response_required = required;
        self
    }

    /// Whether commands without parameters are rejected.
    #[must_use]
    pub fn with_parameters_required(mut self, required: bool) -> Self {
        self.parameters_required = required;
        self
    }

    /// Case-folded command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Advertised priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Advertised timeout hint.
    #[must_use]
    pub const fn timeout_hint(&self) -> Duration {
        self.timeout_hint
    }

    /// Whether a response must be sent for every invocation.
    #[must_use]
    pub const fn response_required(&self) -> bool {
        self.response_required
    }

    /// Whether commands without parameters are rejected.
    #[must_use]
    pub const fn parameters_required(&self) -> bool {
        self.parameters_required
    }
}

/// Work performed for one command invocation.
pub trait CommandTask: Send + Sync + 'static {
    /// Runs the command, returning the response to send (if any).
    ///
    /// Long-running tasks should poll `cancel` at their yield points.
    fn run(&self, command: &Command, cancel: &CancellationToken) -> Option<Response>;
}

impl<F> CommandTask for F
where
    F: Fn(&Command, &CancellationToken) -> Option<Response> + Send + Sync + 'static,
{
    fn run(&self, command: &Command, cancel: &CancellationToken) -> Option<Response> {
        self(command, cancel)
    }
}

/// Connection from an executer back to its owning manager.
#[derive(Clone)]
pub struct ExecutionLink {
    transport: Arc<dyn Transport>,
    reporter: Arc<dyn ExecutionReporter>,
    source: Option<Arc<str>>,
    span: Span,
}

impl ExecutionLink {
    /// Builds a link that sends through `transport` and reports to `reporter`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, reporter: Arc<dyn ExecutionReporter>) -> Self {
        Self {
            transport,
            reporter,
            source: None,
            span: Span::none(),
        }
    }

    /// Stamps `source` on responses that do not name one and runs tasks
    /// inside the module's span.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        let module: Arc<str> = source.into();
        self.span = telemetry::module_span(&module);
        self.source = Some(module);
        self
    }

    /// Span that events raised on behalf of this link belong to.
    pub(crate) const fn span(&self) -> &Span {
        &self.span
    }

    /// Sends `response`, logging failures. Returns `true` when it was written.
    pub(crate) fn send_response(&self, response: &Response) -> bool {
        let stamped;
        let outgoing = match (&self.source, &response.routing().source) {
            (Some(source), None) => {
                stamped = response.clone().with_source(source.as_ref());
                &stamped
            }
            _ => response,
        };
        match self.transport.send_response(outgoing) {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    target: EXECUTER_TARGET,
                    %error,
                    response = %outgoing,
                    "failed to send response"
                );
                false
            }
        }
    }

    pub(crate) fn notify<F>(&self, event: &'static str, notify: F)
    where
        F: FnOnce(&dyn ExecutionReporter),
    {
        events::notify(self.reporter.as_ref(), event, notify);
    }
}

impl std::fmt::Debug for ExecutionLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionLink")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Common contract shared by every execution strategy.
pub trait Executer: Send + Sync + 'static {
    /// Static description of this executer.
    fn spec(&self) -> &ExecuterSpec;

    /// Case-folded command name served by this executer.
    fn command_name(&self) -> &str {
        self.spec().name()
    }

    /// Advertised priority.
    fn priority(&self) -> Priority {
        self.spec().priority()
    }

    /// Advertised timeout hint.
    fn timeout_hint(&self) -> Duration {
        self.spec().timeout_hint()
    }

    /// Whether a response must be sent for every invocation.
    fn response_required(&self) -> bool {
        self.spec().response_required()
    }

    /// Whether commands without parameters are rejected.
    fn parameters_required(&self) -> bool {
        self.spec().parameters_required()
    }

    /// Whether a new invocation would be rejected as busy.
    fn busy(&self) -> bool;

    /// Whether any invocation is currently executing.
    fn is_running(&self) -> bool;

    /// Aborts running invocations. Returns `true` if any was aborted.
    fn abort(&self) -> bool;

    /// Starts executing `command`. Must return quickly unless the strategy
    /// is synchronous.
    fn execute(&self, command: Command);

    /// Binds the executer to a manager.
    fn attach(&self, link: ExecutionLink);

    /// Unbinds the executer from its manager.
    fn detach(&self);

    /// Whether the executer is bound to a manager.
    fn is_attached(&self) -> bool;
}
