//! Inter-module command middleware for robot software components.
//!
//! Modules exchange short text commands and responses with their peers. This
//! crate turns the interleaved inbound stream into dispatched executer
//! invocations and paired request/response exchanges:
//!
//! - [`manager::CommandManager`] runs the two dispatch loops, answers the
//!   fixed system commands and exposes the send/wait surface.
//! - [`correlation::Correlator`] pairs sent commands with their responses,
//!   one at a time, in batches, or through a thread-owned parallel session.
//! - [`executer`] provides the synchronous, single-flight asynchronous and
//!   concurrent execution strategies behind a common [`executer::Executer`]
//!   contract.
//! - [`signature`] compiles declarative parameter shapes into a single
//!   matcher that validates, decodes and optionally dispatches to a handler.
//!
//! The socket transport is a collaborator: it implements
//! [`transport::Transport`] for outbound traffic and feeds inbound traffic to
//! [`manager::CommandManager::enqueue_command`] and
//! [`manager::CommandManager::enqueue_response`].

pub mod correlation;
pub mod events;
pub mod executer;
pub mod manager;
pub mod message;
pub mod queue;
pub mod registry;
pub mod signature;
pub mod telemetry;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use correlation::{BatchOutcome, CorrelationError, Correlator, Exchange, ExchangeOutcome};
pub use events::{ExecutionReporter, RejectReason, StructuredExecutionReporter};
pub use executer::{
    AsyncExecuter, CancellationToken, CommandTask, Executer, ExecuterSpec, MultipleExecuter,
    Priority, Reply, SignatureTask, SyncExecuter,
};
pub use manager::{CommandManager, ManagerError, SystemCommand};
pub use message::{Command, CommandResponsePair, OriginHandle, Response, UNSPECIFIED_ID};
pub use queue::QueueError;
pub use registry::{ExecuterRegistry, RegistryError};
pub use signature::{ParamKind, ParamValue, Signature, SignatureBuilder, SignatureError};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{ResponseInterceptor, Transport, TransportError};

#[cfg(test)]
mod tests;
