//! Bodies of the command and response consumer loops.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::correlation::Correlator;
use crate::executer::ExecutionLink;
use crate::message::{Command, Response};
use crate::queue::InboundQueue;
use crate::registry::ExecuterRegistry;
use crate::transport::ResponseInterceptor;

use super::DISPATCH_TARGET;
use super::system::SystemCommand;

/// State shared between the manager handle and its loops.
pub(super) struct Shared {
    pub(super) poll_interval: Duration,
    pub(super) registry: ExecuterRegistry,
    pub(super) correlator: Correlator,
    pub(super) commands: InboundQueue<Command>,
    pub(super) responses: InboundQueue<Response>,
    pub(super) interceptor: RwLock<Option<Arc<dyn ResponseInterceptor>>>,
    pub(super) link: ExecutionLink,
    pub(super) busy: AtomicBool,
    pub(super) ready: AtomicBool,
}

pub(super) fn run_command_loop(shared: &Shared, shutdown: &AtomicBool) {
    info!(target: DISPATCH_TARGET, "command loop active");
    while !shutdown.load(Ordering::SeqCst) {
        let Some(command) = shared.commands.pop(shared.poll_interval) else {
            continue;
        };
        if shutdown.load(Ordering::SeqCst) {
            debug!(target: DISPATCH_TARGET, command = %command, "command discarded at shutdown");
            break;
        }
        dispatch_command(shared, command);
    }
    debug!(target: DISPATCH_TARGET, "command loop stopped");
}

pub(super) fn run_response_loop(shared: &Shared, shutdown: &AtomicBool) {
    info!(target: DISPATCH_TARGET, "response loop active");
    while !shutdown.load(Ordering::SeqCst) {
        let Some(response) = shared.responses.pop(shared.poll_interval) else {
            continue;
        };
        if shutdown.load(Ordering::SeqCst) {
            debug!(target: DISPATCH_TARGET, response = %response, "response discarded at shutdown");
            break;
        }
        route_response(shared, response);
    }
    debug!(target: DISPATCH_TARGET, "response loop stopped");
}

/// Answers system commands inline and hands everything else to its executer.
pub(super) fn dispatch_command(shared: &Shared, command: Command) {
    trace!(target: DISPATCH_TARGET, command = %command, "dispatching command");
    if let Some(system) = SystemCommand::from_name(command.name()) {
        answer_system(shared, system, &command);
        return;
    }
    match shared.registry.get(command.name()) {
        Some(executer) => executer.execute(command),
        None => {
            shared.link.notify("command_unhandled", |reporter| {
                reporter.command_unhandled(&command);
            });
            shared.link.send_response(&Response::failure_for(&command));
        }
    }
}

fn answer_system(shared: &Shared, system: SystemCommand, command: &Command) {
    let success = match system {
        SystemCommand::Alive | SystemCommand::Bye => true,
        SystemCommand::Busy => shared.busy.load(Ordering::SeqCst),
        SystemCommand::Ready => shared.ready.load(Ordering::SeqCst),
    };
    shared
        .link
        .send_response(&Response::from_command(command, success, command.parameters()));
    if system == SystemCommand::Bye {
        shared.link.notify("termination_requested", |reporter| {
            reporter.termination_requested(command);
        });
    }
}

/// Offers `response` to the interceptor, pooling it when unclaimed.
pub(super) fn route_response(shared: &Shared, response: Response) {
    let interceptor = shared
        .interceptor
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    if let Some(interceptor) = interceptor
        && offer(interceptor.as_ref(), &response)
    {
        trace!(target: DISPATCH_TARGET, response = %response, "response intercepted");
        return;
    }
    shared.correlator.pool().push(response);
}

/// Asks `interceptor` to claim `response`. A panic counts as "not claimed".
fn offer(interceptor: &dyn ResponseInterceptor, response: &Response) -> bool {
    panic::catch_unwind(AssertUnwindSafe(|| interceptor.intercept(response))).unwrap_or_else(
        |_| {
            warn!(
                target: DISPATCH_TARGET,
                response = %response,
                "response interceptor panicked; response pooled"
            );
            false
        },
    )
}
