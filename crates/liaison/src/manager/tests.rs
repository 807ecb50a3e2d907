//! Unit tests for the command manager.

use std::sync::{Arc, Weak};
use std::time::Duration;

use rstest::{fixture, rstest};

use liaison_config::{Config, ConfigError};

use crate::correlation::ExchangeOutcome;
use crate::executer::{AsyncExecuter, CancellationToken, ExecuterSpec, SyncExecuter};
use crate::message::{Command, Response};
use crate::queue::QueueError;
use crate::test_support::{RecordingReporter, wait_until};
use crate::transport::{LoopbackTransport, ResponseInterceptor};

use super::*;

struct Harness {
    transport: Arc<LoopbackTransport>,
    reporter: Arc<RecordingReporter>,
    manager: Arc<CommandManager>,
}

impl Harness {
    /// Feeds answers to sent commands back through the inbound response queue.
    fn answer_with(&self, responder: fn(&Command) -> Option<Response>) {
        let manager: Weak<CommandManager> = Arc::downgrade(&self.manager);
        self.transport.respond_with(responder, move |response| {
            if let Some(manager) = manager.upgrade() {
                manager.enqueue_response(response).ok();
            }
        });
    }

    fn responses_named(&self, name: &str) -> Vec<Response> {
        self.transport
            .sent_responses()
            .into_iter()
            .filter(|response| response.name() == name)
            .collect()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.manager.stop().ok();
    }
}

fn test_config() -> Config {
    Config {
        module_name: "arm".to_owned(),
        poll_interval_ms: 1,
        default_timeout_ms: 200,
        shutdown_grace_ms: 50,
        ..Config::default()
    }
}

#[fixture]
fn harness() -> Harness {
    let transport = Arc::new(LoopbackTransport::new());
    let reporter = Arc::new(RecordingReporter::default());
    let manager =
        CommandManager::with_reporter(&test_config(), transport.clone(), reporter.clone())
            .expect("valid configuration");
    manager.start().expect("start manager");
    Harness {
        transport,
        reporter,
        manager: Arc::new(manager),
    }
}

#[rstest]
fn alive_always_succeeds(harness: Harness) {
    harness
        .manager
        .enqueue_command(Command::new("ALIVE", "").with_id(3))
        .expect("enqueue");
    assert!(wait_until(|| harness.responses_named("alive").len() == 1));
    let response = &harness.responses_named("alive")[0];
    assert!(response.success());
    assert_eq!(response.id(), 3);
    assert_eq!(response.routing().source.as_deref(), Some("arm"));
}

#[rstest]
fn busy_and_ready_report_flags(harness: Harness) {
    let manager = &harness.manager;
    manager.enqueue_command(Command::new("busy", "")).expect("enqueue");
    manager.enqueue_command(Command::new("ready", "")).expect("enqueue");
    assert!(wait_until(|| harness.transport.sent_responses().len() == 2));
    assert!(!harness.responses_named("busy")[0].success());
    assert!(!harness.responses_named("ready")[0].success());

    manager.set_busy(true);
    manager.set_ready(true);
    manager.enqueue_command(Command::new("busy", "")).expect("enqueue");
    manager.enqueue_command(Command::new("ready", "")).expect("enqueue");
    assert!(wait_until(|| harness.transport.sent_responses().len() == 4));
    assert!(harness.responses_named("busy")[1].success());
    assert!(harness.responses_named("ready")[1].success());
}

#[rstest]
fn bye_is_acknowledged_then_reported(harness: Harness) {
    harness
        .manager
        .enqueue_command(Command::new("bye", "").with_source("planner"))
        .expect("enqueue");
    assert!(wait_until(|| harness.reporter.terminations() == 1));
    let ack = &harness.responses_named("bye")[0];
    assert!(ack.success());
    assert_eq!(ack.routing().destination.as_deref(), Some("planner"));
}

#[rstest]
fn unhandled_command_gets_failure(harness: Harness) {
    harness
        .manager
        .enqueue_command(Command::new("fly", "high").with_id(8))
        .expect("enqueue");
    assert!(wait_until(|| harness.reporter.unhandled() == 1));
    let failure = &harness.responses_named("fly")[0];
    assert!(!failure.success());
    assert_eq!(failure.parameters(), "high");
    assert_eq!(failure.id(), 8);
}

#[rstest]
fn registered_executer_receives_command(harness: Harness) {
    harness
        .manager
        .add_executer(Arc::new(SyncExecuter::new(
            ExecuterSpec::new("grab"),
            |command: &Command, _: &CancellationToken| {
                Some(Response::from_command(command, true, "done"))
            },
        )))
        .expect("register grab");

    harness
        .manager
        .enqueue_command(Command::new("grab", "cup"))
        .expect("enqueue");
    assert!(wait_until(|| harness.responses_named("grab").len() == 1));
    let response = &harness.responses_named("grab")[0];
    assert_eq!(response.parameters(), "done");
    assert_eq!(response.routing().source.as_deref(), Some("arm"));
    assert!(wait_until(|| harness.reporter.finished() == 1));
}

#[rstest]
fn send_and_wait_pairs_through_response_loop(harness: Harness) {
    harness.answer_with(|command| Some(Response::success_for(command)));
    let id = harness.manager.next_command_id();
    let exchange = harness
        .manager
        .send_and_wait(Command::new("look", "left").with_id(id), None);
    assert_eq!(exchange.outcome, ExchangeOutcome::Paired);
    assert_eq!(exchange.response().id(), id);
}

#[rstest]
fn intercepted_responses_are_not_pooled(harness: Harness) {
    struct ClaimAll;

    impl ResponseInterceptor for ClaimAll {
        fn intercept(&self, _response: &Response) -> bool {
            true
        }
    }

    harness.manager.set_interceptor(Some(Arc::new(ClaimAll)));
    harness.answer_with(|command| Some(Response::success_for(command)));
    let exchange = harness
        .manager
        .send_and_wait(Command::new("look", ""), Some(Duration::from_millis(30)));
    assert_eq!(exchange.outcome, ExchangeOutcome::TimedOut);
    assert!(harness.manager.correlator().pool().is_empty());
}

#[rstest]
fn panicking_interceptor_does_not_stop_response_loop(harness: Harness) {
    struct Explodes;

    impl ResponseInterceptor for Explodes {
        fn intercept(&self, _response: &Response) -> bool {
            panic!("interceptor failure");
        }
    }

    harness.manager.set_interceptor(Some(Arc::new(Explodes)));
    harness.answer_with(|command| Some(Response::success_for(command)));
    let first = harness
        .manager
        .send_and_wait(Command::new("look", "").with_id(1), None);
    let second = harness
        .manager
        .send_and_wait(Command::new("look", "").with_id(2), None);
    assert_eq!(first.outcome, ExchangeOutcome::Paired);
    assert_eq!(second.outcome, ExchangeOutcome::Paired);
    assert_eq!(second.response().id(), 2);
}

#[rstest]
fn lifecycle_is_restartable(harness: Harness) {
    let manager = &harness.manager;
    assert!(matches!(manager.start(), Err(ManagerError::AlreadyRunning)));

    manager.stop().expect("stop");
    assert!(!manager.is_running());
    assert_eq!(
        manager.enqueue_command(Command::new("alive", "")),
        Err(QueueError::Stopped { queue: "command" })
    );
    manager.correlator().pool().push(Response::new("look", "stale", true));

    manager.start().expect("restart");
    assert!(manager.correlator().pool().is_empty());
    manager.enqueue_command(Command::new("alive", "")).expect("enqueue");
    assert!(wait_until(|| harness.responses_named("alive").len() == 1));
}

#[rstest]
fn command_loop_dispatches_nothing_once_shutdown_is_set(harness: Harness) {
    let manager = &harness.manager;
    manager.stop().expect("stop");
    manager.shared.commands.open();
    manager
        .enqueue_command(Command::new("alive", ""))
        .expect("enqueue");

    let shutdown = AtomicBool::new(true);
    dispatch::run_command_loop(&manager.shared, &shutdown);

    assert!(harness.responses_named("alive").is_empty());
    assert_eq!(manager.shared.commands.discard(), 1);
    manager.shared.commands.close();
}

#[rstest]
fn stop_aborts_executers_after_grace(harness: Harness) {
    let executer = Arc::new(AsyncExecuter::new(
        ExecuterSpec::new("track"),
        |_: &Command, cancel: &CancellationToken| {
            let _completed = cancel.sleep(Duration::from_secs(10));
            None
        },
    ));
    harness.manager.add_executer(executer.clone()).expect("register");
    harness
        .manager
        .enqueue_command(Command::new("track", "face"))
        .expect("enqueue");
    assert!(wait_until(|| executer.is_running()));

    harness.manager.stop().expect("stop");
    assert!(!executer.is_running());
    assert_eq!(harness.reporter.aborted(), 1);
    assert!(!harness.responses_named("track")[0].success());
}

#[rstest]
fn command_ids_wrap_after_255(harness: Harness) {
    let manager = &harness.manager;
    let first = manager.next_command_id();
    let skipped: Vec<i32> = (0..255).map(|_| manager.next_command_id()).collect();
    assert!(!skipped.contains(&first));
    assert_eq!(manager.next_command_id(), first);
    assert!((0..=255).contains(&first));
}

#[test]
fn invalid_configuration_is_rejected() {
    let config = Config {
        command_queue_capacity: 0,
        ..test_config()
    };
    let error = CommandManager::new(&config, Arc::new(LoopbackTransport::new()))
        .expect_err("zero capacity");
    assert!(matches!(
        error,
        ManagerError::Config(ConfigError::Zero {
            field: "command_queue_capacity"
        })
    ));
}
