//! Pairs sent commands with the responses that answer them.
//!
//! Inbound responses land in a shared [`ResponsePool`]. Waiters poll the
//! pool on a fixed tick, claiming a paired response under the pool lock and
//! never holding it across the sleep. A wait either claims a response or
//! ends with a synthetic failure; it never outlives its timeout.
//!
//! Pairing is first-found: with two same-named commands in flight that both
//! carry the unspecified id, whichever waiter polls first takes the oldest
//! response.

mod errors;
mod pool;
mod session;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use strum::Display;
use tracing::{debug, warn};

use crate::message::{Command, CommandResponsePair, Response};
use crate::transport::{Transport, TransportError};

pub use self::errors::CorrelationError;
pub use self::pool::ResponsePool;

use self::session::ParallelSession;

pub(crate) const CORRELATION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::correlation");

/// How a correlated exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ExchangeOutcome {
    /// A response was claimed from the pool.
    Paired,
    /// No paired response arrived in time.
    TimedOut,
    /// The command could not be written to the transport.
    SendFailed,
}

/// One command and the response it ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Command and paired or synthetic response.
    pub pair: CommandResponsePair,
    /// How the exchange ended.
    pub outcome: ExchangeOutcome,
}

impl Exchange {
    fn paired(command: Command, response: Response) -> Self {
        Self {
            pair: CommandResponsePair::new(command, response),
            outcome: ExchangeOutcome::Paired,
        }
    }

    fn failed(command: Command, outcome: ExchangeOutcome) -> Self {
        Self {
            pair: CommandResponsePair::failed(command),
            outcome,
        }
    }

    /// Whether a real response was claimed.
    #[must_use]
    pub fn is_paired(&self) -> bool {
        self.outcome == ExchangeOutcome::Paired
    }

    /// The command that was sent.
    #[must_use]
    pub fn command(&self) -> &Command {
        &self.pair.command
    }

    /// The claimed or synthetic response.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.pair.response
    }

    /// Consumes the exchange, returning its pair.
    #[must_use]
    pub fn into_pair(self) -> CommandResponsePair {
        self.pair
    }
}

/// Result of a batched wait: one exchange per input command, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    exchanges: Vec<Exchange>,
}

impl BatchOutcome {
    /// Whether at least one command was paired.
    #[must_use]
    pub fn any_paired(&self) -> bool {
        self.exchanges.iter().any(Exchange::is_paired)
    }

    /// Number of paired commands.
    #[must_use]
    pub fn paired_count(&self) -> usize {
        self.exchanges.iter().filter(|e| e.is_paired()).count()
    }

    /// Exchanges in input order.
    #[must_use]
    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    /// Consumes the outcome, returning the pairs in input order.
    #[must_use]
    pub fn into_pairs(self) -> Vec<CommandResponsePair> {
        self.exchanges.into_iter().map(Exchange::into_pair).collect()
    }
}

/// Sends commands and waits for their responses.
pub struct Correlator {
    transport: Arc<dyn Transport>,
    pool: Arc<ResponsePool>,
    poll_interval: Duration,
    source: Option<String>,
    session: ParallelSession,
}

impl Correlator {
    /// Creates a correlator sending through `transport` and claiming from
    /// `pool`, polling every `poll_interval`.
    pub fn new(
        transport: Arc<dyn Transport>,
        pool: Arc<ResponsePool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            transport,
            pool,
            poll_interval,
            source: None,
            session: ParallelSession::default(),
        }
    }

    /// Stamps `source` on outgoing commands that do not name one.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Pending-response pool shared with the response loop.
    #[must_use]
    pub fn pool(&self) -> &Arc<ResponsePool> {
        &self.pool
    }

    /// Poll tick used by every wait.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn stamp(&self, mut command: Command) -> Command {
        if let (Some(source), None) = (&self.source, &command.routing().source) {
            command.routing_mut().source = Some(source.clone());
        }
        command
    }

    /// Writes `command` without waiting, returning the command as sent.
    ///
    /// # Errors
    ///
    /// Returns the transport's error when the write fails.
    pub fn send(&self, command: Command) -> Result<Command, TransportError> {
        let stamped = self.stamp(command);
        self.transport.send_command(&stamped)?;
        Ok(stamped)
    }

    fn try_send(&self, command: Command) -> Result<Command, Command> {
        let stamped = self.stamp(command);
        match self.transport.send_command(&stamped) {
            Ok(()) => Ok(stamped),
            Err(error) => {
                warn!(
                    target: CORRELATION_TARGET,
                    %error,
                    command = %stamped,
                    "failed to send command"
                );
                Err(stamped)
            }
        }
    }

    /// Sends `command` and waits up to `timeout` for its response.
    #[must_use]
    pub fn send_and_wait(&self, command: Command, timeout: Duration) -> Exchange {
        match self.try_send(command) {
            Ok(sent) => self.wait_for_response(sent, timeout),
            Err(unsent) => Exchange::failed(unsent, ExchangeOutcome::SendFailed),
        }
    }

    /// Waits up to `timeout` for the response to an already-sent `command`.
    #[must_use]
    pub fn wait_for_response(&self, command: Command, timeout: Duration) -> Exchange {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if let Some(response) = self.pool.claim(&command) {
                return Exchange::paired(command, response);
            }
            if !self.pause_until(deadline) {
                break;
            }
        }
        debug!(
            target: CORRELATION_TARGET,
            command = %command,
            timeout_ms = timeout.as_millis(),
            "timed out waiting for response"
        );
        Exchange::failed(command, ExchangeOutcome::TimedOut)
    }

    /// Sends a batch of distinctly named commands and waits for all of them.
    ///
    /// The batch is validated before anything is written. Responses are
    /// claimed with a sort-merge scan so each command gets a fair chance to
    /// pair on every tick.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::EmptyBatch`] for an empty batch and
    /// [`CorrelationError::DuplicateName`] when two commands share a name.
    pub fn multiple_send_and_wait(
        &self,
        commands: Vec<Command>,
        timeout: Duration,
    ) -> Result<BatchOutcome, CorrelationError> {
        if commands.is_empty() {
            return Err(CorrelationError::EmptyBatch);
        }
        let order = name_order(&commands)?;

        let deadline = Instant::now().checked_add(timeout);
        let mut sent: Vec<Option<Command>> = Vec::with_capacity(commands.len());
        let mut unsent: Vec<Option<Command>> = Vec::with_capacity(commands.len());
        for command in commands {
            match self.try_send(command) {
                Ok(delivered) => {
                    sent.push(Some(delivered));
                    unsent.push(None);
                }
                Err(refused) => {
                    sent.push(None);
                    unsent.push(Some(refused));
                }
            }
        }

        let pending: Vec<(usize, &Command)> = order
            .iter()
            .filter_map(|&slot| sent.get(slot)?.as_ref().map(|command| (slot, command)))
            .collect();
        let mut claimed: Vec<Option<Response>> = vec![None; sent.len()];
        let mut outstanding = pending.len();
        while outstanding > 0 {
            outstanding -= self.pool.claim_sorted(&pending, &mut claimed);
            if outstanding == 0 || !self.pause_until(deadline) {
                break;
            }
        }
        debug!(
            target: CORRELATION_TARGET,
            sent = pending.len(),
            unanswered = outstanding,
            "batched wait finished"
        );

        let exchanges = sent
            .into_iter()
            .zip(unsent)
            .zip(claimed)
            .filter_map(|((delivered, refused), reply)| match (delivered, reply) {
                (Some(command), Some(response)) => Some(Exchange::paired(command, response)),
                (Some(command), None) => Some(Exchange::failed(command, ExchangeOutcome::TimedOut)),
                (None, _) => {
                    refused.map(|command| Exchange::failed(command, ExchangeOutcome::SendFailed))
                }
            })
            .collect();
        Ok(BatchOutcome { exchanges })
    }

    /// Opens the parallel-wait session for the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::SessionBusy`] immediately when any thread
    /// already holds the session.
    pub fn begin_parallel_send_and_wait(&self) -> Result<(), CorrelationError> {
        self.session.begin()?;
        debug!(target: CORRELATION_TARGET, "parallel-wait session opened");
        Ok(())
    }

    /// Queues `command` in the caller's session, returning the queue length.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::NoSession`] or
    /// [`CorrelationError::SessionNotOwned`] for callers without a session,
    /// and [`CorrelationError::DuplicateName`] when the name is already
    /// queued.
    pub fn enqueue_command(&self, command: Command) -> Result<usize, CorrelationError> {
        self.session.enqueue(command)
    }

    /// Sends the queued commands as one batch, then releases the session.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::NoSession`] or
    /// [`CorrelationError::SessionNotOwned`] for callers without a session,
    /// and [`CorrelationError::EmptyBatch`] if nothing was queued. The
    /// session is released in the last case too.
    pub fn commit_parallel_send_and_wait(
        &self,
        timeout: Duration,
    ) -> Result<BatchOutcome, CorrelationError> {
        let commands = self.session.drain()?;
        let outcome = self.multiple_send_and_wait(commands, timeout);
        self.session.release()?;
        debug!(target: CORRELATION_TARGET, "parallel-wait session committed");
        outcome
    }

    /// Drops the caller's session without sending, returning how many
    /// commands were discarded.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::NoSession`] or
    /// [`CorrelationError::SessionNotOwned`] for callers without a session.
    pub fn cancel_parallel_send_and_wait(&self) -> Result<usize, CorrelationError> {
        self.session.release()
    }

    /// Whether any thread holds the parallel-wait session.
    #[must_use]
    pub fn parallel_session_open(&self) -> bool {
        self.session.is_open()
    }

    /// Whether the calling thread holds the parallel-wait session.
    #[must_use]
    pub fn owns_parallel_session(&self) -> bool {
        self.session.is_owned_by_current()
    }

    /// Sleeps one tick, clipped to `deadline`. Returns `false` once the
    /// deadline has passed. `None` is a deadline too far away to represent.
    fn pause_until(&self, deadline: Option<Instant>) -> bool {
        let tick = match deadline {
            Some(limit) => {
                let now = Instant::now();
                if now >= limit {
                    return false;
                }
                self.poll_interval.min(limit - now)
            }
            None => self.poll_interval,
        };
        thread::sleep(tick);
        true
    }
}

/// Input slots ordered by command name.
///
/// # Errors
///
/// Returns [`CorrelationError::DuplicateName`] when two commands share a name.
fn name_order(commands: &[Command]) -> Result<Vec<usize>, CorrelationError> {
    let mut names: Vec<(&str, usize)> = commands
        .iter()
        .enumerate()
        .map(|(slot, command)| (command.name(), slot))
        .collect();
    names.sort_unstable();
    let duplicate = names.windows(2).find_map(|pair| match pair {
        [(first, _), (second, _)] if first == second => Some((*first).to_owned()),
        _ => None,
    });
    match duplicate {
        Some(name) => Err(CorrelationError::DuplicateName { name }),
        None => Ok(names.into_iter().map(|(_, slot)| slot).collect()),
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("poll_interval", &self.poll_interval)
            .field("source", &self.source)
            .field("pending", &self.pool.len())
            .field("session_queued", &self.session.queued())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use rstest::{fixture, rstest};

    use crate::transport::{LoopbackTransport, MockTransport};

    use super::*;

    const TICK: Duration = Duration::from_millis(2);
    const SHORT: Duration = Duration::from_millis(40);

    struct Harness {
        transport: Arc<LoopbackTransport>,
        correlator: Arc<Correlator>,
    }

    impl Harness {
        /// Answers commands whose name is in `names`, echoing their id.
        fn answer(&self, names: &'static [&'static str]) {
            let pool = Arc::clone(self.correlator.pool());
            self.transport.respond_with(
                move |command| {
                    names
                        .iter()
                        .any(|name| *name == command.name())
                        .then(|| Response::success_for(command))
                },
                move |response| pool.push(response),
            );
        }
    }

    #[fixture]
    fn harness() -> Harness {
        let transport = Arc::new(LoopbackTransport::new());
        let correlator = Correlator::new(transport.clone(), Arc::new(ResponsePool::new()), TICK)
            .with_source("planner");
        Harness {
            transport,
            correlator: Arc::new(correlator),
        }
    }

    #[rstest]
    fn send_and_wait_claims_paired_response(harness: Harness) {
        harness.answer(&["grab"]);
        let exchange = harness
            .correlator
            .send_and_wait(Command::new("grab", "cup").with_id(5), SHORT);

        assert!(exchange.is_paired());
        assert_eq!(exchange.response().id(), 5);
        assert!(harness.correlator.pool().is_empty());
        let sent = harness.transport.sent_commands();
        assert_eq!(sent[0].routing().source.as_deref(), Some("planner"));
    }

    #[rstest]
    fn send_and_wait_times_out_with_synthetic_failure(harness: Harness) {
        let command = Command::new("grab", "cup").with_id(5);
        let started = Instant::now();
        let exchange = harness.correlator.send_and_wait(command, SHORT);

        assert!(started.elapsed() < SHORT + Duration::from_millis(200));
        assert_eq!(exchange.outcome, ExchangeOutcome::TimedOut);
        let failure = exchange.response();
        assert_eq!(failure.name(), "grab");
        assert_eq!(failure.parameters(), "cup");
        assert_eq!(failure.id(), 5);
        assert!(!failure.success());
    }

    #[test]
    fn send_failure_returns_immediately() {
        let mut transport = MockTransport::new();
        transport
            .expect_send_command()
            .times(1)
            .returning(|_| Err(TransportError::Closed));
        let correlator = Correlator::new(
            Arc::new(transport),
            Arc::new(ResponsePool::new()),
            TICK,
        );

        let started = Instant::now();
        let exchange = correlator.send_and_wait(Command::new("look", ""), Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(exchange.outcome, ExchangeOutcome::SendFailed);
        assert!(!exchange.response().success());
    }

    #[rstest]
    fn response_goes_to_one_waiter_only(harness: Harness) {
        let command = Command::new("look", "").with_id(1);
        let (results, collected) = mpsc::channel();
        for _ in 0..2 {
            let correlator = Arc::clone(&harness.correlator);
            let command = command.clone();
            let results = results.clone();
            thread::spawn(move || {
                let exchange = correlator.wait_for_response(command, Duration::from_millis(200));
                results.send(exchange.is_paired()).expect("report result");
            });
        }
        harness
            .correlator
            .pool()
            .push(Response::new("look", "", true).with_id(1));

        let paired: Vec<bool> = collected.iter().take(2).collect();
        assert_eq!(paired.iter().filter(|paired| **paired).count(), 1);
    }

    #[rstest]
    fn batch_with_duplicate_names_sends_nothing(harness: Harness) {
        let error = harness
            .correlator
            .multiple_send_and_wait(
                vec![
                    Command::new("grab", "a"),
                    Command::new("look", ""),
                    Command::new("Grab", "b"),
                ],
                SHORT,
            )
            .expect_err("duplicate names");
        assert_eq!(
            error,
            CorrelationError::DuplicateName {
                name: "grab".to_owned()
            }
        );
        assert!(harness.transport.sent_commands().is_empty());
    }

    #[rstest]
    fn batch_reports_partial_pairing_in_input_order(harness: Harness) {
        harness.answer(&["say", "look"]);
        let outcome = harness
            .correlator
            .multiple_send_and_wait(
                vec![
                    Command::new("move", "1 2"),
                    Command::new("say", "hello"),
                    Command::new("look", "left"),
                ],
                SHORT,
            )
            .expect("valid batch");

        assert!(outcome.any_paired());
        assert_eq!(outcome.paired_count(), 2);
        let outcomes: Vec<(&str, ExchangeOutcome)> = outcome
            .exchanges()
            .iter()
            .map(|exchange| (exchange.command().name(), exchange.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("move", ExchangeOutcome::TimedOut),
                ("say", ExchangeOutcome::Paired),
                ("look", ExchangeOutcome::Paired),
            ]
        );
        assert!(!outcome.exchanges()[0].response().success());
        assert_eq!(outcome.exchanges()[0].response().parameters(), "1 2");
    }

    #[rstest]
    fn empty_batch_is_rejected(harness: Harness) {
        assert_eq!(
            harness.correlator.multiple_send_and_wait(Vec::new(), SHORT),
            Err(CorrelationError::EmptyBatch)
        );
    }

    #[rstest]
    fn parallel_session_commits_queued_batch(harness: Harness) {
        harness.answer(&["grab", "look"]);
        let correlator = &harness.correlator;
        correlator.begin_parallel_send_and_wait().expect("begin");
        correlator.enqueue_command(Command::new("grab", "")).expect("enqueue grab");
        correlator.enqueue_command(Command::new("look", "")).expect("enqueue look");

        let outcome = correlator
            .commit_parallel_send_and_wait(SHORT)
            .expect("commit");
        assert_eq!(outcome.paired_count(), 2);
        assert!(!correlator.parallel_session_open());
    }

    #[rstest]
    fn foreign_begin_fails_without_blocking(harness: Harness) {
        harness.correlator.begin_parallel_send_and_wait().expect("begin");
        let correlator = Arc::clone(&harness.correlator);
        let started = Instant::now();
        let result = thread::spawn(move || correlator.begin_parallel_send_and_wait())
            .join()
            .expect("join");
        assert_eq!(result, Err(CorrelationError::SessionBusy));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(harness.correlator.owns_parallel_session());
        assert_eq!(harness.correlator.cancel_parallel_send_and_wait(), Ok(0));
    }

    #[rstest]
    fn unbounded_wait_claims_pooled_response(harness: Harness) {
        harness
            .correlator
            .pool()
            .push(Response::new("look", "", true));
        let exchange = harness
            .correlator
            .send_and_wait(Command::new("look", ""), Duration::MAX);
        assert!(exchange.is_paired());
    }

    #[rstest]
    fn unbounded_batch_returns_once_answered(harness: Harness) {
        harness.answer(&["grab", "look"]);
        let outcome = harness
            .correlator
            .multiple_send_and_wait(
                vec![Command::new("grab", ""), Command::new("look", "")],
                Duration::MAX,
            )
            .expect("valid batch");
        assert_eq!(outcome.paired_count(), 2);
    }

    #[rstest]
    fn empty_commit_still_releases(harness: Harness) {
        harness.correlator.begin_parallel_send_and_wait().expect("begin");
        assert_eq!(
            harness.correlator.commit_parallel_send_and_wait(SHORT),
            Err(CorrelationError::EmptyBatch)
        );
        assert!(!harness.correlator.parallel_session_open());
    }
}
