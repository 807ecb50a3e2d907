//! Process-wide `tracing` subscriber set-up and the per-module span.
//!
//! Every middleware event is emitted under one of the
//! [`LogArea`](liaison_config::LogArea) targets.
//! Dispatch threads and executer workers run inside [`module_span`], so JSON
//! records carry the owning module's name without each call site repeating
//! it.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Span, Subscriber, info_span, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use liaison_config::{Config, LogFormat, MIDDLEWARE_TARGET};

static TELEMETRY: OnceCell<()> = OnceCell::new();

/// Proof that the global subscriber is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression is invalid.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Another subscriber was already installed by someone else.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Span naming the module whose manager or executer emits an event.
#[must_use]
pub fn module_span(module_name: &str) -> Span {
    info_span!(target: MIDDLEWARE_TARGET, "module", module = module_name)
}

/// Installs the global subscriber described by `config`.
///
/// Only the first successful call touches global state; later calls return a
/// new handle straight away.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for a malformed `log_filter` and
/// [`TelemetryError::Subscriber`] when a foreign subscriber is already set.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY
        .get_or_try_init(|| install(config))
        .map(|_| TelemetryHandle)
}

fn parse_filter(config: &Config) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))
}

fn install(config: &Config) -> Result<(), TelemetryError> {
    let filter = parse_filter(config)?;

    let builder = |env_filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(
            builder(filter)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .finish(),
        ),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    tracing::debug!(
        target: MIDDLEWARE_TARGET,
        format = %config.log_format(),
        "telemetry installed"
    );
    Ok(())
}
