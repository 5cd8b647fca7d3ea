//! Tracing subscriber setup.
//!
//! Debug mode logs everything from `laconic` to stdout with source locations.
//! Otherwise only warnings and errors are appended to the configured log
//! file. `RUST_LOG` overrides the level in both modes.

use std::fs::OpenOptions;
use std::sync::Mutex;

use sentry::integrations::tracing::{self as sentry_tracing, EventFilter};
use thiserror::Error;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LaconicConfig;

/// Errors that can occur while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Could not open log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// What Sentry makes of a log line at `level` from `target`.
///
/// Request errors are captured by `report_error` and failed responses are
/// logged again by the trace layer, so those lines only become breadcrumbs.
fn sentry_filter_for(level: tracing::Level, target: &str) -> EventFilter {
    if target == "laconic::error" || target.starts_with("tower_http::") {
        return EventFilter::Breadcrumb;
    }
    match level {
        tracing::Level::ERROR => EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => EventFilter::Breadcrumb,
        _ => EventFilter::Ignore,
    }
}

fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> EventFilter {
    sentry_filter_for(*metadata.level(), metadata.target())
}

/// Initialize Sentry if `SENTRY_DSN` is configured.
///
/// Events are tagged with `release` (e.g. `shop-api@1.2.0`) and with the
/// `development` environment in debug mode. The returned guard must be kept
/// alive for events to be delivered.
#[must_use]
pub fn init_sentry(config: &LaconicConfig, release: &str) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let environment = if config.debug { "development" } else { "production" };
    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: Some(release.to_string().into()),
            environment: Some(environment.into()),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!(release, environment, "Sentry initialized");
    Some(guard)
}

/// Default filter directive for the given mode.
#[must_use]
pub const fn default_directive(debug: bool) -> &'static str {
    if debug {
        "laconic=debug,laconic_cli=debug,tower_http=debug"
    } else {
        "laconic=warn,laconic_cli=warn"
    }
}

/// Install the global tracing subscriber.
///
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place.
///
/// # Errors
///
/// Returns `LoggingError` if the log file cannot be opened.
pub fn init_tracing(config: &LaconicConfig) -> Result<(), LoggingError> {
    // Defaults to the mode's level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(config.debug).into());

    let fmt_layer = if config.debug {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_filename)
            .map_err(|source| LoggingError::LogFile {
                path: config.log_filename.display().to_string(),
                source,
            })?;
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .boxed()
    };

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }

    Ok(())
}
