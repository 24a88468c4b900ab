//! Process-wide logging facility.
//!
//! Installs a `tracing-subscriber` fmt subscriber once per process.  The
//! filter sits behind a [`reload`] layer so [`enable_logging`] can switch
//! output off and back on at runtime without reinstalling the subscriber.
//!
//! `RUST_LOG` takes precedence over the configured level, as in any other
//! `tracing` application.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

/// Error type for logging setup and toggling.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("logging is already initialised")]
    AlreadyInitialised,

    #[error("logging has not been initialised")]
    NotInitialised,

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to reload log filter: {0}")]
    Reload(#[from] reload::Error),

    #[error("failed to install subscriber: {0}")]
    Init(String),
}

struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
    /// Filter restored by `enable_logging(true)`.
    directives: String,
}

static CONTROL: OnceLock<LogControl> = OnceLock::new();
static ENABLED: AtomicBool = AtomicBool::new(false);

/// Installs the global subscriber with `level` as the default filter.
///
/// # Errors
///
/// Returns [`LoggingError::AlreadyInitialised`] on a second call,
/// [`LoggingError::Filter`] if the effective filter does not parse, and
/// [`LoggingError::Init`] if another global subscriber is already set.
pub fn init_logging(level: &str, enabled: bool) -> Result<(), LoggingError> {
    if CONTROL.get().is_some() {
        return Err(LoggingError::AlreadyInitialised);
    }

    let directives = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| level.to_string());
    let initial = if enabled {
        EnvFilter::try_new(&directives)?
    } else {
        EnvFilter::new("off")
    };

    let (filter, handle) = reload::Layer::new(initial);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    CONTROL
        .set(LogControl { handle, directives })
        .map_err(|_| LoggingError::AlreadyInitialised)?;
    ENABLED.store(enabled, Ordering::SeqCst);
    Ok(())
}

/// Turns log output on or off for the whole process.
///
/// # Errors
///
/// Returns [`LoggingError::NotInitialised`] if [`init_logging`] has not run.
pub fn enable_logging(enabled: bool) -> Result<(), LoggingError> {
    let control = CONTROL.get().ok_or(LoggingError::NotInitialised)?;
    let filter = if enabled {
        EnvFilter::try_new(&control.directives)?
    } else {
        EnvFilter::new("off")
    };
    control.handle.reload(filter)?;
    ENABLED.store(enabled, Ordering::SeqCst);
    Ok(())
}

/// `true` while log output is switched on.
pub fn is_logging_enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
