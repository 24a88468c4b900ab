//! Transport seams.
//!
//! The controller never touches a radio or a socket directly.  It asks a
//! [`TransportFactory`] for a [`TransportHandle`], starts a scan on it, and
//! receives the outcome through a [`DiscoveryListener`].
//!
//! ```text
//! controller ──open()──► TransportFactory
//!            ──start_scan(filter, timeout, listener)──► TransportHandle
//!            ◄──on_found(records) / on_not_found()──── (any thread, later)
//! ```
//!
//! Implementations may invoke the listener from any thread and may keep
//! producing events after `stop_scan`; the controller is responsible for
//! ignoring events it no longer cares about.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::domain::device::{DeviceRecord, TransportKind};
use crate::domain::filter::ScanFilter;

/// Errors raised by a transport implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport kind has no implementation in this environment.
    #[error("transport {0} is not supported here")]
    Unsupported(TransportKind),
    /// The underlying medium is off or unavailable (e.g. radio powered down).
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    /// The scan could not be started.
    #[error("scan failed: {0}")]
    ScanFailed(String),
}

/// Receives the outcome of one scan.
pub trait DiscoveryListener: Send + Sync {
    /// One or more devices matched the scan filter.
    fn on_found(&self, devices: Vec<DeviceRecord>);
    /// The scan finished (timeout or explicit signal) with no match.
    fn on_not_found(&self);
}

/// One discovery session bound to a single transport kind.
pub trait TransportHandle: Send + Sync {
    /// The transport this handle scans on.
    fn kind(&self) -> TransportKind;

    /// Starts scanning; the outcome is reported to `listener` exactly once
    /// unless the scan is stopped first.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the scan cannot be started.
    fn start_scan(
        &self,
        filter: &ScanFilter,
        timeout: Duration,
        listener: Arc<dyn DiscoveryListener>,
    ) -> Result<(), TransportError>;

    /// Requests cancellation of the running scan.  Idempotent.
    fn stop_scan(&self);
}

impl fmt::Debug for dyn TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransportHandle({})", self.kind())
    }
}

/// Creates transport handles; injected into the controller so tests can
/// substitute doubles.
pub trait TransportFactory: Send + Sync {
    /// Opens a fresh handle for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unsupported`] or
    /// [`TransportError::Unavailable`] when no handle can be opened.
    fn open(&self, kind: TransportKind) -> Result<Arc<dyn TransportHandle>, TransportError>;
}
