//! Errors surfaced to discovery callers.

use prov_core::{TransportError, TransportKind};
use thiserror::Error;

/// Error delivered in the error slot of a completion (or returned by
/// `stop_search`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The requested transport has no discovery implementation here.
    #[error("discovery over {0} is not supported")]
    UnsupportedTransport(TransportKind),
    /// The scan finished with zero matching devices.
    #[error("no matching device found")]
    DeviceNotFound,
    /// `stop_search` was called while nothing was scanning.
    #[error("no active scan")]
    NoActiveScan,
    /// A newer request replaced this one before the transport answered.
    #[error("request superseded by a newer request")]
    Superseded,
    /// The scan was stopped before it produced a result.
    #[error("scan cancelled")]
    Cancelled,
    /// The transport failed to open or to start scanning.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
