//! prov-controller library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the controller do?
//!
//! 1. Scans a transport for provisionable devices, or builds a device record
//!    directly when the transport needs no scan.
//! 2. Keeps exactly one discovery request in flight and makes sure its
//!    caller hears back exactly once (found, not found, superseded, or
//!    cancelled).
//! 3. Attaches the chosen security level and credentials to every device it
//!    hands out, ready for the session-establishment step.

/// Application layer: the discovery orchestrator and its request state.
pub mod application;

/// Infrastructure layer: transports, configuration, and logging.
pub mod infrastructure;

pub use application::orchestrator::{
    CreateDeviceRequest, Orchestrator, OrchestratorConfig, RequestHandle, SearchRequest,
};
pub use application::request_context::{RequestId, RequestState};
pub use application::DiscoveryError;
pub use infrastructure::logging::enable_logging;
