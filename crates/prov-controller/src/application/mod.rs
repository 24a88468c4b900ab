//! Application layer use cases for the provisioning controller.
//!
//! Use cases in this layer orchestrate domain objects to fulfil a caller goal
//! ("find me the provisionable devices nearby", "give me a handle on device
//! X") and depend only on the transport traits in `prov_core`, never on a
//! concrete transport.  No radio calls, no sockets, no file system access.
//!
//! # Sub-modules
//!
//! - **`orchestrator`** – The caller-facing API: `search`, `stop_search`,
//!   `refresh`, `create_device`.  Opens transport handles, starts scans, and
//!   turns transport events into exactly one completion per request.
//!
//! - **`request_context`** – The single in-flight request slot: generation
//!   counter, `Idle → Scanning → Delivered | Cancelled` state machine, the
//!   pending completion, and result aggregation.

pub mod error;
pub mod orchestrator;
pub mod request_context;

pub use error::DiscoveryError;
