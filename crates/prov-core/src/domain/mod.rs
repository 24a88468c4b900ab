//! Domain entities for device provisioning.
//!
//! Nothing in here performs I/O.  The types describe *what* a provisionable
//! device is and *which* devices a scan is interested in; the controller and
//! the transports decide how to find them.

/// Device record, transport kind, security level, and credentials.
pub mod device;

/// Scan filter (name prefix + advertised service ids).
pub mod filter;
