//! Infrastructure layer for the controller.
//!
//! Contains the adapters the application layer is wired to at startup:
//! transport implementations, configuration file storage, and the logging
//! facility.
//!
//! **Dependency rule**: this layer may depend on `application` and `prov_core`,
//! but MUST NOT be imported by the `application` layer.

pub mod logging;
pub mod storage;
pub mod transport;
