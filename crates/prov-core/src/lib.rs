//! # prov-core
//!
//! Shared library for the provisioning controller containing the device
//! model, scan filters, and the narrow interfaces through which a controller
//! talks to a physical transport.
//!
//! This crate has zero dependencies on radios, sockets, or async runtimes.
//! Transport implementations live in the controller's infrastructure layer
//! (or in test doubles) and plug in through the traits in [`transport`].
//!
//! # Architecture overview
//!
//! A controller discovers *provisionable devices* over a transport (a radio
//! link scan, or a local-network join), picks the security posture of the
//! upcoming provisioning session, and hands back a configured
//! [`DeviceRecord`] ready for credential exchange.
//!
//! - **`domain`** – Pure data: the device record, the transport and security
//!   enums, credentials, and the [`ScanFilter`] matching rule.
//!
//! - **`transport`** – The seams: [`TransportHandle`] (one discovery session),
//!   [`DiscoveryListener`] (how a handle reports results), and
//!   [`TransportFactory`] (how a controller obtains handles).

pub mod domain;
pub mod transport;

pub use domain::device::{Credentials, DeviceRecord, ParseEnumError, SecurityLevel, TransportKind};
pub use domain::filter::ScanFilter;
pub use transport::{DiscoveryListener, TransportError, TransportFactory, TransportHandle};
