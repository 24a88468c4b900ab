//! The provisionable device and the parameters attached to it.
//!
//! A [`DeviceRecord`] is created either by a transport (when a scan finds a
//! device) or by the controller itself (when a local-network device is
//! configured by name).  Before it reaches the caller the controller attaches
//! the [`SecurityLevel`], optional [`Credentials`], and a weak binding to the
//! transport handle that found it.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportHandle;

/// The medium used to reach a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Short-range radio scanning (BLE-style advertisements).
    RadioLink,
    /// The device hosts an access point the controller joins (SoftAP-style).
    LocalNetwork,
}

/// The cryptographic posture of the provisioning session that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityLevel {
    /// Plain-text session.
    None,
    /// Encrypted session keyed from a proof of possession.
    Encrypted,
    /// Encrypted session with a username/verifier, both sides authenticated.
    EncryptedMutualAuth,
}

impl SecurityLevel {
    /// Returns `true` when credentials are meaningful for this level.
    pub fn requires_credentials(self) -> bool {
        !matches!(self, SecurityLevel::None)
    }
}

/// Error returned when a transport or security name cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} `{value}`")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::RadioLink => "radio-link",
            TransportKind::LocalNetwork => "local-network",
        })
    }
}

impl FromStr for TransportKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "radio-link" | "radio" | "ble" => Ok(TransportKind::RadioLink),
            "local-network" | "local" | "softap" => Ok(TransportKind::LocalNetwork),
            _ => Err(ParseEnumError {
                kind: "transport",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SecurityLevel::None => "none",
            SecurityLevel::Encrypted => "encrypted",
            SecurityLevel::EncryptedMutualAuth => "encrypted-mutual-auth",
        })
    }
}

impl FromStr for SecurityLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "unsecure" => Ok(SecurityLevel::None),
            "encrypted" | "secure" | "secure1" => Ok(SecurityLevel::Encrypted),
            "encrypted-mutual-auth" | "mutual" | "secure2" => Ok(SecurityLevel::EncryptedMutualAuth),
            _ => Err(ParseEnumError {
                kind: "security level",
                value: s.to_string(),
            }),
        }
    }
}

/// Secrets consumed by the session-establishment step.
///
/// Only meaningful when the security level is not [`SecurityLevel::None`];
/// `network_password` only when the transport is [`TransportKind::LocalNetwork`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_of_possession: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_password: Option<String>,
}

impl Credentials {
    /// Builds the credentials for a record, enforcing the field invariants.
    ///
    /// Returns `None` when `level` carries no credentials or when every
    /// applicable field is empty.
    pub fn for_record(
        kind: TransportKind,
        level: SecurityLevel,
        proof_of_possession: Option<String>,
        username: Option<String>,
        network_password: Option<String>,
    ) -> Option<Self> {
        if !level.requires_credentials() {
            return None;
        }
        let network_password = match kind {
            TransportKind::LocalNetwork => network_password,
            TransportKind::RadioLink => None,
        };
        let creds = Self {
            proof_of_possession,
            username,
            network_password,
        };
        (!creds.is_empty()).then_some(creds)
    }

    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.proof_of_possession.is_none()
            && self.username.is_none()
            && self.network_password.is_none()
    }
}

/// A discovered or manually created provisionable device.
#[derive(Clone)]
pub struct DeviceRecord {
    pub name: String,
    pub transport_kind: TransportKind,
    pub security_level: SecurityLevel,
    pub credentials: Option<Credentials>,
    /// Service identifiers the device advertised during the scan.
    pub service_ids: Vec<String>,
    transport_binding: Option<Weak<dyn TransportHandle>>,
}

impl DeviceRecord {
    /// Creates an unbound record with no credentials.
    pub fn new(
        name: impl Into<String>,
        transport_kind: TransportKind,
        security_level: SecurityLevel,
    ) -> Self {
        Self {
            name: name.into(),
            transport_kind,
            security_level,
            credentials: None,
            service_ids: Vec::new(),
            transport_binding: None,
        }
    }

    /// Shorthand used by transports: a freshly advertised device.
    pub fn advertised(
        name: impl Into<String>,
        transport_kind: TransportKind,
        service_ids: Vec<String>,
    ) -> Self {
        Self {
            service_ids,
            ..Self::new(name, transport_kind, SecurityLevel::None)
        }
    }

    /// Returns `true` if the device advertised `service_id`.
    pub fn advertises(&self, service_id: &str) -> bool {
        self.service_ids.iter().any(|s| s == service_id)
    }

    /// Attaches a weak reference to the handle that discovered this device.
    pub fn bind_transport(&mut self, handle: &Arc<dyn TransportHandle>) {
        self.transport_binding = Some(Arc::downgrade(handle));
    }

    /// Returns the discovering handle if it is still alive.
    pub fn transport(&self) -> Option<Arc<dyn TransportHandle>> {
        self.transport_binding.as_ref().and_then(Weak::upgrade)
    }

    /// Returns `true` if the record was bound to a handle at some point.
    pub fn is_bound(&self) -> bool {
        self.transport_binding.is_some()
    }
}

impl PartialEq for DeviceRecord {
    fn eq(&self, other: &Self) -> bool {
        let same_binding = match (&self.transport_binding, &other.transport_binding) {
            (None, None) => true,
            (Some(a), Some(b)) => Weak::ptr_eq(a, b),
            _ => false,
        };
        self.name == other.name
            && self.transport_kind == other.transport_kind
            && self.security_level == other.security_level
            && self.credentials == other.credentials
            && self.service_ids == other.service_ids
            && same_binding
    }
}

impl fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("name", &self.name)
            .field("transport_kind", &self.transport_kind)
            .field("security_level", &self.security_level)
            .field("credentials", &self.credentials)
            .field("service_ids", &self.service_ids)
            .field("bound", &self.is_bound())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
