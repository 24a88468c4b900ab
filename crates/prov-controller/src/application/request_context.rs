//! RequestContext: the single in-flight discovery request.
//!
//! The controller keeps exactly one request slot.  Each request gets a fresh
//! generation number; transport events are tagged with the generation they
//! were started for, and anything carrying a stale generation is dropped.
//!
//! # Request lifecycle
//!
//! ```text
//!          search / create_device (radio)
//! Idle ─────────────────────────────────► Scanning
//!  ▲                                        │   │
//!  │   on_found / on_not_found              │   │ stop_search / cancel
//!  │          ┌─────────────────────────────┘   │
//!  │          ▼                                 ▼
//!  └──── Delivered                          Cancelled
//!          (next request starts from any terminal state)
//! ```
//!
//! The pending completion is a single enum slot, so a list-search callback
//! and a single-device callback can never be waiting at the same time.
//!
//! All methods here are synchronous and never invoke a completion; the
//! orchestrator takes completions out under the lock and calls them after
//! releasing it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use prov_core::{Credentials, DeviceRecord, ScanFilter, SecurityLevel, TransportHandle, TransportKind};
use tracing::debug;

use super::DiscoveryError;

/// Callback for a list search.
pub type ListCompletion = Box<dyn FnOnce(Result<Vec<DeviceRecord>, DiscoveryError>) + Send>;

/// Callback for a single-device request.
pub type DeviceCompletion = Box<dyn FnOnce(Result<DeviceRecord, DiscoveryError>) + Send>;

/// Identifies one request; equal to the context generation it was issued at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn generation(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the current request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    /// No scan has run for the current request (or it failed to start).
    #[default]
    Idle,
    /// A transport scan is running and a completion is waiting.
    Scanning,
    /// A transport event was delivered to the completion.
    Delivered,
    /// The scan was stopped before the transport answered.
    Cancelled,
}

/// The waiting caller of the current request.
pub enum Completion {
    List(ListCompletion),
    Device {
        /// Name the caller asked for; preferred over other prefix matches.
        target: String,
        callback: DeviceCompletion,
    },
}

impl Completion {
    /// Invokes the callback with `error`.
    pub fn fail(self, error: DiscoveryError) {
        match self {
            Completion::List(callback) => callback(Err(error)),
            Completion::Device { callback, .. } => callback(Err(error)),
        }
    }

    /// Invokes the callback with the aggregated scan result.
    ///
    /// An empty list is reported as [`DiscoveryError::DeviceNotFound`].
    pub fn deliver(self, devices: &[DeviceRecord]) {
        match self {
            Completion::List(callback) if devices.is_empty() => {
                callback(Err(DiscoveryError::DeviceNotFound))
            }
            Completion::List(callback) => callback(Ok(devices.to_vec())),
            Completion::Device { target, callback } => {
                let chosen = devices
                    .iter()
                    .find(|d| d.name == target)
                    .or_else(|| devices.first())
                    .cloned();
                callback(chosen.ok_or(DiscoveryError::DeviceNotFound))
            }
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::List(_) => f.write_str("Completion::List"),
            Completion::Device { target, .. } => {
                f.debug_struct("Completion::Device").field("target", target).finish()
            }
        }
    }
}

/// What a transport reported for a scan.
#[derive(Debug)]
pub enum ScanOutcome {
    Found(Vec<DeviceRecord>),
    NotFound,
}

/// Filter, transport, and security configuration of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParams {
    pub filter: ScanFilter,
    pub transport_kind: TransportKind,
    pub security_level: SecurityLevel,
    pub credentials: Option<Credentials>,
}

/// A request that has been pushed out of the slot.
///
/// [`Detached::finish`] must be called with the context lock released.
#[derive(Debug, Default)]
pub struct Detached {
    completion: Option<Completion>,
    handle: Option<Arc<dyn TransportHandle>>,
}

impl Detached {
    /// Stops the detached scan (if any) and tells its caller why.
    pub fn finish(self, error: DiscoveryError) {
        if let Some(handle) = self.handle {
            handle.stop_scan();
        }
        if let Some(completion) = self.completion {
            completion.fail(error);
        }
    }

    /// Returns `true` if a caller was still waiting.
    pub fn had_waiter(&self) -> bool {
        self.completion.is_some()
    }
}

/// Result of feeding a transport event (or the end of `start_scan`) into the
/// context.
#[derive(Debug)]
pub enum Resolution {
    /// The event belongs to a request that is no longer scanning.
    Stale,
    /// Nothing to deliver yet.
    Pending,
    /// Deliver these devices to this completion.
    Ready(Completion, Vec<DeviceRecord>),
}

/// The single request slot.
pub struct RequestContext {
    generation: u64,
    state: RequestState,
    params: RequestParams,
    active_handle: Option<Arc<dyn TransportHandle>>,
    completion: Option<Completion>,
    devices: Vec<DeviceRecord>,
    /// `start_scan` has not returned yet; events are parked until it does.
    starting: bool,
    parked: Option<ScanOutcome>,
}

impl RequestContext {
    /// Creates an idle context whose stored configuration is `params`.
    pub fn new(params: RequestParams) -> Self {
        Self {
            generation: 0,
            state: RequestState::Idle,
            params,
            active_handle: None,
            completion: None,
            devices: Vec::new(),
            starting: false,
            parked: None,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn current_id(&self) -> RequestId {
        RequestId(self.generation)
    }

    /// Configuration in effect for the current (or next) request.
    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    /// Devices from the most recent delivery.
    pub fn devices(&self) -> &[DeviceRecord] {
        &self.devices
    }

    pub fn is_current(&self, id: RequestId) -> bool {
        id.0 == self.generation
    }

    /// `true` if `id` is current and still waiting on the transport.
    pub fn is_scanning(&self, id: RequestId) -> bool {
        self.is_current(id) && self.state == RequestState::Scanning
    }

    /// Starts a new request with `params`, detaching whatever was in flight.
    ///
    /// The active transport handle is kept (devices from the last delivery
    /// stay bound to it) until [`arm`](Self::arm) replaces it.
    pub fn supersede(&mut self, params: RequestParams) -> (RequestId, Detached) {
        let scanning = self.state == RequestState::Scanning;
        let detached = Detached {
            completion: self.completion.take(),
            handle: if scanning { self.active_handle.clone() } else { None },
        };

        self.generation += 1;
        self.state = RequestState::Idle;
        self.params = params;
        self.starting = false;
        self.parked = None;

        if detached.had_waiter() {
            debug!(generation = self.generation, "superseding request still in flight");
        }
        (RequestId(self.generation), detached)
    }

    /// Moves request `id` into `Scanning` with its waiting `completion`.
    ///
    /// Events reported before [`started`](Self::started) is called are parked.
    pub fn arm(&mut self, id: RequestId, completion: Completion, handle: Arc<dyn TransportHandle>) {
        debug_assert!(self.is_current(id), "arm called for stale request {id}");
        self.state = RequestState::Scanning;
        self.completion = Some(completion);
        self.active_handle = Some(handle);
        self.starting = true;
    }

    /// Records the devices of a request that completed without a scan.
    pub fn settle_local(&mut self, devices: Vec<DeviceRecord>) {
        self.devices = devices;
        self.state = RequestState::Idle;
    }

    /// Marks `start_scan` as returned and releases a parked event, if any.
    pub fn started(&mut self, id: RequestId) -> Resolution {
        if !self.is_scanning(id) {
            return Resolution::Stale;
        }
        self.starting = false;
        match self.parked.take() {
            Some(outcome) => self.resolve(id, outcome),
            None => Resolution::Pending,
        }
    }

    /// Feeds a transport event for request `id` into the context.
    ///
    /// Only the first event of a scan counts; later ones resolve as stale.
    pub fn resolve(&mut self, id: RequestId, outcome: ScanOutcome) -> Resolution {
        if !self.is_scanning(id) {
            return Resolution::Stale;
        }
        if self.starting {
            if self.parked.is_none() {
                self.parked = Some(outcome);
            }
            return Resolution::Pending;
        }
        let Some(completion) = self.completion.take() else {
            return Resolution::Stale;
        };

        let devices = match outcome {
            ScanOutcome::Found(records) => self.aggregate(records),
            ScanOutcome::NotFound => Vec::new(),
        };
        self.devices = devices.clone();
        self.state = RequestState::Delivered;
        Resolution::Ready(completion, devices)
    }

    /// Drops request `id` back to `Idle` after its scan failed to start.
    pub fn abort(&mut self, id: RequestId) -> Option<Completion> {
        if !self.is_scanning(id) {
            return None;
        }
        self.state = RequestState::Idle;
        self.starting = false;
        self.parked = None;
        self.completion.take()
    }

    /// Cancels the running scan; restricted to request `only` when given.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::NoActiveScan`] if nothing (or not `only`)
    /// is scanning.  No completion is touched in that case.
    pub fn cancel(&mut self, only: Option<RequestId>) -> Result<Detached, DiscoveryError> {
        let id = only.unwrap_or(self.current_id());
        if !self.is_scanning(id) {
            return Err(DiscoveryError::NoActiveScan);
        }
        self.state = RequestState::Cancelled;
        self.starting = false;
        self.parked = None;
        Ok(Detached {
            completion: self.completion.take(),
            handle: self.active_handle.clone(),
        })
    }

    /// Narrows `records` to the request filter, drops repeated names, and
    /// attaches security, credentials, and the transport binding.
    fn aggregate(&self, records: Vec<DeviceRecord>) -> Vec<DeviceRecord> {
        let mut seen = HashSet::new();
        records
            .into_iter()
            .filter(|record| self.params.filter.matches(record))
            .filter(|record| seen.insert(record.name.clone()))
            .map(|mut record| {
                record.security_level = self.params.security_level;
                record.credentials = self.params.credentials.clone();
                if let Some(handle) = &self.active_handle {
                    record.bind_transport(handle);
                }
                record
            })
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
