//! Mock transport for unit and integration testing.
//!
//! Allows tests to drive discovery events by hand without a radio, and to
//! inspect what the orchestrator asked the transport to do.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use prov_core::{
    DeviceRecord, DiscoveryListener, ScanFilter, TransportError, TransportFactory, TransportHandle,
    TransportKind,
};

/// Outcome a [`MockTransport`] reports from inside `start_scan`.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Found(Vec<DeviceRecord>),
    NotFound,
}

/// A mock implementation of [`TransportHandle`] that records every call.
pub struct MockTransport {
    kind: TransportKind,
    scans: Mutex<Vec<(ScanFilter, Duration)>>,
    listener: Mutex<Option<Arc<dyn DiscoveryListener>>>,
    stop_count: AtomicUsize,
    stopped: AtomicBool,
    fail_start: Option<TransportError>,
    report_on_start: Option<ScriptedOutcome>,
}

impl MockTransport {
    /// Creates a mock handle for `kind` that reports nothing on its own.
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            scans: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
            stop_count: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            fail_start: None,
            report_on_start: None,
        }
    }

    fn current_listener(&self) -> Arc<dyn DiscoveryListener> {
        let guard = self.listener.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(listener) => Arc::clone(listener),
            None => panic!("MockTransport event emitted before start_scan()"),
        }
    }

    /// Reports `devices` to the listener of the last scan, as a radio would.
    ///
    /// Works after `stop_scan()` too, to simulate late events.
    ///
    /// Panics if `start_scan()` has never been called.
    pub fn emit_found(&self, devices: Vec<DeviceRecord>) {
        self.current_listener().on_found(devices);
    }

    /// Reports a scan timeout with no match.
    ///
    /// Panics if `start_scan()` has never been called.
    pub fn emit_not_found(&self) {
        self.current_listener().on_not_found();
    }

    /// Every `(filter, timeout)` this handle was asked to scan with.
    pub fn scans(&self) -> Vec<(ScanFilter, Duration)> {
        self.scans.lock().expect("lock poisoned").clone()
    }

    /// Number of times `stop_scan()` was called.
    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }

    /// `true` if a scan was started and not stopped since.
    pub fn is_scanning(&self) -> bool {
        !self.scans.lock().expect("lock poisoned").is_empty() && !self.stopped.load(Ordering::SeqCst)
    }
}

impl TransportHandle for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn start_scan(
        &self,
        filter: &ScanFilter,
        timeout: Duration,
        listener: Arc<dyn DiscoveryListener>,
    ) -> Result<(), TransportError> {
        if let Some(e) = &self.fail_start {
            return Err(e.clone());
        }
        self.scans
            .lock()
            .expect("lock poisoned")
            .push((filter.clone(), timeout));
        *self.listener.lock().expect("lock poisoned") = Some(Arc::clone(&listener));
        self.stopped.store(false, Ordering::SeqCst);

        match &self.report_on_start {
            Some(ScriptedOutcome::Found(devices)) => listener.on_found(devices.clone()),
            Some(ScriptedOutcome::NotFound) => listener.on_not_found(),
            None => {}
        }
        Ok(())
    }

    fn stop_scan(&self) {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// A mock [`TransportFactory`] that hands out [`MockTransport`]s and keeps
/// every one it opened.
#[derive(Default)]
pub struct MockTransportFactory {
    handles: Mutex<Vec<Arc<MockTransport>>>,
    fail_open: Option<TransportError>,
    fail_start: Option<TransportError>,
    report_on_start: Option<ScriptedOutcome>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `open()` fails with `error`.
    pub fn failing_open(error: TransportError) -> Self {
        Self {
            fail_open: Some(error),
            ..Self::default()
        }
    }

    /// Every opened handle fails `start_scan()` with `error`.
    pub fn failing_start(error: TransportError) -> Self {
        Self {
            fail_start: Some(error),
            ..Self::default()
        }
    }

    /// Every opened handle reports `outcome` synchronously from `start_scan()`.
    pub fn reporting_on_start(outcome: ScriptedOutcome) -> Self {
        Self {
            report_on_start: Some(outcome),
            ..Self::default()
        }
    }

    /// All handles opened so far, oldest first.
    pub fn handles(&self) -> Vec<Arc<MockTransport>> {
        self.handles.lock().expect("lock poisoned").clone()
    }

    /// The most recently opened handle.
    pub fn latest(&self) -> Option<Arc<MockTransport>> {
        self.handles.lock().expect("lock poisoned").last().cloned()
    }

    pub fn open_count(&self) -> usize {
        self.handles.lock().expect("lock poisoned").len()
    }
}

impl TransportFactory for MockTransportFactory {
    fn open(&self, kind: TransportKind) -> Result<Arc<dyn TransportHandle>, TransportError> {
        if let Some(e) = &self.fail_open {
            return Err(e.clone());
        }
        let handle = Arc::new(MockTransport {
            fail_start: self.fail_start.clone(),
            report_on_start: self.report_on_start.clone(),
            ..MockTransport::new(kind)
        });
        self.handles
            .lock()
            .expect("lock poisoned")
            .push(Arc::clone(&handle));
        Ok(handle)
    }
}
