//! Simulated radio link.
//!
//! Behaves like a radio scanner in front of a fixed set of devices: each
//! fixture device answers after its `response_delay_ms`.  A scan reports every
//! matching device that answers within the scan timeout, once the slowest of
//! them has answered.  If nothing matches, the scan runs for the whole timeout
//! and then reports not-found.
//!
//! Scans run as tokio tasks on the runtime handle captured at construction;
//! `stop_scan` aborts the task, so a stopped scan reports nothing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use prov_core::{
    DeviceRecord, DiscoveryListener, ScanFilter, TransportError, TransportFactory, TransportHandle,
    TransportKind,
};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One device the simulated radio can hear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedDevice {
    pub name: String,
    #[serde(default)]
    pub service_ids: Vec<String>,
    /// How long after scan start the device's advertisement is heard.
    #[serde(default = "default_response_delay_ms")]
    pub response_delay_ms: u64,
}

fn default_response_delay_ms() -> u64 {
    300
}

impl SimulatedDevice {
    pub fn new(name: impl Into<String>, response_delay: Duration) -> Self {
        Self {
            name: name.into(),
            service_ids: Vec::new(),
            response_delay_ms: response_delay.as_millis() as u64,
        }
    }

    fn response_delay(&self) -> Duration {
        Duration::from_millis(self.response_delay_ms)
    }

    fn to_record(&self) -> DeviceRecord {
        DeviceRecord::advertised(
            self.name.clone(),
            TransportKind::RadioLink,
            self.service_ids.clone(),
        )
    }
}

/// Opens [`SimulatedRadio`] handles over a shared device fixture.
pub struct SimulatedRadioFactory {
    devices: Arc<Vec<SimulatedDevice>>,
    runtime: Handle,
}

impl SimulatedRadioFactory {
    /// Creates a factory whose scans run on `runtime`.
    pub fn new(devices: Vec<SimulatedDevice>, runtime: Handle) -> Self {
        Self {
            devices: Arc::new(devices),
            runtime,
        }
    }
}

impl TransportFactory for SimulatedRadioFactory {
    fn open(&self, kind: TransportKind) -> Result<Arc<dyn TransportHandle>, TransportError> {
        match kind {
            TransportKind::RadioLink => Ok(Arc::new(SimulatedRadio {
                devices: Arc::clone(&self.devices),
                runtime: self.runtime.clone(),
                task: Mutex::new(None),
            })),
            TransportKind::LocalNetwork => Err(TransportError::Unsupported(kind)),
        }
    }
}

/// One simulated discovery session.
pub struct SimulatedRadio {
    devices: Arc<Vec<SimulatedDevice>>,
    runtime: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedRadio {
    /// Devices that match `filter` and answer within `timeout`.
    fn audible(&self, filter: &ScanFilter, timeout: Duration) -> Vec<&SimulatedDevice> {
        self.devices
            .iter()
            .filter(|d| d.response_delay() <= timeout)
            .filter(|d| filter.matches(&d.to_record()))
            .collect()
    }
}

impl TransportHandle for SimulatedRadio {
    fn kind(&self) -> TransportKind {
        TransportKind::RadioLink
    }

    fn start_scan(
        &self,
        filter: &ScanFilter,
        timeout: Duration,
        listener: Arc<dyn DiscoveryListener>,
    ) -> Result<(), TransportError> {
        let audible = self.audible(filter, timeout);
        let wait = audible
            .iter()
            .map(|d| d.response_delay())
            .max()
            .unwrap_or(timeout);
        let records: Vec<DeviceRecord> = audible.iter().map(|d| d.to_record()).collect();
        info!(matches = records.len(), ?timeout, "simulated scan started");

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(wait).await;
            if records.is_empty() {
                debug!("simulated scan timed out");
                listener.on_not_found();
            } else {
                debug!(count = records.len(), "simulated scan heard devices");
                listener.on_found(records);
            }
        });

        let mut slot = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn stop_scan(&self) {
        let mut slot = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = slot.take() {
            debug!("simulated scan stopped");
            task.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
