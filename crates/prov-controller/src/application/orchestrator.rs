//! Orchestrator: the caller-facing discovery and device-configuration API.
//!
//! The orchestrator owns the single [`RequestContext`] behind one mutex and
//! exposes two workflows:
//!
//! - **search** – scan for every device matching a name prefix / service-id
//!   filter and return the list.
//! - **create_device** – obtain one device by name: scanned for on a radio
//!   link, built locally for a local-network transport.
//!
//! Both return immediately with a [`RequestHandle`]; the outcome arrives
//! later through the caller's completion, exactly once.  Starting a new
//! request while one is in flight supersedes it: the older caller receives
//! [`DiscoveryError::Superseded`] and any late event from its transport is
//! discarded by generation.
//!
//! Completions always run with the context lock released, so a completion
//! may start the next request itself (e.g. call [`Orchestrator::refresh`]).

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use prov_core::{
    Credentials, DeviceRecord, DiscoveryListener, ScanFilter, SecurityLevel, TransportFactory,
    TransportHandle, TransportKind,
};
use tracing::{debug, info, warn};

use super::request_context::{
    Completion, Detached, RequestContext, RequestId, RequestParams, RequestState, Resolution,
    ScanOutcome,
};
use super::DiscoveryError;

/// Fixed scan timeout handed to the transport.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables of the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// How long a transport scans before reporting not-found.
    pub scan_timeout: Duration,
    /// Transport stored in the context before the first request.
    pub default_transport: TransportKind,
    /// Security level used by `search` when the request does not set one.
    pub search_security: SecurityLevel,
    /// Security level used by `create_device` when the request does not set one.
    pub create_security: SecurityLevel,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            default_transport: TransportKind::RadioLink,
            search_security: SecurityLevel::Encrypted,
            create_security: SecurityLevel::EncryptedMutualAuth,
        }
    }
}

/// Parameters of a list search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub transport_kind: TransportKind,
    pub name_prefix: Option<String>,
    pub service_ids: Option<BTreeSet<String>>,
    /// `None` uses [`OrchestratorConfig::search_security`].
    pub security_level: Option<SecurityLevel>,
    pub proof_of_possession: Option<String>,
    pub username: Option<String>,
}

impl SearchRequest {
    pub fn new(transport_kind: TransportKind) -> Self {
        Self {
            transport_kind,
            name_prefix: None,
            service_ids: None,
            security_level: None,
            proof_of_possession: None,
            username: None,
        }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn with_service_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.service_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_security(mut self, level: SecurityLevel) -> Self {
        self.security_level = Some(level);
        self
    }

    pub fn with_proof_of_possession(mut self, pop: impl Into<String>) -> Self {
        self.proof_of_possession = Some(pop.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Parameters of a single-device request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateDeviceRequest {
    pub name: String,
    pub transport_kind: TransportKind,
    /// `None` uses [`OrchestratorConfig::create_security`].
    pub security_level: Option<SecurityLevel>,
    pub proof_of_possession: Option<String>,
    pub network_password: Option<String>,
    pub username: Option<String>,
}

impl CreateDeviceRequest {
    pub fn new(name: impl Into<String>, transport_kind: TransportKind) -> Self {
        Self {
            name: name.into(),
            transport_kind,
            security_level: None,
            proof_of_possession: None,
            network_password: None,
            username: None,
        }
    }

    pub fn with_security(mut self, level: SecurityLevel) -> Self {
        self.security_level = Some(level);
        self
    }

    pub fn with_proof_of_possession(mut self, pop: impl Into<String>) -> Self {
        self.proof_of_possession = Some(pop.into());
        self
    }

    pub fn with_network_password(mut self, password: impl Into<String>) -> Self {
        self.network_password = Some(password.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// State shared between the orchestrator, its handles, and its listeners.
struct Shared {
    context: Mutex<RequestContext>,
    factory: Arc<dyn TransportFactory>,
    config: OrchestratorConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RequestContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves a transport event for request `id` and runs the completion.
    fn dispatch(&self, id: RequestId, outcome: ScanOutcome) {
        let resolution = self.lock().resolve(id, outcome);
        self.finish(id, resolution);
    }

    fn finish(&self, id: RequestId, resolution: Resolution) {
        match resolution {
            Resolution::Ready(completion, devices) => {
                info!(generation = id.generation(), count = devices.len(), "scan delivered");
                completion.deliver(&devices);
            }
            Resolution::Pending => {}
            Resolution::Stale => {
                debug!(generation = id.generation(), "dropping event for stale request");
            }
        }
    }

    fn cancel(&self, only: Option<RequestId>) -> Result<(), DiscoveryError> {
        let detached = self.lock().cancel(only)?;
        info!("scan cancelled");
        detached.finish(DiscoveryError::Cancelled);
        Ok(())
    }
}

/// Listener handed to a transport for one request generation.
struct ScanListener {
    shared: Weak<Shared>,
    id: RequestId,
}

impl DiscoveryListener for ScanListener {
    fn on_found(&self, devices: Vec<DeviceRecord>) {
        if let Some(shared) = self.shared.upgrade() {
            debug!(generation = self.id.generation(), count = devices.len(), "transport found devices");
            shared.dispatch(self.id, ScanOutcome::Found(devices));
        }
    }

    fn on_not_found(&self) {
        if let Some(shared) = self.shared.upgrade() {
            debug!(generation = self.id.generation(), "transport found nothing");
            shared.dispatch(self.id, ScanOutcome::NotFound);
        }
    }
}

/// Token for one request, returned by every start call.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    id: RequestId,
    shared: Weak<Shared>,
}

impl RequestHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// `true` until a newer request replaces this one.
    pub fn is_current(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.lock().is_current(self.id))
    }

    /// `true` while this request is waiting on the transport.
    pub fn is_scanning(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.lock().is_scanning(self.id))
    }

    /// Cancels this request if it is still scanning.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::NoActiveScan`] if the request already
    /// finished or was superseded.
    pub fn cancel(&self) -> Result<(), DiscoveryError> {
        match self.shared.upgrade() {
            Some(shared) => shared.cancel(Some(self.id)),
            None => Err(DiscoveryError::NoActiveScan),
        }
    }
}

/// The discovery and session-configuration orchestrator.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    /// Creates an orchestrator that opens transports through `factory`.
    pub fn new(factory: Arc<dyn TransportFactory>, config: OrchestratorConfig) -> Self {
        let params = RequestParams {
            filter: ScanFilter::any(),
            transport_kind: config.default_transport,
            security_level: config.search_security,
            credentials: None,
        };
        Self {
            shared: Arc::new(Shared {
                context: Mutex::new(RequestContext::new(params)),
                factory,
                config,
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    pub fn state(&self) -> RequestState {
        self.shared.lock().state()
    }

    /// Snapshot of the devices from the most recent delivery.
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.shared.lock().devices().to_vec()
    }

    /// Scans for devices matching `request` and reports the list.
    ///
    /// A local-network search is unsupported: `on_complete` receives
    /// [`DiscoveryError::UnsupportedTransport`] before this call returns and no
    /// transport is opened.
    pub fn search<F>(&self, request: SearchRequest, on_complete: F) -> RequestHandle
    where
        F: FnOnce(Result<Vec<DeviceRecord>, DiscoveryError>) + Send + 'static,
    {
        let security_level = request
            .security_level
            .unwrap_or(self.shared.config.search_security);
        let params = RequestParams {
            filter: ScanFilter {
                name_prefix: request.name_prefix,
                service_ids: request.service_ids,
            },
            transport_kind: request.transport_kind,
            security_level,
            credentials: Credentials::for_record(
                request.transport_kind,
                security_level,
                request.proof_of_possession,
                request.username,
                None,
            ),
        };
        self.start(params, Completion::List(Box::new(on_complete)))
    }

    /// Repeats the last search configuration with a new completion.
    pub fn refresh<F>(&self, on_complete: F) -> RequestHandle
    where
        F: FnOnce(Result<Vec<DeviceRecord>, DiscoveryError>) + Send + 'static,
    {
        let params = self.shared.lock().params().clone();
        debug!(transport = %params.transport_kind, "refreshing search");
        self.start(params, Completion::List(Box::new(on_complete)))
    }

    /// Obtains one configured device by name.
    ///
    /// On a radio link the device is scanned for; on a local network the
    /// record is built from `request` and delivered before this call returns.
    pub fn create_device<F>(&self, request: CreateDeviceRequest, on_complete: F) -> RequestHandle
    where
        F: FnOnce(Result<DeviceRecord, DiscoveryError>) + Send + 'static,
    {
        let security_level = request
            .security_level
            .unwrap_or(self.shared.config.create_security);
        let params = RequestParams {
            filter: ScanFilter::exact_name(request.name.clone()),
            transport_kind: request.transport_kind,
            security_level,
            credentials: Credentials::for_record(
                request.transport_kind,
                security_level,
                request.proof_of_possession,
                request.username,
                request.network_password,
            ),
        };
        self.start(
            params,
            Completion::Device {
                target: request.name,
                callback: Box::new(on_complete),
            },
        )
    }

    /// Stops the running scan.
    ///
    /// The waiting caller receives [`DiscoveryError::Cancelled`]; events the
    /// transport reports afterwards are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::NoActiveScan`] when nothing is scanning.  No
    /// completion is invoked in that case.
    pub fn stop_search(&self) -> Result<(), DiscoveryError> {
        self.shared.cancel(None)
    }

    /// Installs `params` as the current request and runs its workflow.
    fn start(&self, params: RequestParams, completion: Completion) -> RequestHandle {
        let transport = params.transport_kind;
        let filter = params.filter.clone();

        let mut ctx = self.shared.lock();
        let (id, detached) = ctx.supersede(params);
        let handle = RequestHandle {
            id,
            shared: Arc::downgrade(&self.shared),
        };
        info!(generation = id.generation(), %transport, "discovery request started");

        match (transport, completion) {
            (TransportKind::LocalNetwork, Completion::List(callback)) => {
                drop(ctx);
                retire(detached);
                warn!("local-network discovery requested; not supported");
                callback(Err(DiscoveryError::UnsupportedTransport(transport)));
            }
            (TransportKind::LocalNetwork, Completion::Device { target, callback }) => {
                let record = local_record(target, ctx.params());
                ctx.settle_local(vec![record.clone()]);
                drop(ctx);
                retire(detached);
                callback(Ok(record));
            }
            (TransportKind::RadioLink, completion) => match self.shared.factory.open(transport) {
                Ok(scanner) => {
                    ctx.arm(id, completion, Arc::clone(&scanner));
                    drop(ctx);
                    retire(detached);
                    self.run_scan(id, scanner, &filter);
                }
                Err(e) => {
                    drop(ctx);
                    retire(detached);
                    warn!(error = %e, "could not open transport");
                    completion.fail(e.into());
                }
            },
        }
        handle
    }

    /// Starts the scan for request `id` outside the lock.
    fn run_scan(&self, id: RequestId, scanner: Arc<dyn TransportHandle>, filter: &ScanFilter) {
        let listener = Arc::new(ScanListener {
            shared: Arc::downgrade(&self.shared),
            id,
        });

        if let Err(e) = scanner.start_scan(filter, self.shared.config.scan_timeout, listener) {
            warn!(generation = id.generation(), error = %e, "scan failed to start");
            let aborted = self.shared.lock().abort(id);
            if let Some(completion) = aborted {
                completion.fail(e.into());
            }
            return;
        }

        let resolution = self.shared.lock().started(id);
        if matches!(resolution, Resolution::Stale) {
            // Superseded or cancelled while start_scan was running.
            scanner.stop_scan();
        }
        self.shared.finish(id, resolution);
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.shared.config)
            .field("state", &self.state())
            .finish()
    }
}

/// Tells a displaced request's caller that it was superseded.
fn retire(detached: Detached) {
    if detached.had_waiter() {
        debug!("notifying superseded caller");
    }
    detached.finish(DiscoveryError::Superseded);
}

/// Builds the record of a local-network device from the request parameters.
fn local_record(name: String, params: &RequestParams) -> DeviceRecord {
    let mut record = DeviceRecord::new(name, TransportKind::LocalNetwork, params.security_level);
    record.credentials = params.credentials.clone();
    record
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use mockall::mock;
    use prov_core::TransportError;

    mock! {
        Factory {}
        impl TransportFactory for Factory {
            fn open(&self, kind: TransportKind) -> Result<Arc<dyn TransportHandle>, TransportError>;
        }
    }

    /// Handle that remembers the listener and reports nothing by itself.
    #[derive(Default)]
    struct ManualHandle {
        listener: Mutex<Option<Arc<dyn DiscoveryListener>>>,
        filters: Mutex<Vec<(ScanFilter, Duration)>>,
        stops: AtomicUsize,
    }

    impl ManualHandle {
        fn listener(&self) -> Arc<dyn DiscoveryListener> {
            self.listener.lock().unwrap().clone().expect("scan started")
        }
    }

    impl TransportHandle for ManualHandle {
        fn kind(&self) -> TransportKind {
            TransportKind::RadioLink
        }

        fn start_scan(
            &self,
            filter: &ScanFilter,
            timeout: Duration,
            listener: Arc<dyn DiscoveryListener>,
        ) -> Result<(), TransportError> {
            self.filters.lock().unwrap().push((filter.clone(), timeout));
            *self.listener.lock().unwrap() = Some(listener);
            Ok(())
        }

        fn stop_scan(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn factory_returning(handle: Arc<ManualHandle>) -> MockFactory {
        let mut factory = MockFactory::new();
        factory
            .expect_open()
            .returning(move |_| Ok(handle.clone() as Arc<dyn TransportHandle>));
        factory
    }

    type ListResults = Arc<Mutex<Vec<Result<Vec<DeviceRecord>, DiscoveryError>>>>;

    fn list_sink() -> (ListResults, impl FnOnce(Result<Vec<DeviceRecord>, DiscoveryError>) + Send) {
        let results: ListResults = Arc::default();
        let sink = Arc::clone(&results);
        (results, move |r| sink.lock().unwrap().push(r))
    }

    fn radio(name: &str) -> DeviceRecord {
        DeviceRecord::advertised(name, TransportKind::RadioLink, vec![])
    }

    #[test]
    fn test_local_network_search_never_opens_a_transport() {
        // Arrange
        let mut factory = MockFactory::new();
        factory.expect_open().never();
        let orchestrator = Orchestrator::new(Arc::new(factory), OrchestratorConfig::default());
        let (results, sink) = list_sink();

        // Act
        orchestrator.search(SearchRequest::new(TransportKind::LocalNetwork), sink);

        // Assert: delivered before search returned
        assert_eq!(
            *results.lock().unwrap(),
            vec![Err(DiscoveryError::UnsupportedTransport(TransportKind::LocalNetwork))]
        );
        assert_eq!(orchestrator.state(), RequestState::Idle);
    }

    #[test]
    fn test_local_network_create_never_opens_a_transport() {
        // Arrange
        let mut factory = MockFactory::new();
        factory.expect_open().never();
        let orchestrator = Orchestrator::new(Arc::new(factory), OrchestratorConfig::default());
        let got: Arc<Mutex<Option<Result<DeviceRecord, DiscoveryError>>>> = Arc::default();
        let sink = Arc::clone(&got);

        // Act
        orchestrator.create_device(
            CreateDeviceRequest::new("PROV_SOFTAP", TransportKind::LocalNetwork)
                .with_network_password("pw"),
            move |r| *sink.lock().unwrap() = Some(r),
        );

        // Assert
        let record = got.lock().unwrap().take().expect("delivered").expect("ok");
        assert_eq!(record.name, "PROV_SOFTAP");
        assert_eq!(record.security_level, SecurityLevel::EncryptedMutualAuth);
        assert!(!record.is_bound());
        assert_eq!(orchestrator.devices(), vec![record]);
    }

    #[test]
    fn test_search_passes_filter_and_timeout_to_transport() {
        // Arrange
        let handle = Arc::new(ManualHandle::default());
        let config = OrchestratorConfig {
            scan_timeout: Duration::from_millis(1500),
            ..OrchestratorConfig::default()
        };
        let orchestrator = Orchestrator::new(Arc::new(factory_returning(handle.clone())), config);
        let (_results, sink) = list_sink();

        // Act
        orchestrator.search(
            SearchRequest::new(TransportKind::RadioLink)
                .with_name_prefix("PROV_")
                .with_service_ids(["svc-a"]),
            sink,
        );

        // Assert
        let filters = handle.filters.lock().unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].0.name_prefix.as_deref(), Some("PROV_"));
        assert!(filters[0].0.service_ids.as_ref().is_some_and(|s| s.contains("svc-a")));
        assert_eq!(filters[0].1, Duration::from_millis(1500));
        assert_eq!(orchestrator.state(), RequestState::Scanning);
    }

    #[test]
    fn test_search_defaults_to_encrypted() {
        // Arrange
        let handle = Arc::new(ManualHandle::default());
        let orchestrator = Orchestrator::new(
            Arc::new(factory_returning(handle.clone())),
            OrchestratorConfig::default(),
        );
        let (results, sink) = list_sink();

        // Act
        orchestrator.search(SearchRequest::new(TransportKind::RadioLink), sink);
        handle.listener().on_found(vec![radio("PROV_1")]);

        // Assert
        let results = results.lock().unwrap();
        let devices = results[0].as_ref().expect("found");
        assert_eq!(devices[0].security_level, SecurityLevel::Encrypted);
        assert_eq!(orchestrator.state(), RequestState::Delivered);
    }

    #[test]
    fn test_open_failure_is_reported_through_completion() {
        // Arrange
        let mut factory = MockFactory::new();
        factory
            .expect_open()
            .times(1)
            .returning(|_| Err(TransportError::Unavailable("radio off".to_string())));
        let orchestrator = Orchestrator::new(Arc::new(factory), OrchestratorConfig::default());
        let (results, sink) = list_sink();

        // Act
        orchestrator.search(SearchRequest::new(TransportKind::RadioLink), sink);

        // Assert
        assert_eq!(
            *results.lock().unwrap(),
            vec![Err(DiscoveryError::Transport(TransportError::Unavailable(
                "radio off".to_string()
            )))]
        );
        assert_eq!(orchestrator.state(), RequestState::Idle);
        assert_eq!(orchestrator.stop_search(), Err(DiscoveryError::NoActiveScan));
    }

    #[test]
    fn test_refresh_reuses_stored_filter() {
        // Arrange
        let handle = Arc::new(ManualHandle::default());
        let orchestrator = Orchestrator::new(
            Arc::new(factory_returning(handle.clone())),
            OrchestratorConfig::default(),
        );
        let (_first, sink) = list_sink();
        orchestrator.search(
            SearchRequest::new(TransportKind::RadioLink).with_name_prefix("PROV_"),
            sink,
        );

        // Act
        let (second, sink) = list_sink();
        orchestrator.refresh(sink);
        handle.listener().on_found(vec![radio("PROV_9"), radio("LAMP")]);

        // Assert
        let filters = handle.filters.lock().unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1].0.name_prefix.as_deref(), Some("PROV_"));
        let results = second.lock().unwrap();
        let names: Vec<&str> = results[0].as_ref().unwrap().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["PROV_9"]);
    }

    #[test]
    fn test_request_handle_tracks_currency() {
        // Arrange
        let handle = Arc::new(ManualHandle::default());
        let orchestrator = Orchestrator::new(
            Arc::new(factory_returning(handle.clone())),
            OrchestratorConfig::default(),
        );
        let (_a, sink_a) = list_sink();
        let (_b, sink_b) = list_sink();

        // Act
        let first = orchestrator.search(SearchRequest::new(TransportKind::RadioLink), sink_a);
        let second = orchestrator.search(SearchRequest::new(TransportKind::RadioLink), sink_b);

        // Assert
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(second.is_scanning());
        assert_eq!(first.cancel(), Err(DiscoveryError::NoActiveScan));
        assert_eq!(second.cancel(), Ok(()));
        assert!(!second.is_scanning());
    }

    #[test]
    fn test_completion_may_start_next_request() {
        // Arrange
        let handle = Arc::new(ManualHandle::default());
        let orchestrator = Orchestrator::new(
            Arc::new(factory_returning(handle.clone())),
            OrchestratorConfig::default(),
        );
        let (refreshed, sink) = list_sink();
        let inner = orchestrator.clone();

        // Act: refresh from inside the first completion
        orchestrator.search(SearchRequest::new(TransportKind::RadioLink), move |_| {
            inner.refresh(sink);
        });
        handle.listener().on_not_found();
        handle.listener().on_found(vec![radio("PROV_2")]);

        // Assert
        assert_eq!(refreshed.lock().unwrap().len(), 1);
        assert_eq!(handle.filters.lock().unwrap().len(), 2);
    }
}
