//! Network connection manager.
//!
//! Drives the radio through a bounded retry policy and performs the one-time
//! registration handshake once connected:
//!
//! ```text
//! Idle ──credentials──▶ Connecting ──▶ Connected ──token──▶ Registering ──200──▶ Registered
//!                         │    ▲                                  │
//!                 3 failures   └──── 90 s after last attempt      └── failure: retry next tick
//!                         ▼    │
//!                       CoolingDown
//! ```

use std::net::IpAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use aerodisplay_core::{ConfigStore, DeviceConfig, DeviceProfile, Millis};

use crate::registration::{
    FirmwareInfo, Registrar, RegistrationRequest, REGISTRATION_SUCCESS, REGISTRATION_TIMEOUT,
};
use crate::runtime::NodeClock;

/// Minimum time between connection attempts.
pub const RECONNECT_INTERVAL_MS: Millis = 30_000;

/// Attempts before the manager cools down.
pub const MAX_CONNECTION_ATTEMPTS: u32 = 3;

/// Pause after exhausting attempts, measured from the last attempt.
pub const COOLDOWN_MS: Millis = 3 * RECONNECT_INTERVAL_MS;

/// Hard ceiling on a single connection attempt.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// How often the radio is polled during an attempt.
pub const CONNECT_POLL: Duration = Duration::from_millis(500);

/// Minimum time between network scans.
pub const SCAN_COOLDOWN_MS: Millis = 10_000;

/// Network worker period.
pub const NETWORK_TICK: Duration = Duration::from_secs(1);

/// Errors returned by [`NetworkHandle`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Network worker is not running")]
    WorkerStopped,
}

/// A network seen by the last scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedNetwork {
    pub ssid: String,
    pub rssi: i32,
}

/// Station-mode radio.
pub trait WifiRadio: Send {
    /// Start associating with a network. Progress is observed through
    /// [`WifiRadio::is_connected`].
    fn begin_connect(&mut self, ssid: &str, password: &str);

    fn is_connected(&self) -> bool;

    fn disconnect(&mut self);

    fn scan(&mut self) -> Vec<ScannedNetwork>;

    fn local_ip(&self) -> Option<IpAddr>;
}

/// Connection lifecycle as seen by other workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NetworkState {
    /// No credentials configured.
    #[default]
    Idle = 0,
    /// Waiting for or running a connection attempt.
    Connecting = 1,
    /// Attempts exhausted, waiting out the cooldown.
    CoolingDown = 2,
    Connected = 3,
    Registering = 4,
    Registered = 5,
}

impl NetworkState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => NetworkState::Connecting,
            2 => NetworkState::CoolingDown,
            3 => NetworkState::Connected,
            4 => NetworkState::Registering,
            5 => NetworkState::Registered,
            _ => NetworkState::Idle,
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(
            self,
            NetworkState::Connected | NetworkState::Registering | NetworkState::Registered
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NetworkState::Idle => "idle",
            NetworkState::Connecting => "connecting",
            NetworkState::CoolingDown => "cooling down",
            NetworkState::Connected => "connected",
            NetworkState::Registering => "registering",
            NetworkState::Registered => "registered",
        }
    }
}

impl std::fmt::Display for NetworkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free view of the manager's state, shared with the other workers.
#[derive(Debug, Clone, Default)]
pub struct NetworkStatusHandle {
    state: Arc<AtomicU8>,
}

impl NetworkStatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> NetworkState {
        NetworkState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub(crate) fn set_state(&self, state: NetworkState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// In-memory retry bookkeeping, rebuilt at boot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub attempt_count: u32,
    pub last_attempt: Option<Millis>,
    pub last_scan: Option<Millis>,
    pub credentials_valid: bool,
}

/// Requests served by the network worker between ticks.
#[derive(Debug)]
pub enum NetworkRequest {
    Scan(oneshot::Sender<Vec<ScannedNetwork>>),
}

/// Cloneable handle to a running network worker.
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    tx: mpsc::Sender<NetworkRequest>,
    status: NetworkStatusHandle,
}

impl NetworkHandle {
    pub(crate) fn new(tx: mpsc::Sender<NetworkRequest>, status: NetworkStatusHandle) -> Self {
        Self { tx, status }
    }

    /// Scan for networks, or get the cached result during the cooldown.
    pub async fn scan(&self) -> Result<Vec<ScannedNetwork>, NetworkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(NetworkRequest::Scan(reply_tx))
            .await
            .map_err(|_| NetworkError::WorkerStopped)?;
        reply_rx.await.map_err(|_| NetworkError::WorkerStopped)
    }

    pub fn state(&self) -> NetworkState {
        self.status.state()
    }
}

/// The network connection state machine.
pub struct NetworkManager<R, G> {
    radio: R,
    registrar: G,
    profile: &'static DeviceProfile,
    store: Arc<ConfigStore>,
    firmware: FirmwareInfo,
    status: NetworkStatusHandle,
    config: DeviceConfig,
    config_revision: u64,
    conn: ConnectionState,
    scan_results: Vec<ScannedNetwork>,
}

impl<R, G> NetworkManager<R, G>
where
    R: WifiRadio,
    G: Registrar,
{
    pub fn new(
        radio: R,
        registrar: G,
        profile: &'static DeviceProfile,
        store: Arc<ConfigStore>,
        firmware: FirmwareInfo,
        status: NetworkStatusHandle,
    ) -> Self {
        let config_revision = store.revision();
        let config = store.snapshot();
        let conn = ConnectionState {
            credentials_valid: config.network_configured,
            ..Default::default()
        };
        status.set_state(NetworkState::Idle);

        Self {
            radio,
            registrar,
            profile,
            store,
            firmware,
            status,
            config,
            config_revision,
            conn,
            scan_results: Vec::new(),
        }
    }

    pub fn state(&self) -> NetworkState {
        self.status.state()
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.conn
    }

    /// Run one management cycle at time `now`.
    pub async fn tick(&mut self, now: Millis) {
        self.refresh_config();

        if !self.conn.credentials_valid {
            self.set_state(NetworkState::Idle);
            return;
        }

        if self.radio.is_connected() {
            if !self.state().is_connected() {
                self.on_connected();
            }
            if self.config.needs_registration() {
                self.set_state(NetworkState::Registering);
                self.register().await;
            }
            self.set_state(self.connected_state());
            return;
        }

        if self.state().is_connected() {
            warn!("WiFi connection lost");
            self.set_state(NetworkState::Connecting);
        }

        if self.conn.attempt_count >= MAX_CONNECTION_ATTEMPTS {
            let last = self.conn.last_attempt.unwrap_or(0);
            if now.saturating_sub(last) < COOLDOWN_MS {
                self.set_state(NetworkState::CoolingDown);
                return;
            }
            info!("Connection cooldown over, resuming attempts");
            self.conn.attempt_count = 0;
        }

        self.set_state(NetworkState::Connecting);

        let due = self
            .conn
            .last_attempt
            .map_or(true, |t| now.saturating_sub(t) >= RECONNECT_INTERVAL_MS);
        if !due {
            return;
        }

        self.conn.attempt_count += 1;
        self.conn.last_attempt = Some(now);
        info!(
            "Connecting to WiFi '{}' (attempt {}/{})",
            self.config.network_ssid, self.conn.attempt_count, MAX_CONNECTION_ATTEMPTS
        );

        if self.connect().await {
            self.on_connected();
            self.set_state(self.connected_state());
        } else {
            warn!("WiFi connection attempt {} failed", self.conn.attempt_count);
            if self.conn.attempt_count >= MAX_CONNECTION_ATTEMPTS {
                self.set_state(NetworkState::CoolingDown);
            }
        }
    }

    /// Scan for networks and return how many were found.
    ///
    /// Within [`SCAN_COOLDOWN_MS`] of the previous scan the cached count is
    /// returned instead.
    pub fn scan_networks(&mut self, now: Millis) -> usize {
        if let Some(last) = self.conn.last_scan {
            if now.saturating_sub(last) < SCAN_COOLDOWN_MS {
                debug!("Scan in cooldown, returning cached results");
                return self.scan_results.len();
            }
        }

        self.scan_results = self.radio.scan();
        self.conn.last_scan = Some(now);
        info!("Found {} networks", self.scan_results.len());
        self.scan_results.len()
    }

    /// A network from the last scan.
    pub fn scanned_network(&self, index: usize) -> Option<&ScannedNetwork> {
        self.scan_results.get(index)
    }

    /// Loop forever at [`NETWORK_TICK`], serving requests in between.
    pub async fn run(mut self, clock: NodeClock, mut requests: mpsc::Receiver<NetworkRequest>) {
        info!("Network worker started");
        let mut interval = tokio::time::interval(NETWORK_TICK);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(clock.now()).await;
                }
                Some(request) = requests.recv() => match request {
                    NetworkRequest::Scan(reply) => {
                        self.scan_networks(clock.now());
                        let _ = reply.send(self.scan_results.clone());
                    }
                },
            }
        }
    }

    fn set_state(&self, state: NetworkState) {
        let previous = self.status.state();
        if previous != state {
            debug!("Network state: {} -> {}", previous, state);
            self.status.set_state(state);
        }
    }

    fn connected_state(&self) -> NetworkState {
        if self.config.registered {
            NetworkState::Registered
        } else {
            NetworkState::Connected
        }
    }

    fn on_connected(&mut self) {
        self.conn.attempt_count = 0;
        match self.radio.local_ip() {
            Some(ip) => info!("WiFi connected! IP address: {}", ip),
            None => info!("WiFi connected!"),
        }
    }

    /// Pick up changes made through the config store.
    fn refresh_config(&mut self) {
        let revision = self.store.revision();
        if revision == self.config_revision {
            return;
        }
        self.config_revision = revision;

        let config = self.store.snapshot();
        let credentials_changed = config.network_ssid != self.config.network_ssid
            || config.network_password != self.config.network_password;
        self.config = config;
        self.conn.credentials_valid = self.config.network_configured;

        if credentials_changed {
            info!("Network credentials changed");
            self.conn.attempt_count = 0;
            self.conn.last_attempt = None;
            if self.radio.is_connected() {
                self.radio.disconnect();
            }
            if self.state().is_connected() {
                self.set_state(NetworkState::Connecting);
            }
        }
    }

    /// One bounded connection attempt.
    async fn connect(&mut self) -> bool {
        self.radio
            .begin_connect(&self.config.network_ssid, &self.config.network_password);

        let mut waited = Duration::ZERO;
        while waited < CONNECTION_TIMEOUT {
            if self.radio.is_connected() {
                return true;
            }
            tokio::time::sleep(CONNECT_POLL).await;
            waited += CONNECT_POLL;
        }

        if self.radio.is_connected() {
            return true;
        }
        self.radio.disconnect();
        false
    }

    /// One registration attempt. Failures are retried on a later tick.
    async fn register(&mut self) {
        info!("Registering device '{}'", self.config.device_name);
        let request = RegistrationRequest::new(&self.config, self.profile, &self.firmware);

        let attempt = self.registrar.register(&request);
        let Ok(result) = tokio::time::timeout(REGISTRATION_TIMEOUT, attempt).await else {
            warn!("Registration timed out after {:?}", REGISTRATION_TIMEOUT);
            return;
        };

        match result {
            Ok(REGISTRATION_SUCCESS) => {
                info!("Device registered successfully");
                if let Err(e) = self.store.set_registered(true) {
                    warn!("Failed to persist registration: {}", e);
                }
                self.refresh_config();
                self.config.registered = true;
            }
            Ok(code) => warn!("Registration failed with status {}", code),
            Err(e) => warn!("Registration failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::RegistrationError;
    use aerodisplay_core::{DeviceKind, MemoryConfigStorage};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RadioLog {
        attempts: Vec<String>,
        disconnects: usize,
        scans: usize,
    }

    /// Radio that connects only when `reachable` names the requested SSID.
    #[derive(Clone, Default)]
    struct MockRadio {
        reachable: Arc<Mutex<Option<String>>>,
        connected: Arc<Mutex<bool>>,
        log: Arc<Mutex<RadioLog>>,
    }

    impl MockRadio {
        fn set_reachable(&self, ssid: Option<&str>) {
            *self.reachable.lock().unwrap() = ssid.map(str::to_string);
        }

        fn drop_link(&self) {
            *self.connected.lock().unwrap() = false;
        }

        fn attempts(&self) -> usize {
            self.log.lock().unwrap().attempts.len()
        }
    }

    impl WifiRadio for MockRadio {
        fn begin_connect(&mut self, ssid: &str, _password: &str) {
            self.log.lock().unwrap().attempts.push(ssid.to_string());
            let ok = self.reachable.lock().unwrap().as_deref() == Some(ssid);
            *self.connected.lock().unwrap() = ok;
        }

        fn is_connected(&self) -> bool {
            *self.connected.lock().unwrap()
        }

        fn disconnect(&mut self) {
            self.log.lock().unwrap().disconnects += 1;
            *self.connected.lock().unwrap() = false;
        }

        fn scan(&mut self) -> Vec<ScannedNetwork> {
            let mut log = self.log.lock().unwrap();
            log.scans += 1;
            (0..log.scans)
                .map(|i| ScannedNetwork {
                    ssid: format!("net-{}", i),
                    rssi: -40 - i as i32,
                })
                .collect()
        }

        fn local_ip(&self) -> Option<IpAddr> {
            self.is_connected().then(|| IpAddr::from([192, 168, 1, 50]))
        }
    }

    #[derive(Clone)]
    struct MockRegistrar {
        status: Arc<Mutex<u16>>,
        calls: Arc<AtomicUsize>,
        /// Never answer at all.
        silent: Arc<AtomicBool>,
    }

    impl MockRegistrar {
        fn answering(status: u16) -> Self {
            Self {
                status: Arc::new(Mutex::new(status)),
                calls: Arc::new(AtomicUsize::new(0)),
                silent: Arc::new(AtomicBool::new(false)),
            }
        }

        fn go_silent(&self) {
            self.silent.store(true, Ordering::SeqCst);
        }

        fn answer(&self, status: u16) {
            *self.status.lock().unwrap() = status;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Registrar for MockRegistrar {
        fn register<'a>(
            &'a self,
            _request: &'a RegistrationRequest,
        ) -> BoxFuture<'a, Result<u16, RegistrationError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.silent.load(Ordering::SeqCst) {
                return Box::pin(futures::future::pending::<Result<u16, RegistrationError>>());
            }
            let status = *self.status.lock().unwrap();
            Box::pin(async move { Ok(status) })
        }
    }

    struct Setup {
        manager: NetworkManager<MockRadio, MockRegistrar>,
        radio: MockRadio,
        registrar: MockRegistrar,
        store: Arc<ConfigStore>,
    }

    fn setup(ssid: &str, token: &str) -> Setup {
        let profile = DeviceKind::Environment.profile();
        let store = Arc::new(ConfigStore::open(MemoryConfigStorage::new(), profile).unwrap());
        store.set_credentials(ssid, "secret").unwrap();
        store.set_registration_data("Bench Unit", token).unwrap();

        let radio = MockRadio::default();
        let registrar = MockRegistrar::answering(200);
        let manager = NetworkManager::new(
            radio.clone(),
            registrar.clone(),
            profile,
            store.clone(),
            FirmwareInfo::default(),
            NetworkStatusHandle::new(),
        );
        Setup {
            manager,
            radio,
            registrar,
            store,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_credentials_is_idle() {
        let mut s = setup("", "");
        s.radio.set_reachable(Some(""));

        for t in 0..5 {
            s.manager.tick(t * 30_000).await;
        }

        assert_eq!(s.radio.attempts(), 0);
        assert_eq!(s.manager.state(), NetworkState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_credentials_stop_attempts() {
        let mut s = setup("greenhouse", "");
        s.manager.tick(0).await;
        assert_eq!(s.radio.attempts(), 1);

        s.store.set_credentials("", "").unwrap();
        assert!(!s.store.snapshot().network_configured);

        s.manager.tick(60_000).await;
        assert_eq!(s.radio.attempts(), 1);
        assert_eq!(s.manager.state(), NetworkState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_resets_attempts() {
        let mut s = setup("greenhouse", "");
        s.radio.set_reachable(Some("greenhouse"));

        s.manager.tick(0).await;

        assert_eq!(s.manager.state(), NetworkState::Connected);
        assert_eq!(s.manager.connection().attempt_count, 0);
        assert_eq!(s.manager.connection().last_attempt, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_bound_and_cooldown() {
        let mut s = setup("greenhouse", "");
        let mut attempt_times = Vec::new();

        for second in 0..=200u64 {
            let now = second * 1000;
            let before = s.radio.attempts();
            s.manager.tick(now).await;
            if s.radio.attempts() > before {
                attempt_times.push(now);
            }
            assert!(s.manager.connection().attempt_count <= MAX_CONNECTION_ATTEMPTS);
        }

        // Three attempts 30 s apart, then a 90 s pause after the third.
        assert_eq!(attempt_times, vec![0, 30_000, 60_000, 150_000, 180_000]);
        for pair in attempt_times.windows(2) {
            assert!(pair[1] - pair[0] >= RECONNECT_INTERVAL_MS);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooling_down_state() {
        let mut s = setup("greenhouse", "");
        for now in [0, 30_000, 60_000] {
            s.manager.tick(now).await;
        }
        assert_eq!(s.manager.state(), NetworkState::CoolingDown);

        s.manager.tick(149_000).await;
        assert_eq!(s.manager.state(), NetworkState::CoolingDown);

        s.radio.set_reachable(Some("greenhouse"));
        s.manager.tick(150_000).await;
        assert_eq!(s.manager.state(), NetworkState::Connected);
        assert_eq!(s.radio.attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_is_bounded_in_time() {
        let mut s = setup("greenhouse", "");
        let started = tokio::time::Instant::now();

        s.manager.tick(0).await;

        let elapsed = started.elapsed();
        assert!(elapsed >= CONNECTION_TIMEOUT);
        assert!(elapsed < CONNECTION_TIMEOUT + CONNECT_POLL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_once() {
        let mut s = setup("greenhouse", "tok-1");
        s.radio.set_reachable(Some("greenhouse"));

        // Connect on the first tick, register on the next.
        s.manager.tick(0).await;
        assert_eq!(s.registrar.calls(), 0);
        s.manager.tick(1000).await;
        assert_eq!(s.registrar.calls(), 1);
        assert_eq!(s.manager.state(), NetworkState::Registered);
        assert!(s.store.snapshot().registered);

        for t in 2..10 {
            s.manager.tick(t * 1000).await;
        }
        assert_eq!(s.registrar.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_retried_until_success() {
        let mut s = setup("greenhouse", "tok-1");
        s.radio.set_reachable(Some("greenhouse"));
        s.registrar.answer(500);

        s.manager.tick(0).await;
        s.manager.tick(1000).await;
        s.manager.tick(2000).await;
        assert_eq!(s.registrar.calls(), 2);
        assert_eq!(s.manager.state(), NetworkState::Connected);
        assert!(!s.store.snapshot().registered);

        // 201 is not an exact match.
        s.registrar.answer(201);
        s.manager.tick(3000).await;
        assert!(!s.store.snapshot().registered);

        s.registrar.answer(200);
        s.manager.tick(4000).await;
        s.manager.tick(5000).await;
        assert_eq!(s.registrar.calls(), 4);
        assert!(s.store.snapshot().registered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_registrar_does_not_stall_worker() {
        let mut s = setup("greenhouse", "tok-1");
        s.radio.set_reachable(Some("greenhouse"));
        s.registrar.go_silent();

        s.manager.tick(0).await;
        let started = tokio::time::Instant::now();
        let tick = tokio::time::timeout(REGISTRATION_TIMEOUT * 2, s.manager.tick(1000)).await;
        assert!(tick.is_ok());
        assert!(started.elapsed() >= REGISTRATION_TIMEOUT);
        assert_eq!(s.registrar.calls(), 1);
        assert_eq!(s.manager.state(), NetworkState::Connected);
        assert!(!s.store.snapshot().registered);

        // Retried on a later tick once the service answers again.
        s.registrar.silent.store(false, Ordering::SeqCst);
        s.manager.tick(12_000).await;
        assert_eq!(s.registrar.calls(), 2);
        assert!(s.store.snapshot().registered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_registration_without_token() {
        let mut s = setup("greenhouse", "");
        s.radio.set_reachable(Some("greenhouse"));

        s.manager.tick(0).await;
        s.manager.tick(1000).await;

        assert_eq!(s.registrar.calls(), 0);
        assert_eq!(s.manager.state(), NetworkState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_token_registers_again() {
        let mut s = setup("greenhouse", "tok-1");
        s.radio.set_reachable(Some("greenhouse"));
        s.manager.tick(0).await;
        s.manager.tick(1000).await;
        assert_eq!(s.registrar.calls(), 1);

        s.store.set_registration_data("Bench Unit", "tok-2").unwrap();
        s.manager.tick(2000).await;

        assert_eq!(s.registrar.calls(), 2);
        assert!(s.store.snapshot().registered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_connection_waits_for_interval() {
        let mut s = setup("greenhouse", "");
        s.radio.set_reachable(Some("greenhouse"));
        s.manager.tick(0).await;
        assert!(s.manager.state().is_connected());

        s.radio.drop_link();
        s.manager.tick(10_000).await;
        assert_eq!(s.manager.state(), NetworkState::Connecting);
        assert_eq!(s.radio.attempts(), 1);

        s.manager.tick(30_000).await;
        assert_eq!(s.radio.attempts(), 2);
        assert_eq!(s.manager.state(), NetworkState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_credentials_reset_attempts() {
        let mut s = setup("greenhouse", "");
        for now in [0, 30_000, 60_000] {
            s.manager.tick(now).await;
        }
        assert_eq!(s.manager.connection().attempt_count, 3);

        s.store.set_credentials("barn", "pw").unwrap();
        s.radio.set_reachable(Some("barn"));
        s.manager.tick(61_000).await;

        assert_eq!(s.manager.state(), NetworkState::Connected);
        assert_eq!(s.radio.log.lock().unwrap().attempts.last().unwrap(), "barn");
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_handle_tracks_state() {
        let mut s = setup("greenhouse", "");
        let handle = s.manager.status.clone();
        assert!(!handle.is_connected());

        s.radio.set_reachable(Some("greenhouse"));
        s.manager.tick(0).await;
        assert!(handle.is_connected());
        assert_eq!(handle.state(), NetworkState::Connected);
    }

    #[test]
    fn test_scan_cooldown() {
        let mut s = setup("", "");

        assert_eq!(s.manager.scan_networks(0), 1);
        assert_eq!(s.manager.scan_networks(5_000), 1);
        assert_eq!(s.manager.scan_networks(9_999), 1);
        assert_eq!(s.radio.log.lock().unwrap().scans, 1);

        assert_eq!(s.manager.scan_networks(10_000), 2);
        assert_eq!(s.manager.scanned_network(1).unwrap().ssid, "net-1");
        assert_eq!(s.manager.scanned_network(2), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_through_handle() {
        let s = setup("", "");
        let (tx, rx) = mpsc::channel(4);
        let handle = NetworkHandle::new(tx, s.manager.status.clone());
        let worker = tokio::spawn(s.manager.run(NodeClock::start(), rx));

        let networks = handle.scan().await.unwrap();
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].ssid, "net-0");

        worker.abort();
        let _ = worker.await;
        assert_eq!(handle.scan().await, Err(NetworkError::WorkerStopped));
    }
}
