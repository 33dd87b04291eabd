//! Wiring for the three node workers.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use aerodisplay_core::{ConfigStore, DeviceProfile, DeviceState, Millis};

use crate::link::{LinkHandle, LinkProtocol};
use crate::network::{NetworkHandle, NetworkManager, NetworkStatusHandle, WifiRadio};
use crate::presentation::{run_presentation, Presenter, ViewSource};
use crate::registration::{FirmwareInfo, Registrar};

/// Monotonic milliseconds since the node started.
#[derive(Debug, Clone, Copy)]
pub struct NodeClock {
    boot: Instant,
}

impl NodeClock {
    pub fn start() -> Self {
        Self {
            boot: Instant::now(),
        }
    }

    pub fn now(&self) -> Millis {
        self.boot.elapsed().as_millis() as Millis
    }
}

/// Shared state plus the means to start the workers around it.
#[derive(Debug, Clone)]
pub struct NodeRuntime {
    profile: &'static DeviceProfile,
    state: Arc<DeviceState>,
    store: Arc<ConfigStore>,
    network: NetworkStatusHandle,
    clock: NodeClock,
}

impl NodeRuntime {
    pub fn new(profile: &'static DeviceProfile, store: ConfigStore) -> Self {
        Self {
            profile,
            state: Arc::new(DeviceState::new(profile)),
            store: Arc::new(store),
            network: NetworkStatusHandle::new(),
            clock: NodeClock::start(),
        }
    }

    pub fn profile(&self) -> &'static DeviceProfile {
        self.profile
    }

    pub fn state(&self) -> &Arc<DeviceState> {
        &self.state
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn network_status(&self) -> &NetworkStatusHandle {
        &self.network
    }

    pub fn clock(&self) -> NodeClock {
        self.clock
    }

    pub fn view_source(&self) -> ViewSource {
        ViewSource {
            profile: self.profile,
            state: self.state.clone(),
            store: self.store.clone(),
            network: self.network.clone(),
        }
    }

    /// Start the link worker on `stream`.
    pub fn spawn_link<S>(&self, stream: S) -> (LinkHandle, JoinHandle<()>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (link, handle) = LinkProtocol::new(
            stream,
            self.profile,
            self.state.clone(),
            self.network.clone(),
        );
        let task = tokio::spawn(link.run(self.clock));
        (handle, task)
    }

    /// Start the network worker.
    pub fn spawn_network<R, G>(
        &self,
        radio: R,
        registrar: G,
        firmware: FirmwareInfo,
    ) -> (NetworkHandle, JoinHandle<()>)
    where
        R: WifiRadio + 'static,
        G: Registrar + 'static,
    {
        let manager = NetworkManager::new(
            radio,
            registrar,
            self.profile,
            self.store.clone(),
            firmware,
            self.network.clone(),
        );
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(manager.run(self.clock, rx));
        (NetworkHandle::new(tx, self.network.clone()), task)
    }

    /// Start the presentation worker.
    pub fn spawn_presentation<P>(&self, presenter: P) -> JoinHandle<()>
    where
        P: Presenter + 'static,
    {
        tokio::spawn(run_presentation(presenter, self.view_source(), self.clock))
    }
}
