//! # aerodisplay-node
//!
//! The display node's workers on tokio:
//! - `link` - request/response protocol with the controller
//! - `network` - WiFi connection state machine and registration
//! - `presentation` - the seam towards the screen and operator input
//!
//! [`NodeRuntime`] owns the shared state and spawns the workers. Each worker
//! loops at its own period and isolates its own failures.

pub mod link;
pub mod network;
pub mod presentation;
pub mod registration;
pub mod runtime;

pub use link::{CommandError, LinkHandle, LinkProtocol};
pub use network::{
    NetworkError, NetworkHandle, NetworkManager, NetworkState, NetworkStatusHandle,
    ScannedNetwork, WifiRadio,
};
pub use presentation::{
    dispatch_intent, DisplayView, IntentError, OperatorIntent, Presenter, SensorLine, ViewSource,
};
pub use registration::{FirmwareInfo, HttpRegistrar, Registrar, RegistrationError};
pub use runtime::{NodeClock, NodeRuntime};
