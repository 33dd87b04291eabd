//! # aerodisplay-core
//!
//! Core data model and shared state for the display node.
//!
//! This crate provides:
//! - Device profiles (sensor slots and manual controls per device variant)
//! - Sensor frame and system status records
//! - The shared device state store
//! - Persisted device configuration and its storage backends
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! so the same records can be shared by workers on an RTOS or on tokio.

pub mod config;
pub mod model;
pub mod profile;
pub mod state;

pub use config::{
    ConfigError, ConfigStorage, ConfigStore, DeviceConfig, FileConfigStorage,
    MemoryConfigStorage, ThemeColor,
};
pub use model::*;
pub use profile::{DeviceKind, DeviceProfile, ManualCommandSpec, ManualControl, SensorDescriptor};
pub use state::DeviceState;

/// Milliseconds since boot.
///
/// Every timing decision in the node is made against this clock and the
/// current value is always passed in explicitly.
pub type Millis = u64;

/// No protocol response for this long demotes the upstream to disconnected.
pub const UART_TIMEOUT_MS: Millis = 5000;
