//! Protocol message types for the controller link.
//!
//! - Display → Controller: [`Command`] (`{"cmd": "...", ["pump": n]}`)
//! - Controller → Display: [`InboundFrame`], any object carrying sensor keys
//!   and/or a `status` marker
//!
//! # Example
//! ```json
//! {"cmd":"get_sensors"}
//! {"cmd":"manual_pump","pump":3}
//! {"temp":22.5,"humidity":61.0,"air_pressure":14.7}
//! {"status":"ok","wifi_connected":true,"error":"reservoir low"}
//! ```

use aerodisplay_core::profile::ManualCommand;
use aerodisplay_core::DeviceProfile;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

// ============================================================================
// Outbound Commands
// ============================================================================

/// A command sent to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub cmd: String,
    /// Optional integer argument and the key it is sent under.
    pub arg: Option<(String, i32)>,
}

impl Command {
    pub const GET_SENSORS: &'static str = "get_sensors";
    pub const GET_STATUS: &'static str = "get_status";

    /// A command without arguments.
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            arg: None,
        }
    }

    /// A command with one integer argument.
    pub fn with_arg(cmd: impl Into<String>, key: impl Into<String>, value: i32) -> Self {
        Self {
            cmd: cmd.into(),
            arg: Some((key.into(), value)),
        }
    }

    pub fn get_sensors() -> Self {
        Self::new(Self::GET_SENSORS)
    }

    pub fn get_status() -> Self {
        Self::new(Self::GET_STATUS)
    }
}

impl From<ManualCommand> for Command {
    fn from(manual: ManualCommand) -> Self {
        match manual.arg {
            Some((key, value)) => Command::with_arg(manual.wire_name, key, value),
            None => Command::new(manual.wire_name),
        }
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.arg.is_some() { 2 } else { 1 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("cmd", &self.cmd)?;
        if let Some((key, value)) = &self.arg {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

// ============================================================================
// Inbound Frames
// ============================================================================

/// A decoded object received from the controller.
///
/// Frames are classified by which keys are present, not by a type tag: one
/// frame may carry sensor readings, status, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    fields: Map<String, Value>,
}

impl InboundFrame {
    pub const STATUS_KEY: &'static str = "status";

    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// True if any of the profile's sensor keys is present.
    pub fn has_sensor_data(&self, profile: &DeviceProfile) -> bool {
        profile.has_sensor_key(self.fields.keys().map(String::as_str))
    }

    /// True if the frame carries the status marker.
    pub fn is_status(&self) -> bool {
        self.fields.contains_key(Self::STATUS_KEY)
    }

    /// Numeric value of a sensor key.
    ///
    /// A key whose value is not a number counts as absent.
    pub fn sensor_value(&self, key: &str) -> Option<f32> {
        self.fields.get(key).and_then(Value::as_f64).map(|v| v as f32)
    }

    /// Error text reported by the controller.
    pub fn error(&self) -> Option<String> {
        match self.fields.get("error")? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Network state as reported by the controller (informational only).
    pub fn wifi_connected(&self) -> Option<bool> {
        self.fields.get("wifi_connected").and_then(Value::as_bool)
    }
}
