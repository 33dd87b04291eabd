//! Device profiles.
//!
//! A display unit is built for one of two controller variants. Everything that
//! differs between them (sensor keys, labels, units, manual controls and the
//! commands they send) lives in a [`DeviceProfile`] chosen once at startup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The controller variant this display is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Environmental monitoring (air temperature, humidity, pressure).
    Environment,
    /// Liquid / nutrient monitoring (pH, EC, water temperature).
    Liquid,
}

impl DeviceKind {
    /// The profile describing this variant.
    pub fn profile(self) -> &'static DeviceProfile {
        match self {
            DeviceKind::Environment => &ENVIRONMENT,
            DeviceKind::Liquid => &LIQUID,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Environment => "environment",
            DeviceKind::Liquid => "liquid",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "environment" => Ok(DeviceKind::Environment),
            "liquid" => Ok(DeviceKind::Liquid),
            other => Err(format!("Unknown device kind: {}", other)),
        }
    }
}

/// One sensor slot on the sensors tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorDescriptor {
    /// Key carried on the wire (e.g. "temp").
    pub key: &'static str,
    /// Label shown to the operator.
    pub name: &'static str,
    pub unit: &'static str,
}

/// A button on the manual controls tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualControl {
    pub label: &'static str,
    /// Action name passed to the link (e.g. "pump").
    pub action: &'static str,
    pub arg: Option<i32>,
}

/// Integer argument accepted by a manual command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgRange {
    /// Key the argument is sent under.
    pub key: &'static str,
    pub min: i32,
    pub max: i32,
}

impl ArgRange {
    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// A manual command the controller understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualCommandSpec {
    pub action: &'static str,
    /// Command name on the wire (e.g. "manual_pump").
    pub wire_name: &'static str,
    pub arg: Option<ArgRange>,
}

/// A validated manual command, ready to be framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualCommand {
    pub wire_name: &'static str,
    /// Argument key and value, when the command takes one.
    pub arg: Option<(&'static str, i32)>,
}

/// Static description of a device variant.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceProfile {
    pub kind: DeviceKind,
    /// Default device name used until the operator registers one.
    pub display_name: &'static str,
    /// Device type string sent during registration.
    pub type_name: &'static str,
    pub sensors: &'static [SensorDescriptor],
    pub controls: &'static [ManualControl],
    pub commands: &'static [ManualCommandSpec],
}

impl DeviceProfile {
    /// Number of sensor slots in every frame for this profile.
    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    /// True if the object carries any of this profile's sensor keys.
    pub fn has_sensor_key<'a>(&self, mut keys: impl Iterator<Item = &'a str>) -> bool {
        keys.any(|k| self.sensors.iter().any(|s| s.key == k))
    }

    /// Validate a manual action against this profile.
    ///
    /// Returns `None` for unknown actions and for arguments that are missing,
    /// unexpected, or out of range.
    pub fn command_for(&self, action: &str, arg: Option<i32>) -> Option<ManualCommand> {
        let spec = self.commands.iter().find(|c| c.action == action)?;
        match (spec.arg, arg) {
            (None, None) => Some(ManualCommand {
                wire_name: spec.wire_name,
                arg: None,
            }),
            (Some(range), Some(value)) if range.contains(value) => Some(ManualCommand {
                wire_name: spec.wire_name,
                arg: Some((range.key, value)),
            }),
            _ => None,
        }
    }
}

static ENVIRONMENT: DeviceProfile = DeviceProfile {
    kind: DeviceKind::Environment,
    display_name: "AeroEnv Display",
    type_name: "environment",
    sensors: &[
        SensorDescriptor { key: "temp", name: "Temperature", unit: "°C" },
        SensorDescriptor { key: "humidity", name: "Humidity", unit: "%" },
        SensorDescriptor { key: "air_pressure", name: "Air Pressure", unit: "PSI" },
    ],
    controls: &[
        ManualControl { label: "Lights", action: "lights", arg: None },
        ManualControl { label: "Spray Cycle", action: "spray", arg: None },
    ],
    commands: &[
        ManualCommandSpec { action: "lights", wire_name: "manual_lights", arg: None },
        ManualCommandSpec { action: "spray", wire_name: "manual_spray", arg: None },
    ],
};

static LIQUID: DeviceProfile = DeviceProfile {
    kind: DeviceKind::Liquid,
    display_name: "AeroLiquid Display",
    type_name: "liquid",
    sensors: &[
        SensorDescriptor { key: "ph", name: "pH Level", unit: "pH" },
        SensorDescriptor { key: "ec", name: "EC Level", unit: "mS/cm" },
        SensorDescriptor { key: "water_temp", name: "Water Temp", unit: "°C" },
    ],
    controls: &[
        ManualControl { label: "Pump 1", action: "pump", arg: Some(1) },
        ManualControl { label: "Pump 2", action: "pump", arg: Some(2) },
        ManualControl { label: "Pump 3", action: "pump", arg: Some(3) },
        ManualControl { label: "Pump 4", action: "pump", arg: Some(4) },
        ManualControl { label: "Pump 5", action: "pump", arg: Some(5) },
        ManualControl { label: "pH/EC Check", action: "probe", arg: None },
    ],
    commands: &[
        ManualCommandSpec {
            action: "pump",
            wire_name: "manual_pump",
            arg: Some(ArgRange { key: "pump", min: 1, max: 5 }),
        },
        ManualCommandSpec { action: "probe", wire_name: "manual_probe", arg: None },
    ],
};
