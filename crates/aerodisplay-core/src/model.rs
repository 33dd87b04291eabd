//! Display node data model.
//!
//! These records are what the workers exchange through [`DeviceState`]:
//! - [`SensorFrame`] holds the latest readings from the controller
//! - [`SystemStatus`] holds upstream and network connectivity
//!
//! Both are always replaced as a whole, never patched field by field.
//!
//! [`DeviceState`]: crate::state::DeviceState

use serde::{Deserialize, Serialize};

use crate::profile::DeviceProfile;
use crate::{Millis, UART_TIMEOUT_MS};

/// A single sensor slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub value: f32,
    /// True only if the last frame explicitly carried this sensor.
    pub valid: bool,
}

impl SensorReading {
    /// A slot with no data.
    pub const EMPTY: SensorReading = SensorReading {
        value: 0.0,
        valid: false,
    };
}

/// The latest sensor readings, one slot per profile sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    pub readings: Vec<SensorReading>,
    /// When the frame was ingested; 0 means never.
    pub last_update: Millis,
}

impl SensorFrame {
    /// A frame with every slot invalid, sized for the profile.
    pub fn empty(profile: &DeviceProfile) -> Self {
        Self {
            readings: vec![SensorReading::EMPTY; profile.sensor_count()],
            last_update: 0,
        }
    }

    /// The value in slot `index`, or `None` if it must not be shown.
    pub fn reading(&self, index: usize) -> Option<f32> {
        self.readings
            .get(index)
            .filter(|r| r.valid)
            .map(|r| r.value)
    }

    /// True once a frame has arrived and it is older than the link timeout.
    pub fn is_stale(&self, now: Millis) -> bool {
        self.last_update > 0 && now.saturating_sub(self.last_update) > UART_TIMEOUT_MS
    }
}

/// Upstream controller and network connectivity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub upstream_connected: bool,
    pub network_connected: bool,
    /// Last error reported by the controller.
    pub last_error: Option<String>,
    pub last_update: Millis,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::DeviceKind;

    #[test]
    fn test_empty_frame_is_all_invalid() {
        let frame = SensorFrame::empty(DeviceKind::Liquid.profile());
        assert_eq!(frame.readings.len(), 3);
        assert!(frame.readings.iter().all(|r| !r.valid));
        assert_eq!(frame.reading(0), None);
        assert_eq!(frame.last_update, 0);
    }

    #[test]
    fn test_reading_hides_invalid_slots() {
        let frame = SensorFrame {
            readings: vec![
                SensorReading { value: 22.5, valid: true },
                SensorReading { value: 0.0, valid: false },
                SensorReading { value: 0.0, valid: true },
            ],
            last_update: 100,
        };

        assert_eq!(frame.reading(0), Some(22.5));
        assert_eq!(frame.reading(1), None);
        // A valid zero is still a real reading.
        assert_eq!(frame.reading(2), Some(0.0));
        assert_eq!(frame.reading(3), None);
    }

    #[test]
    fn test_staleness() {
        let mut frame = SensorFrame::empty(DeviceKind::Environment.profile());
        assert!(!frame.is_stale(60_000));

        frame.last_update = 1000;
        assert!(!frame.is_stale(6000));
        assert!(frame.is_stale(6001));
    }
}
