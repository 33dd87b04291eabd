//! Shared device state.
//!
//! The state holds the two records every worker cares about: the latest
//! [`SensorFrame`] and the current [`SystemStatus`]. Each record sits behind its
//! own lock; one read or one write is one exclusive window, and writes always
//! replace the whole record, so readers never see a mix of old and new fields.
//!
//! Last writer wins per record.

use std::sync::{PoisonError, RwLock};

use crate::model::{SensorFrame, SystemStatus};
use crate::profile::DeviceProfile;

/// Concurrency-safe store for the records shared between workers.
#[derive(Debug)]
pub struct DeviceState {
    sensors: RwLock<SensorFrame>,
    status: RwLock<SystemStatus>,
}

impl DeviceState {
    /// Create a state with all sensor slots invalid and everything disconnected.
    pub fn new(profile: &DeviceProfile) -> Self {
        Self {
            sensors: RwLock::new(SensorFrame::empty(profile)),
            status: RwLock::new(SystemStatus::default()),
        }
    }

    /// Snapshot of the latest sensor frame.
    pub fn read_sensors(&self) -> SensorFrame {
        self.sensors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the current system status.
    pub fn read_status(&self) -> SystemStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the sensor frame.
    pub fn write_sensors(&self, frame: SensorFrame) {
        *self.sensors.write().unwrap_or_else(PoisonError::into_inner) = frame;
    }

    /// Replace the system status.
    pub fn write_status(&self, status: SystemStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SensorReading;
    use crate::profile::DeviceKind;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_state() {
        let state = DeviceState::new(DeviceKind::Environment.profile());

        let sensors = state.read_sensors();
        assert_eq!(sensors.readings.len(), 3);
        assert!(sensors.readings.iter().all(|r| !r.valid));

        let status = state.read_status();
        assert!(!status.upstream_connected);
        assert!(!status.network_connected);
        assert_eq!(status.last_error, None);
    }

    #[test]
    fn test_write_replaces_whole_record() {
        let state = DeviceState::new(DeviceKind::Environment.profile());

        state.write_status(SystemStatus {
            upstream_connected: true,
            network_connected: true,
            last_error: Some("pump fault".to_string()),
            last_update: 10,
        });
        state.write_status(SystemStatus {
            upstream_connected: false,
            network_connected: false,
            last_error: None,
            last_update: 20,
        });

        let status = state.read_status();
        assert!(!status.upstream_connected);
        assert_eq!(status.last_error, None);
        assert_eq!(status.last_update, 20);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let state = DeviceState::new(DeviceKind::Liquid.profile());
        let before = state.read_sensors();

        state.write_sensors(SensorFrame {
            readings: vec![SensorReading { value: 6.1, valid: true }; 3],
            last_update: 500,
        });

        assert_eq!(before.last_update, 0);
        assert_eq!(state.read_sensors().reading(0), Some(6.1));
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_frames() {
        let state = Arc::new(DeviceState::new(DeviceKind::Environment.profile()));

        let writer = {
            let state = state.clone();
            thread::spawn(move || {
                for i in 1..=2000u64 {
                    let v = i as f32;
                    state.write_sensors(SensorFrame {
                        readings: vec![SensorReading { value: v, valid: true }; 3],
                        last_update: i,
                    });
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let state = state.clone();
                thread::spawn(move || {
                    for _ in 0..2000 {
                        let frame = state.read_sensors();
                        if frame.last_update == 0 {
                            continue;
                        }
                        let expected = frame.last_update as f32;
                        assert!(frame.readings.iter().all(|r| r.value == expected));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
