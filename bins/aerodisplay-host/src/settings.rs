//! Host process settings, read from `aerodisplay.toml`.
//!
//! ```toml
//! device = "liquid"
//! storage_dir = "/var/lib/aerodisplay"
//! link_addr = "127.0.0.1:7000"
//! registration_url = "https://api.aeroponic.com/devices/register"
//! ```

use std::path::{Path, PathBuf};

use aerodisplay_core::DeviceKind;
use aerodisplay_node::FirmwareInfo;
use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_SETTINGS_FILE: &str = "aerodisplay.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Device variant this node drives.
    pub device: DeviceKind,
    /// Directory holding `config.json`.
    pub storage_dir: PathBuf,
    /// TCP address of the serial bridge to the controller.
    pub link_addr: String,
    pub registration_url: String,
    pub firmware_version: String,
    pub hardware_info: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        let firmware = FirmwareInfo::default();
        Self {
            device: DeviceKind::Environment,
            storage_dir: PathBuf::from("data"),
            link_addr: "127.0.0.1:7000".to_string(),
            registration_url: "https://api.aeroponic.com/devices/register".to_string(),
            firmware_version: firmware.version,
            hardware_info: firmware.hardware,
        }
    }
}

impl NodeSettings {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }

    /// Settings from an explicit path, else the default file if present,
    /// else built-in defaults.
    pub fn resolve(explicit: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let path = Path::new(DEFAULT_SETTINGS_FILE);
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!("No {} found, using defaults", DEFAULT_SETTINGS_FILE);
            Ok(Self::default())
        }
    }

    pub fn firmware(&self) -> FirmwareInfo {
        FirmwareInfo {
            version: self.firmware_version.clone(),
            hardware: self.hardware_info.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: NodeSettings = toml::from_str(
            r#"
            device = "liquid"
            link_addr = "10.0.0.5:4000"
            "#,
        )
        .unwrap();

        assert_eq!(settings.device, DeviceKind::Liquid);
        assert_eq!(settings.link_addr, "10.0.0.5:4000");
        assert_eq!(settings.storage_dir, PathBuf::from("data"));
        assert_eq!(
            settings.registration_url,
            "https://api.aeroponic.com/devices/register"
        );
    }

    #[test]
    fn test_unknown_device_is_rejected() {
        assert!(toml::from_str::<NodeSettings>(r#"device = "plasma""#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "firmware_version = \"2.1.0\"").unwrap();
        writeln!(file, "hardware_info = \"bench rig\"").unwrap();

        let settings = NodeSettings::load(file.path()).unwrap();
        let firmware = settings.firmware();
        assert_eq!(firmware.version, "2.1.0");
        assert_eq!(firmware.hardware, "bench rig");
        assert_eq!(settings.device, DeviceKind::Environment);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = NodeSettings::resolve(Some(dir.path().join("nope.toml")));
        assert!(result.is_err());
    }
}
