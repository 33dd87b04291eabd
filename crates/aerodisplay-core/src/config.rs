//! Persisted device configuration.
//!
//! The configuration record is a single JSON document, rewritten in full on
//! every change. Storage is abstracted so the same store logic runs on a
//! flash filesystem or a host directory:
//! - [`FileConfigStorage`] writes `config.json` via a temp file and rename
//! - [`MemoryConfigStorage`] keeps the bytes in memory
//!
//! [`ConfigStore`] owns the in-memory record. Other components only ever get
//! a cloned snapshot and change the record through the store's setters.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::profile::DeviceProfile;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the storage medium failed.
    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// The record could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The medium could not be mounted, even after formatting it.
    #[error("Storage unavailable: {0}")]
    Unrecoverable(String),
}

/// Display theme. Persisted as an RGB565 color value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ThemeColor {
    /// Terminal green.
    #[default]
    Primary,
    /// Terminal yellow.
    Alt,
}

impl ThemeColor {
    pub const fn rgb565(self) -> u16 {
        match self {
            ThemeColor::Primary => 0x07E0,
            ThemeColor::Alt => 0xFFE0,
        }
    }

    /// Unknown colors fall back to the primary theme.
    pub fn from_rgb565(value: u16) -> Self {
        if value == ThemeColor::Alt.rgb565() {
            ThemeColor::Alt
        } else {
            ThemeColor::Primary
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ThemeColor::Primary => ThemeColor::Alt,
            ThemeColor::Alt => ThemeColor::Primary,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ThemeColor::Primary => "GREEN",
            ThemeColor::Alt => "YELLOW",
        }
    }
}

/// Durable device settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub network_ssid: String,
    pub network_password: String,
    pub device_name: String,
    pub user_token: String,
    pub theme_color: ThemeColor,
    /// Set once the registration handshake has succeeded.
    pub registered: bool,
    /// Always `!network_ssid.is_empty()`.
    pub network_configured: bool,
}

impl DeviceConfig {
    /// Safe defaults: no credentials, profile device name, unregistered.
    pub fn defaults(profile: &DeviceProfile) -> Self {
        Self {
            network_ssid: String::new(),
            network_password: String::new(),
            device_name: profile.display_name.to_string(),
            user_token: String::new(),
            theme_color: ThemeColor::Primary,
            registered: false,
            network_configured: false,
        }
    }

    /// Build a record from a parsed document.
    ///
    /// Each field falls back to its default on its own, so a missing or
    /// mistyped field never rejects the rest of the document.
    pub fn from_document(doc: &Value, defaults: &DeviceConfig) -> Self {
        let network_ssid = str_field(doc, "wifi_ssid", &defaults.network_ssid);
        Self {
            network_configured: !network_ssid.is_empty(),
            network_ssid,
            network_password: str_field(doc, "wifi_password", &defaults.network_password),
            device_name: str_field(doc, "device_name", &defaults.device_name),
            user_token: str_field(doc, "user_token", &defaults.user_token),
            theme_color: doc
                .get("main_color")
                .and_then(Value::as_u64)
                .and_then(|v| u16::try_from(v).ok())
                .map(ThemeColor::from_rgb565)
                .unwrap_or(defaults.theme_color),
            registered: doc
                .get("registered")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.registered),
        }
    }

    /// True when a registration token is present but not yet accepted.
    pub fn needs_registration(&self) -> bool {
        !self.registered && !self.user_token.is_empty()
    }

    fn to_persisted(&self) -> PersistedConfig<'_> {
        PersistedConfig {
            wifi_ssid: &self.network_ssid,
            wifi_password: &self.network_password,
            device_name: &self.device_name,
            user_token: &self.user_token,
            main_color: self.theme_color.rgb565(),
            registered: self.registered,
            wifi_configured: !self.network_ssid.is_empty(),
        }
    }
}

fn str_field(doc: &Value, key: &str, default: &str) -> String {
    doc.get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

/// On-disk layout. Every field is always written.
#[derive(Serialize)]
struct PersistedConfig<'a> {
    wifi_ssid: &'a str,
    wifi_password: &'a str,
    device_name: &'a str,
    user_token: &'a str,
    main_color: u16,
    registered: bool,
    wifi_configured: bool,
}

/// Abstract storage medium for the configuration record.
///
/// All methods are synchronous to support embedded platforms. `write` must be
/// atomic: after a crash a subsequent `read` sees either the old or the new
/// bytes, never a partial record.
pub trait ConfigStorage: Send {
    /// Make the medium ready for use.
    fn mount(&mut self) -> Result<(), ConfigError>;

    /// Erase the medium.
    fn format(&mut self) -> Result<(), ConfigError>;

    /// Read the stored record, `None` if nothing has been written yet.
    fn read(&self) -> Result<Option<Vec<u8>>, ConfigError>;

    /// Replace the stored record.
    fn write(&mut self, bytes: &[u8]) -> Result<(), ConfigError>;
}

// ============================================================================
// File Storage
// ============================================================================

/// Directory-backed storage holding a single `config.json`.
#[derive(Debug, Clone)]
pub struct FileConfigStorage {
    dir: PathBuf,
}

impl FileConfigStorage {
    pub const FILE_NAME: &'static str = "config.json";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(Self::FILE_NAME)
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.tmp", Self::FILE_NAME))
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl ConfigStorage for FileConfigStorage {
    fn mount(&mut self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.dir)?;
        if !fs::metadata(&self.dir)?.is_dir() {
            return Err(ConfigError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("{} is not a directory", self.dir.display()),
            )));
        }
        Ok(())
    }

    /// Removes only the files this storage owns. Anything else in the
    /// directory is left alone.
    fn format(&mut self) -> Result<(), ConfigError> {
        match fs::metadata(&self.dir) {
            Ok(meta) if meta.is_dir() => {
                remove_if_present(&self.path())?;
                remove_if_present(&self.temp_path())?;
            }
            Ok(_) => fs::remove_file(&self.dir)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn read(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        match fs::read(self.path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ConfigError> {
        let temp = self.temp_path();
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp, self.path())?;
        Ok(())
    }
}

// ============================================================================
// Memory Storage
// ============================================================================

#[derive(Debug, Default)]
struct MemoryMedium {
    bytes: Option<Vec<u8>>,
    mounted: bool,
    mount_fails: bool,
    format_fails: bool,
    write_fails: bool,
    writes: usize,
}

/// In-memory storage.
///
/// Clones share the same medium, so a clone kept outside the store can
/// inspect what was persisted. Failure switches simulate a broken medium.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStorage {
    medium: Arc<Mutex<MemoryMedium>>,
}

impl MemoryConfigStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that already holds a record.
    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        let storage = Self::new();
        storage.medium().bytes = Some(bytes.into());
        storage
    }

    /// Storage whose first mount fails. If `format_fails` is set the
    /// medium can never be recovered.
    pub fn unmountable(format_fails: bool) -> Self {
        let storage = Self::new();
        {
            let mut medium = storage.medium();
            medium.mount_fails = true;
            medium.format_fails = format_fails;
        }
        storage
    }

    /// Make every following write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.medium().write_fails = fail;
    }

    /// The currently persisted bytes.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.medium().bytes.clone()
    }

    /// Number of completed writes.
    pub fn write_count(&self) -> usize {
        self.medium().writes
    }

    fn medium(&self) -> std::sync::MutexGuard<'_, MemoryMedium> {
        self.medium.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigStorage for MemoryConfigStorage {
    fn mount(&mut self) -> Result<(), ConfigError> {
        let mut medium = self.medium();
        if medium.mount_fails {
            return Err(ConfigError::Unrecoverable("medium not mountable".to_string()));
        }
        medium.mounted = true;
        Ok(())
    }

    fn format(&mut self) -> Result<(), ConfigError> {
        let mut medium = self.medium();
        if medium.format_fails {
            return Err(ConfigError::Unrecoverable("format failed".to_string()));
        }
        medium.bytes = None;
        medium.mount_fails = false;
        Ok(())
    }

    fn read(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        Ok(self.medium().bytes.clone())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ConfigError> {
        let mut medium = self.medium();
        if medium.write_fails {
            return Err(ConfigError::Io(io::Error::new(
                io::ErrorKind::Other,
                "simulated write failure",
            )));
        }
        medium.bytes = Some(bytes.to_vec());
        medium.writes += 1;
        Ok(())
    }
}

// ============================================================================
// Config Store
// ============================================================================

struct StoreInner {
    config: DeviceConfig,
    storage: Box<dyn ConfigStorage>,
}

impl StoreInner {
    fn persist(&mut self) -> Result<(), ConfigError> {
        let bytes = serde_json::to_vec_pretty(&self.config.to_persisted())?;
        self.storage.write(&bytes)?;
        debug!("Configuration saved");
        Ok(())
    }
}

/// Owner of the device configuration.
///
/// Every setter changes the in-memory record and then writes the full record
/// to storage before returning. The record and the storage share one lock,
/// so a mutation and its write form a single exclusive window.
pub struct ConfigStore {
    inner: Mutex<StoreInner>,
    defaults: DeviceConfig,
    revision: AtomicU64,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("config", &self.snapshot())
            .field("revision", &self.revision())
            .finish()
    }
}

impl ConfigStore {
    /// Mount storage and load the configuration.
    ///
    /// Missing or corrupt records are replaced by defaults, which are written
    /// back immediately. If the medium cannot be mounted it is formatted once;
    /// if that fails too, [`ConfigError::Unrecoverable`] is returned.
    pub fn open(
        mut storage: impl ConfigStorage + 'static,
        profile: &DeviceProfile,
    ) -> Result<Self, ConfigError> {
        if let Err(e) = storage.mount() {
            warn!("Config storage mount failed ({}), formatting...", e);
            storage
                .format()
                .and_then(|_| storage.mount())
                .map_err(|e| {
                    error!("Config storage unrecoverable: {}", e);
                    ConfigError::Unrecoverable(e.to_string())
                })?;
            info!("Config storage formatted and mounted");
        }

        let defaults = DeviceConfig::defaults(profile);
        let loaded = match storage.read() {
            Ok(Some(bytes)) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(doc) if doc.is_object() => Some(DeviceConfig::from_document(&doc, &defaults)),
                Ok(_) => {
                    warn!("Config record is not an object");
                    None
                }
                Err(e) => {
                    warn!("Config JSON parse error: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read config record: {}", e);
                None
            }
        };

        let mut inner = StoreInner {
            config: loaded.clone().unwrap_or_else(|| defaults.clone()),
            storage: Box::new(storage),
        };

        if loaded.is_some() {
            info!("Configuration loaded successfully");
        } else {
            info!("No valid config found, creating default");
            if let Err(e) = inner.persist() {
                warn!("Failed to write default configuration: {}", e);
            }
        }

        Ok(Self {
            inner: Mutex::new(inner),
            defaults,
            revision: AtomicU64::new(0),
        })
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> DeviceConfig {
        self.lock().config.clone()
    }

    /// Counter bumped by every mutation, for cheap change detection.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn theme_color(&self) -> ThemeColor {
        self.lock().config.theme_color
    }

    /// Store network credentials. An empty SSID clears the configuration.
    pub fn set_credentials(&self, ssid: &str, password: &str) -> Result<(), ConfigError> {
        self.mutate(|config| {
            config.network_ssid = ssid.to_string();
            config.network_password = password.to_string();
            config.network_configured = !ssid.is_empty();
        })
    }

    /// Store registration identity. A new token needs a new handshake.
    pub fn set_registration_data(
        &self,
        device_name: &str,
        user_token: &str,
    ) -> Result<(), ConfigError> {
        self.mutate(|config| {
            if config.user_token != user_token {
                config.registered = false;
            }
            config.device_name = device_name.to_string();
            config.user_token = user_token.to_string();
        })
    }

    pub fn set_registered(&self, registered: bool) -> Result<(), ConfigError> {
        self.mutate(|config| config.registered = registered)
    }

    pub fn set_theme_color(&self, color: ThemeColor) -> Result<(), ConfigError> {
        self.mutate(|config| config.theme_color = color)
    }

    /// Erase the medium and start over from defaults.
    pub fn format(&self) -> Result<(), ConfigError> {
        let mut inner = self.lock();
        info!("Formatting config storage...");
        inner.storage.format()?;
        inner.storage.mount()?;
        inner.config = self.defaults.clone();
        self.revision.fetch_add(1, Ordering::AcqRel);
        inner.persist()
    }

    fn mutate(&self, f: impl FnOnce(&mut DeviceConfig)) -> Result<(), ConfigError> {
        let mut inner = self.lock();
        f(&mut inner.config);
        self.revision.fetch_add(1, Ordering::AcqRel);
        inner.persist()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
