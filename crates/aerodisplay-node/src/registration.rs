//! Device registration handshake with the remote service.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use aerodisplay_core::{DeviceConfig, DeviceProfile};

/// The only status code that counts as a successful registration.
pub const REGISTRATION_SUCCESS: u16 = 200;

/// Ceiling on a single registration attempt, end to end.
pub const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a registration attempt that never produced a status code.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Registration transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Registration rejected locally: {0}")]
    Invalid(String),
}

/// Firmware identity sent with each registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub version: String,
    pub hardware: String,
}

impl Default for FirmwareInfo {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            hardware: "ESP32-S3 4.3\" Display".to_string(),
        }
    }
}

/// Registration request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationRequest {
    pub device_name: String,
    pub device_type: String,
    pub user_token: String,
    pub firmware_version: String,
    pub hardware_info: String,
    /// RFC 3339 wall-clock time of the attempt.
    pub requested_at: String,
}

impl RegistrationRequest {
    pub fn new(config: &DeviceConfig, profile: &DeviceProfile, firmware: &FirmwareInfo) -> Self {
        Self {
            device_name: config.device_name.clone(),
            device_type: profile.type_name.to_string(),
            user_token: config.user_token.clone(),
            firmware_version: firmware.version.clone(),
            hardware_info: firmware.hardware.clone(),
            requested_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Something that can perform the registration handshake.
///
/// Returns the status code reported by the remote service. Only
/// [`REGISTRATION_SUCCESS`] marks the device as registered.
pub trait Registrar: Send + Sync {
    fn register<'a>(
        &'a self,
        request: &'a RegistrationRequest,
    ) -> BoxFuture<'a, Result<u16, RegistrationError>>;
}

/// Registrar posting JSON over HTTPS with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpRegistrar {
    client: reqwest::Client,
    url: String,
}

impl HttpRegistrar {
    pub fn new(url: impl Into<String>) -> Result<Self, RegistrationError> {
        let client = reqwest::Client::builder()
            .connect_timeout(REGISTRATION_TIMEOUT)
            .timeout(REGISTRATION_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Registrar for HttpRegistrar {
    fn register<'a>(
        &'a self,
        request: &'a RegistrationRequest,
    ) -> BoxFuture<'a, Result<u16, RegistrationError>> {
        Box::pin(async move {
            if request.user_token.is_empty() {
                return Err(RegistrationError::Invalid("empty user token".to_string()));
            }

            debug!("POST {} for device '{}'", self.url, request.device_name);
            let response = self
                .client
                .post(&self.url)
                .bearer_auth(&request.user_token)
                .json(request)
                .send()
                .await?;

            Ok(response.status().as_u16())
        })
    }
}
