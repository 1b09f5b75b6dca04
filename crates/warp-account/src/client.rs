//! Registration Service Boundary
//!
//! Everything the orchestrator needs from the remote device registration
//! service, behind one trait so tests can swap in canned responses.

use crate::account::AccountRecord;
use async_trait::async_trait;
use std::fmt;

/// Remote device record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteDevice {
    pub id: String,
    /// Public key the service has on file for this device (base64)
    pub public_key: String,
    pub model: String,
    pub interface_address_v4: String,
    pub interface_address_v6: String,
    pub peer_public_key: String,
    /// Peer endpoint, `host:port`
    pub peer_endpoint_host: String,
    /// Base64 client id, source of the reserved bytes
    pub client_id: String,
    pub account: RemoteAccount,
}

/// Account the device belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAccount {
    /// Authoritative license key
    pub license: String,
    pub account_type: String,
    pub role: String,
    pub premium_data: u64,
    pub quota: u64,
}

/// Activation view of the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteBoundDevice {
    pub name: Option<String>,
    pub active: bool,
}

/// Result of a successful registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub device: RemoteDevice,
    pub access_token: String,
}

/// Credentials for authenticated calls, fixed for one call chain
#[derive(Clone, PartialEq, Eq)]
pub struct ApiContext {
    device_id: String,
    access_token: String,
    license_key: String,
}

impl ApiContext {
    pub fn new(
        device_id: impl Into<String>,
        access_token: impl Into<String>,
        license_key: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            access_token: access_token.into(),
            license_key: license_key.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn license_key(&self) -> &str {
        &self.license_key
    }
}

impl From<&AccountRecord> for ApiContext {
    fn from(record: &AccountRecord) -> Self {
        Self::new(&record.device_id, &record.access_token, &record.license_key)
    }
}

impl fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiContext")
            .field("device_id", &self.device_id)
            .field("license_key", &self.license_key)
            .finish_non_exhaustive()
    }
}

/// Failure talking to the registration service
///
/// `status` is `None` when no HTTP response was received (connect error,
/// TLS failure, timeout). A 2xx status means the response arrived but its
/// body was unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Transport-level failure (no response)
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::transport("request timed out")
    }

    /// Whether a caller may reasonably try again
    pub fn is_retryable(&self) -> bool {
        match self.status {
            None => true,
            Some(code) => code == 429 || code >= 500,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) if (200..300).contains(&code) => {
                write!(f, "malformed response from registration service: {}", self.message)
            }
            Some(code) => write!(f, "registration service returned {}: {}", code, self.message),
            None => write!(f, "registration service unreachable: {}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Remote device registration service
#[async_trait]
pub trait RegistrationClient: Send + Sync {
    /// Create a new device and account for `public_key`
    async fn register(&self, public_key: &str, platform: &str) -> Result<Registration, RemoteError>;

    async fn get_device(&self, ctx: &ApiContext) -> Result<RemoteDevice, RemoteError>;

    async fn get_bound_device(&self, ctx: &ApiContext) -> Result<RemoteBoundDevice, RemoteError>;

    /// Label the device. An empty name asks the service side for a default.
    async fn set_device_name(&self, ctx: &ApiContext, name: &str) -> Result<RemoteBoundDevice, RemoteError>;

    async fn activate_bound_device(&self, ctx: &ApiContext, active: bool) -> Result<RemoteBoundDevice, RemoteError>;

    /// Move the device to the license in `ctx` and replace its public key
    async fn rotate_license_key(&self, ctx: &ApiContext, new_public_key: &str) -> Result<(), RemoteError>;

    async fn get_account(&self, ctx: &ApiContext) -> Result<RemoteAccount, RemoteError>;
}

/// Device plus activation state, as printed after each command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub device: RemoteDevice,
    pub bound: RemoteBoundDevice,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let account = &self.device.account;
        let rows = [
            ("Device id", self.device.id.clone()),
            ("Public key", self.device.public_key.clone()),
            ("Device model", self.device.model.clone()),
            ("Device name", self.bound.name.clone().unwrap_or_default()),
            ("Device active", self.bound.active.to_string()),
            ("Account type", account.account_type.clone()),
            ("Role", account.role.clone()),
            ("Premium data", format_bytes(account.premium_data)),
            ("Quota", format_bytes(account.quota)),
        ];

        for (label, value) in rows {
            writeln!(f, "{:<14} {}", format!("{}:", label), value)?;
        }
        Ok(())
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
