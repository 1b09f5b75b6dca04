//! Wire types for the registration API

use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use warp_account::{RemoteAccount, RemoteBoundDevice, RemoteDevice, RemoteError};

#[derive(Debug, Serialize)]
pub(crate) struct RegisterRequest<'a> {
    pub key: &'a str,
    pub install_id: &'a str,
    pub fcm_token: &'a str,
    /// Terms-of-service acceptance time, RFC 3339
    pub tos: String,
    pub model: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub locale: &'a str,
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct UpdateBoundDeviceRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateAccountRequest<'a> {
    pub license: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateDeviceKeyRequest<'a> {
    pub key: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceResponse {
    pub id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub model: String,
    /// Only present in the registration response
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub account: AccountResponse,
    #[serde(default)]
    pub config: DeviceConfigResponse,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AccountResponse {
    pub license: String,
    pub account_type: String,
    pub role: String,
    pub premium_data: u64,
    pub quota: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct DeviceConfigResponse {
    pub client_id: String,
    pub interface: InterfaceResponse,
    pub peers: Vec<PeerResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct InterfaceResponse {
    pub addresses: AddressesResponse,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AddressesResponse {
    pub v4: String,
    pub v6: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PeerResponse {
    pub public_key: String,
    pub endpoint: PeerEndpointResponse,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PeerEndpointResponse {
    pub host: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BoundDeviceResponse {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorItem {
    message: String,
}

impl From<AccountResponse> for RemoteAccount {
    fn from(account: AccountResponse) -> Self {
        Self {
            license: account.license,
            account_type: account.account_type,
            role: account.role,
            premium_data: account.premium_data,
            quota: account.quota,
        }
    }
}

impl TryFrom<DeviceResponse> for RemoteDevice {
    type Error = RemoteError;

    fn try_from(device: DeviceResponse) -> Result<Self, Self::Error> {
        let DeviceConfigResponse { client_id, interface, peers } = device.config;
        let peer = peers.into_iter().next().ok_or_else(|| {
            RemoteError::new(
                StatusCode::OK.as_u16(),
                format!("device {} has no peer configuration", device.id),
            )
        })?;

        Ok(Self {
            id: device.id,
            public_key: device.key,
            model: device.model,
            interface_address_v4: interface.addresses.v4,
            interface_address_v6: interface.addresses.v6,
            peer_public_key: peer.public_key,
            peer_endpoint_host: peer.endpoint.host,
            client_id,
            account: device.account.into(),
        })
    }
}

impl From<BoundDeviceResponse> for RemoteBoundDevice {
    fn from(device: BoundDeviceResponse) -> Self {
        Self {
            name: device.name,
            active: device.active,
        }
    }
}

/// Pick this device out of the account's device list
pub(crate) fn find_bound_device(
    devices: Vec<BoundDeviceResponse>,
    device_id: &str,
) -> Result<RemoteBoundDevice, RemoteError> {
    devices
        .into_iter()
        .find(|d| d.id == device_id)
        .map(RemoteBoundDevice::from)
        .ok_or_else(|| {
            RemoteError::new(
                StatusCode::NOT_FOUND.as_u16(),
                format!("device {} not bound to account", device_id),
            )
        })
}

/// Human-readable message for an error response
pub(crate) fn error_message(body: &[u8], status: StatusCode) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        let messages: Vec<String> = parsed
            .errors
            .into_iter()
            .filter(|e| !e.message.is_empty())
            .map(|e| e.message)
            .collect();
        if !messages.is_empty() {
            return messages.join("; ");
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        status.canonical_reason().unwrap_or("unknown error").to_string()
    } else {
        text.chars().take(200).collect()
    }
}
