//! Registration API client

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use hyper::Method;
use serde::Serialize;
use tracing::{debug, info};
use warp_account::{
    ApiContext, ApiSettings, Registration, RegistrationClient, RemoteAccount,
    RemoteBoundDevice, RemoteDevice, RemoteError,
};

use crate::model::{
    find_bound_device, AccountResponse, BoundDeviceResponse, DeviceResponse, RegisterRequest,
    UpdateAccountRequest, UpdateBoundDeviceRequest, UpdateDeviceKeyRequest,
};
use crate::transport::{HttpTransport, TransportResponse};

/// Device type reported on registration
const DEVICE_TYPE: &str = "Android";
const LOCALE: &str = "en_US";

/// [`RegistrationClient`] backed by the HTTPS registration API
pub struct WarpApiClient {
    transport: HttpTransport,
}

impl WarpApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, RemoteError> {
        Ok(Self::with_transport(HttpTransport::new(settings)?))
    }

    pub fn with_transport(transport: HttpTransport) -> Self {
        Self { transport }
    }

    async fn call<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&B>,
    ) -> Result<TransportResponse, RemoteError> {
        let body = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| RemoteError::transport(format!("cannot encode request: {}", e)))?;

        self.transport
            .send(method, path, token, body)
            .await?
            .error_for_status()
    }

    async fn get(&self, ctx: &ApiContext, path: &str) -> Result<TransportResponse, RemoteError> {
        self.call::<()>(Method::GET, path, Some(ctx.access_token()), None).await
    }

    /// PATCH this device's entry in the account device list
    async fn update_bound_device(
        &self,
        ctx: &ApiContext,
        request: &UpdateBoundDeviceRequest<'_>,
    ) -> Result<(RemoteBoundDevice, u16), RemoteError> {
        let path = format!("reg/{0}/account/reg/{0}", ctx.device_id());
        let response = self
            .call(Method::PATCH, &path, Some(ctx.access_token()), Some(request))
            .await?;
        let devices: Vec<BoundDeviceResponse> = response.json()?;
        Ok((find_bound_device(devices, ctx.device_id())?, response.status.as_u16()))
    }
}

#[async_trait]
impl RegistrationClient for WarpApiClient {
    async fn register(&self, public_key: &str, platform: &str) -> Result<Registration, RemoteError> {
        let request = RegisterRequest {
            key: public_key,
            install_id: "",
            fcm_token: "",
            tos: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            model: platform,
            kind: DEVICE_TYPE,
            locale: LOCALE,
        };

        let response = self.call(Method::POST, "reg", None, Some(&request)).await?;
        let mut device: DeviceResponse = response.json()?;
        let access_token = device.token.take().ok_or_else(|| {
            RemoteError::new(response.status.as_u16(), "registration response has no token")
        })?;

        let device = RemoteDevice::try_from(device)?;
        info!("Registered device {} ({})", device.id, platform);
        Ok(Registration { device, access_token })
    }

    async fn get_device(&self, ctx: &ApiContext) -> Result<RemoteDevice, RemoteError> {
        let response = self.get(ctx, &format!("reg/{}", ctx.device_id())).await?;
        RemoteDevice::try_from(response.json::<DeviceResponse>()?)
    }

    async fn get_bound_device(&self, ctx: &ApiContext) -> Result<RemoteBoundDevice, RemoteError> {
        let path = format!("reg/{}/account/devices", ctx.device_id());
        let devices: Vec<BoundDeviceResponse> = self.get(ctx, &path).await?.json()?;
        find_bound_device(devices, ctx.device_id())
    }

    async fn set_device_name(&self, ctx: &ApiContext, name: &str) -> Result<RemoteBoundDevice, RemoteError> {
        let name = if name.is_empty() {
            random_device_label()
        } else {
            name.to_string()
        };
        debug!("Setting device name to {:?}", name);

        let request = UpdateBoundDeviceRequest {
            name: Some(&name),
            ..Default::default()
        };
        let (bound, status) = self.update_bound_device(ctx, &request).await?;

        if bound.name.as_deref() != Some(name.as_str()) {
            return Err(RemoteError::new(status, "could not update device name"));
        }
        Ok(bound)
    }

    async fn activate_bound_device(&self, ctx: &ApiContext, active: bool) -> Result<RemoteBoundDevice, RemoteError> {
        let request = UpdateBoundDeviceRequest {
            active: Some(active),
            ..Default::default()
        };
        let (bound, _) = self.update_bound_device(ctx, &request).await?;
        Ok(bound)
    }

    async fn rotate_license_key(&self, ctx: &ApiContext, new_public_key: &str) -> Result<(), RemoteError> {
        let token = Some(ctx.access_token());

        let account_path = format!("reg/{}/account", ctx.device_id());
        let license = UpdateAccountRequest { license: ctx.license_key() };
        self.call(Method::PUT, &account_path, token, Some(&license)).await?;

        // the service only rebinds the device once its key changes
        let device_path = format!("reg/{}", ctx.device_id());
        let key = UpdateDeviceKeyRequest { key: new_public_key };
        self.call(Method::PATCH, &device_path, token, Some(&key)).await?;

        Ok(())
    }

    async fn get_account(&self, ctx: &ApiContext) -> Result<RemoteAccount, RemoteError> {
        let path = format!("reg/{}/account", ctx.device_id());
        let account: AccountResponse = self.get(ctx, &path).await?.json()?;
        Ok(account.into())
    }
}

/// Six hex digits, used when no device name was given
fn random_device_label() -> String {
    rand::random::<[u8; 3]>()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
