//! In-memory registration service for orchestrator tests

use crate::client::{
    ApiContext, Registration, RegistrationClient, RemoteAccount, RemoteBoundDevice,
    RemoteDevice, RemoteError,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

pub(crate) const DEVICE_ID: &str = "c2a5f5b4-6d0e-4a58-9c33-0d7f1f1a2b3c";
pub(crate) const ACCESS_TOKEN: &str = "fake-access-token";
pub(crate) const INITIAL_LICENSE: &str = "initial-license";

#[derive(Debug)]
pub(crate) struct FakeState {
    pub device: RemoteDevice,
    pub bound: RemoteBoundDevice,
    /// Method names in call order
    pub calls: Vec<&'static str>,
    /// Names passed to `set_device_name`
    pub names_set: Vec<String>,
    /// Service refuses to activate the device
    pub refuse_activation: bool,
    /// Service accepts rotation but keeps the old license
    pub ignore_license_update: bool,
    /// Service accepts rotation but keeps the old public key
    pub ignore_key_update: bool,
    /// Fail this method with a 500
    pub fail_on: Option<&'static str>,
}

/// Cheap to clone; clones share state so tests can inspect after the
/// orchestrator takes ownership.
#[derive(Debug, Clone)]
pub(crate) struct FakeRegistrationClient {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRegistrationClient {
    pub fn new() -> Self {
        let device = RemoteDevice {
            id: DEVICE_ID.to_string(),
            public_key: String::new(),
            model: "PC".to_string(),
            interface_address_v4: "172.16.0.2".to_string(),
            interface_address_v6: "2606:4700:110:8765::2".to_string(),
            peer_public_key: "bmXOC+F1FxEMF9dyiK2H5/1SUtzH0JuVo51h2wPfgyo=".to_string(),
            peer_endpoint_host: "engage.cloudflareclient.com:2408".to_string(),
            client_id: "AAEC".to_string(),
            account: RemoteAccount {
                license: INITIAL_LICENSE.to_string(),
                account_type: "free".to_string(),
                role: "parent".to_string(),
                premium_data: 0,
                quota: 0,
            },
        };

        Self {
            state: Arc::new(Mutex::new(FakeState {
                device,
                bound: RemoteBoundDevice::default(),
                calls: Vec::new(),
                names_set: Vec::new(),
                refuse_activation: false,
                ignore_license_update: false,
                ignore_key_update: false,
                fail_on: None,
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == method).count()
    }

    fn enter(&self, method: &'static str) -> Result<MutexGuard<'_, FakeState>, RemoteError> {
        let mut state = self.state();
        state.calls.push(method);
        if state.fail_on == Some(method) {
            return Err(RemoteError::new(500, format!("{} failed", method)));
        }
        Ok(state)
    }

    fn authorize(state: &FakeState, ctx: &ApiContext) -> Result<(), RemoteError> {
        if ctx.device_id() != state.device.id || ctx.access_token() != ACCESS_TOKEN {
            return Err(RemoteError::new(401, "unauthorized"));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistrationClient for FakeRegistrationClient {
    async fn register(&self, public_key: &str, _platform: &str) -> Result<Registration, RemoteError> {
        let mut state = self.enter("register")?;
        state.device.public_key = public_key.to_string();
        Ok(Registration {
            device: state.device.clone(),
            access_token: ACCESS_TOKEN.to_string(),
        })
    }

    async fn get_device(&self, ctx: &ApiContext) -> Result<RemoteDevice, RemoteError> {
        let state = self.enter("get_device")?;
        Self::authorize(&state, ctx)?;
        Ok(state.device.clone())
    }

    async fn get_bound_device(&self, ctx: &ApiContext) -> Result<RemoteBoundDevice, RemoteError> {
        let state = self.enter("get_bound_device")?;
        Self::authorize(&state, ctx)?;
        Ok(state.bound.clone())
    }

    async fn set_device_name(&self, ctx: &ApiContext, name: &str) -> Result<RemoteBoundDevice, RemoteError> {
        let mut state = self.enter("set_device_name")?;
        Self::authorize(&state, ctx)?;
        state.names_set.push(name.to_string());
        let label = if name.is_empty() { "a1b2c3" } else { name };
        state.bound.name = Some(label.to_string());
        Ok(state.bound.clone())
    }

    async fn activate_bound_device(&self, ctx: &ApiContext, active: bool) -> Result<RemoteBoundDevice, RemoteError> {
        let mut state = self.enter("activate_bound_device")?;
        Self::authorize(&state, ctx)?;
        state.bound.active = active && !state.refuse_activation;
        Ok(state.bound.clone())
    }

    async fn rotate_license_key(&self, ctx: &ApiContext, new_public_key: &str) -> Result<(), RemoteError> {
        let mut state = self.enter("rotate_license_key")?;
        Self::authorize(&state, ctx)?;
        if !state.ignore_license_update {
            state.device.account.license = ctx.license_key().to_string();
        }
        if !state.ignore_key_update {
            state.device.public_key = new_public_key.to_string();
        }
        Ok(())
    }

    async fn get_account(&self, ctx: &ApiContext) -> Result<RemoteAccount, RemoteError> {
        let state = self.enter("get_account")?;
        Self::authorize(&state, ctx)?;
        Ok(state.device.account.clone())
    }
}
