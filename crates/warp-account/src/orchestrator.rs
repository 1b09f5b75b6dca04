//! Account Orchestrator
//!
//! Sequences key generation, the registration service and the local stores
//! into the public operations: register, update, generate, status and run.
//!
//! # Usage
//!
//! ```rust,ignore
//! let config = WarpConfig::load(path)?;
//! let accounts = AccountStore::new(config.account_path());
//! let profiles = ProfileStore::new(
//!     config.warp_config_path(),
//!     config.profile_path(),
//!     config.profile.clone(),
//! );
//! let mut warp = AccountOrchestrator::new(client, accounts, profiles);
//!
//! warp.run("license-key").await?;
//! ```

use crate::account::{AccountRecord, AccountStore};
use crate::client::{ApiContext, DeviceStatus, RegistrationClient, RemoteBoundDevice, RemoteDevice};
use crate::error::AccountError;
use crate::keys::KeyPair;
use crate::profile::{ProfileConfig, ProfileStore};
use tracing::{debug, info, warn};

/// Default platform label sent on registration
const DEFAULT_PLATFORM: &str = "PC";

/// Where the account stands, as far as this process has observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    /// No valid local record
    Unregistered,
    /// Valid record, license not yet checked against the service
    Registered,
    /// Local license key confirmed equal to the remote one
    Reconciled,
    /// Bound device confirmed active
    Activated,
}

impl AccountState {
    pub fn is_registered(&self) -> bool {
        !matches!(self, AccountState::Unregistered)
    }

    pub fn is_activated(&self) -> bool {
        matches!(self, AccountState::Activated)
    }
}

/// Drives the account lifecycle against a [`RegistrationClient`]
pub struct AccountOrchestrator<C> {
    client: C,
    accounts: AccountStore,
    profiles: ProfileStore,
    platform: String,
    /// In-memory copy of the account file
    account: AccountRecord,
    state: AccountState,
}

impl<C: RegistrationClient> AccountOrchestrator<C> {
    /// Create an orchestrator, loading the account record from `accounts`
    pub fn new(client: C, accounts: AccountStore, profiles: ProfileStore) -> Self {
        let account = accounts.load();
        let state = if account.is_valid() {
            AccountState::Registered
        } else {
            AccountState::Unregistered
        };

        Self {
            client,
            accounts,
            profiles,
            platform: DEFAULT_PLATFORM.to_string(),
            account,
            state,
        }
    }

    /// Set the platform label used on registration
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn account(&self) -> &AccountRecord {
        &self.account
    }

    pub fn state(&self) -> AccountState {
        self.state
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    /// Whether the local record can be used for authenticated calls
    pub fn is_account_valid(&self) -> bool {
        if !self.account.is_valid() {
            warn!("No valid account detected in {}", self.accounts.path().display());
            return false;
        }
        true
    }

    /// Register a new device unless a valid account already exists.
    ///
    /// Returns `None` when nothing was done.
    pub async fn register(&mut self) -> Result<Option<DeviceStatus>, AccountError> {
        if self.account.is_valid() {
            info!("Account already exists: {}", self.accounts.path().display());
            return Ok(None);
        }

        let keys = KeyPair::generate().map_err(AccountError::KeyGeneration)?;
        let registration = self.client
            .register(&keys.public.to_base64(), &self.platform)
            .await?;

        self.account = AccountRecord {
            private_key: keys.private.to_base64(),
            device_id: registration.device.id.clone(),
            access_token: registration.access_token,
            license_key: registration.device.account.license.clone(),
        };
        self.persist_account()?;
        self.state = AccountState::Reconciled;
        info!("Registered device {}", self.account.device_id);

        let ctx = ApiContext::from(&self.account);
        self.client.set_device_name(&ctx, "").await?;
        let device = self.client.get_device(&ctx).await?;
        let bound = self.activate(&ctx).await?;

        info!("Created account: {}", self.accounts.path().display());
        Ok(Some(DeviceStatus { device, bound }))
    }

    /// Bind the account to `license_key`, rotating the device key when the
    /// service is on a different license, then make sure the device is named
    /// and active.
    ///
    /// An empty license key is skipped with a warning and returns `None`.
    pub async fn update(
        &mut self,
        license_key: &str,
        device_name: Option<&str>,
    ) -> Result<Option<DeviceStatus>, AccountError> {
        self.require_valid()?;
        if license_key.is_empty() {
            warn!("Invalid license key entered, skipping update");
            return Ok(None);
        }

        self.account.license_key = license_key.to_string();
        self.persist_account()?;

        let ctx = ApiContext::from(&self.account);
        let device = self.client.get_device(&ctx).await?;
        let device = self.ensure_license_key(&ctx, device).await?;
        self.state = AccountState::Reconciled;

        let bound = self.client.get_bound_device(&ctx).await?;
        let wanted = device_name.unwrap_or_default();
        if needs_rename(&bound, wanted) {
            info!("Setting device name");
            self.client.set_device_name(&ctx, wanted).await?;
        }

        let bound = self.activate(&ctx).await?;

        info!("Updated account: {}", self.accounts.path().display());
        Ok(Some(DeviceStatus { device, bound }))
    }

    /// Write the WireGuard profile and warp-config record for the device
    pub async fn generate(&mut self) -> Result<DeviceStatus, AccountError> {
        self.require_valid()?;

        let ctx = ApiContext::from(&self.account);
        let device = self.client.get_device(&ctx).await?;
        let bound = self.client.get_bound_device(&ctx).await?;

        let profile = ProfileConfig::from_device(&self.account.private_key, &device)
            .map_err(|source| AccountError::ClientIdDecode {
                client_id: device.client_id.clone(),
                source,
            })?;
        self.profiles.save(&profile).map_err(AccountError::ProfileWrite)?;

        info!("Generated WireGuard profile: {}", self.profiles.profile_path().display());
        Ok(DeviceStatus { device, bound })
    }

    /// Fetch the device and its activation state
    pub async fn status(&self) -> Result<DeviceStatus, AccountError> {
        self.require_valid()?;

        let ctx = ApiContext::from(&self.account);
        let device = self.client.get_device(&ctx).await?;
        let bound = self.client.get_bound_device(&ctx).await?;
        Ok(DeviceStatus { device, bound })
    }

    /// Register if needed, update to `license_key`, then generate
    pub async fn run(&mut self, license_key: &str) -> Result<DeviceStatus, AccountError> {
        if !self.is_account_valid() {
            self.register().await?;
        }
        self.update(license_key, None).await?;
        self.generate().await
    }

    fn require_valid(&self) -> Result<(), AccountError> {
        if self.is_account_valid() {
            Ok(())
        } else {
            Err(AccountError::InvalidAccount)
        }
    }

    fn persist_account(&self) -> Result<(), AccountError> {
        self.accounts.save(&self.account).map_err(AccountError::AccountWrite)
    }

    async fn activate(&mut self, ctx: &ApiContext) -> Result<RemoteBoundDevice, AccountError> {
        let bound = self.client.activate_bound_device(ctx, true).await?;
        if !bound.active {
            return Err(AccountError::ActivationFailed);
        }
        self.state = AccountState::Activated;
        Ok(bound)
    }

    async fn ensure_license_key(
        &mut self,
        ctx: &ApiContext,
        device: RemoteDevice,
    ) -> Result<RemoteDevice, AccountError> {
        if device.account.license == ctx.license_key() {
            debug!("License key already in sync");
            return Ok(device);
        }

        info!("Updated license key detected, re-binding device to new account");
        self.rotate_license_key(ctx).await
    }

    async fn rotate_license_key(&mut self, ctx: &ApiContext) -> Result<RemoteDevice, AccountError> {
        let keys = KeyPair::generate().map_err(AccountError::KeyGeneration)?;
        let new_public_key = keys.public.to_base64();

        self.client.rotate_license_key(ctx, &new_public_key).await?;

        self.account.private_key = keys.private.to_base64();
        self.persist_account()?;

        let account = self.client.get_account(ctx).await?;
        let device = self.client.get_device(ctx).await?;

        if account.license != self.account.license_key {
            return Err(AccountError::LicenseKeyMismatch {
                expected: self.account.license_key.clone(),
                actual: account.license,
            });
        }
        if device.public_key != keys.private.public_key().to_base64() {
            return Err(AccountError::KeyRotationVerification);
        }

        Ok(device)
    }
}

/// The device needs a (new) name when it has none, or when the caller
/// asked for a specific one that differs from the current name.
fn needs_rename(bound: &RemoteBoundDevice, wanted: &str) -> bool {
    match bound.name.as_deref() {
        None => true,
        Some(current) => !wanted.is_empty() && wanted != current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileSettings;
    use crate::keys::PrivateKey;
    use crate::testing::{ACCESS_TOKEN, DEVICE_ID, FakeRegistrationClient, INITIAL_LICENSE};
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        client: FakeRegistrationClient,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                client: FakeRegistrationClient::new(),
            }
        }

        fn accounts(&self) -> AccountStore {
            AccountStore::new(self.dir.path().join("wgcf-account.toml"))
        }

        fn profiles(&self) -> ProfileStore {
            ProfileStore::new(
                self.dir.path().join("wgcf-config.json"),
                self.dir.path().join("wgcf-profile.conf"),
                ProfileSettings::default(),
            )
        }

        fn orchestrator(&self) -> AccountOrchestrator<FakeRegistrationClient> {
            AccountOrchestrator::new(self.client.clone(), self.accounts(), self.profiles())
        }

        /// Seed the account file as if a previous register had run
        fn with_account(self) -> Self {
            let keys = KeyPair::generate().unwrap();
            self.client.state().device.public_key = keys.public.to_base64();
            self.accounts()
                .save(&AccountRecord {
                    private_key: keys.private.to_base64(),
                    device_id: DEVICE_ID.to_string(),
                    access_token: ACCESS_TOKEN.to_string(),
                    license_key: INITIAL_LICENSE.to_string(),
                })
                .unwrap();
            self
        }
    }

    #[tokio::test]
    async fn test_register_fresh_environment() {
        let h = Harness::new();
        let mut warp = h.orchestrator();
        assert_eq!(warp.state(), AccountState::Unregistered);
        assert!(!warp.state().is_registered());

        let status = warp.register().await.unwrap().expect("registered");

        let record = h.accounts().load();
        assert!(record.is_valid());
        assert_eq!(record.device_id, DEVICE_ID);
        assert_eq!(record.access_token, ACCESS_TOKEN);
        assert_eq!(record.license_key, INITIAL_LICENSE);
        assert!(status.bound.active);
        assert!(warp.state().is_activated());

        // the key registered remotely belongs to the stored private key
        let private = PrivateKey::from_base64(&record.private_key).unwrap();
        assert_eq!(private.public_key().to_base64(), status.device.public_key);

        assert_eq!(h.client.state().names_set, vec![String::new()]);
        assert_eq!(
            h.client.calls(),
            vec!["register", "set_device_name", "get_device", "activate_bound_device"]
        );
    }

    #[tokio::test]
    async fn test_second_register_is_noop() {
        let h = Harness::new();
        let mut warp = h.orchestrator();
        warp.register().await.unwrap();
        let before = h.accounts().load();

        assert!(warp.register().await.unwrap().is_none());

        // also a no-op from a fresh process
        assert!(h.orchestrator().register().await.unwrap().is_none());
        assert_eq!(h.client.count("register"), 1);
        assert_eq!(h.accounts().load(), before);
    }

    #[tokio::test]
    async fn test_register_activation_refused() {
        let h = Harness::new();
        h.client.state().refuse_activation = true;
        let mut warp = h.orchestrator();

        let result = warp.register().await;

        assert!(matches!(result, Err(AccountError::ActivationFailed)));
        // record stays persisted
        assert!(h.accounts().load().is_valid());
        assert!(warp.state().is_registered());
        assert!(!warp.state().is_activated());
    }

    #[tokio::test]
    async fn test_register_remote_failure_keeps_environment_clean() {
        let h = Harness::new();
        h.client.state().fail_on = Some("register");
        let mut warp = h.orchestrator();

        let result = warp.register().await;

        assert!(matches!(result, Err(AccountError::Remote(_))));
        assert!(!h.accounts().path().exists());
    }

    #[tokio::test]
    async fn test_update_requires_valid_account() {
        let h = Harness::new();
        let mut warp = h.orchestrator();

        let result = warp.update("new-license", None).await;

        assert!(matches!(result, Err(AccountError::InvalidAccount)));
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_empty_license_is_noop() {
        let h = Harness::new().with_account();
        let before = h.accounts().load();
        let mut warp = h.orchestrator();

        assert!(warp.update("", Some("laptop")).await.unwrap().is_none());

        assert_eq!(h.accounts().load(), before);
        assert_eq!(warp.account(), &before);
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_same_license_skips_rotation() {
        let h = Harness::new().with_account();
        let before = h.accounts().load();
        let mut warp = h.orchestrator();

        let status = warp.update(INITIAL_LICENSE, None).await.unwrap().unwrap();

        assert_eq!(h.client.count("rotate_license_key"), 0);
        assert_eq!(h.accounts().load().private_key, before.private_key);
        assert!(status.bound.active);
        assert_eq!(warp.state(), AccountState::Activated);
    }

    #[tokio::test]
    async fn test_update_new_license_rotates_key() {
        let h = Harness::new().with_account();
        let before = h.accounts().load();
        let mut warp = h.orchestrator();

        let status = warp.update("new-license", None).await.unwrap().unwrap();

        let record = h.accounts().load();
        assert_eq!(record.license_key, "new-license");
        assert_ne!(record.private_key, before.private_key);
        assert_eq!(h.client.count("rotate_license_key"), 1);

        let private = PrivateKey::from_base64(&record.private_key).unwrap();
        assert_eq!(status.device.public_key, private.public_key().to_base64());
        assert_eq!(status.device.account.license, "new-license");
        assert_eq!(warp.state(), AccountState::Activated);
    }

    #[tokio::test]
    async fn test_rotation_license_mismatch() {
        let h = Harness::new().with_account();
        h.client.state().ignore_license_update = true;
        let mut warp = h.orchestrator();

        let result = warp.update("new-license", None).await;

        match result {
            Err(AccountError::LicenseKeyMismatch { expected, actual }) => {
                assert_eq!(expected, "new-license");
                assert_eq!(actual, INITIAL_LICENSE);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(h.client.count("activate_bound_device"), 0);
    }

    #[tokio::test]
    async fn test_rotation_public_key_not_applied() {
        let h = Harness::new().with_account();
        h.client.state().ignore_key_update = true;
        let mut warp = h.orchestrator();

        let result = warp.update("new-license", None).await;

        assert!(matches!(result, Err(AccountError::KeyRotationVerification)));
        // new private key was already persisted before verification
        assert_eq!(h.accounts().load().private_key, warp.account().private_key);
    }

    #[tokio::test]
    async fn test_update_names_unnamed_device() {
        let h = Harness::new().with_account();
        let mut warp = h.orchestrator();

        warp.update(INITIAL_LICENSE, None).await.unwrap();

        assert_eq!(h.client.state().names_set, vec![String::new()]);
    }

    #[tokio::test]
    async fn test_update_renames_only_when_requested_name_differs() {
        let h = Harness::new().with_account();
        h.client.state().bound.name = Some("desktop".into());
        let mut warp = h.orchestrator();

        warp.update(INITIAL_LICENSE, None).await.unwrap();
        warp.update(INITIAL_LICENSE, Some("desktop")).await.unwrap();
        assert!(h.client.state().names_set.is_empty());

        let status = warp.update(INITIAL_LICENSE, Some("laptop")).await.unwrap().unwrap();
        assert_eq!(h.client.state().names_set, vec!["laptop".to_string()]);
        assert_eq!(status.bound.name.as_deref(), Some("laptop"));
    }

    #[tokio::test]
    async fn test_update_activation_refused() {
        let h = Harness::new().with_account();
        h.client.state().refuse_activation = true;
        let mut warp = h.orchestrator();

        let result = warp.update(INITIAL_LICENSE, None).await;

        assert!(matches!(result, Err(AccountError::ActivationFailed)));
        assert_eq!(warp.state(), AccountState::Reconciled);
    }

    #[tokio::test]
    async fn test_generate_writes_profile() {
        let h = Harness::new().with_account();
        let record = h.accounts().load();
        let mut warp = h.orchestrator();

        warp.generate().await.unwrap();

        let text = std::fs::read_to_string(h.profiles().profile_path()).unwrap();
        assert!(text.contains(&format!("PrivateKey = {}", record.private_key)));
        assert!(text.contains("Reserved = 0, 1, 2"));

        let stored = h.profiles().load().unwrap();
        assert_eq!(stored.private_key, record.private_key);
        assert_eq!(stored.client_id, "AAEC");
        assert_eq!(stored.reserved.len(), 3);
        assert_eq!(h.client.calls(), vec!["get_device", "get_bound_device"]);
    }

    #[tokio::test]
    async fn test_generate_rejects_malformed_client_id() {
        let h = Harness::new().with_account();
        h.client.state().device.client_id = "not base64!".into();
        let mut warp = h.orchestrator();

        let result = warp.generate().await;

        assert!(matches!(result, Err(AccountError::ClientIdDecode { .. })));
        assert!(!h.profiles().profile_path().exists());
        assert!(!h.profiles().warp_config_path().exists());
    }

    #[tokio::test]
    async fn test_generate_profile_write_failure() {
        let h = Harness::new().with_account();
        let blocker = h.dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let profiles = ProfileStore::new(
            blocker.join("wgcf-config.json"),
            blocker.join("wgcf-profile.conf"),
            ProfileSettings::default(),
        );
        let mut warp = AccountOrchestrator::new(h.client.clone(), h.accounts(), profiles);

        let result = warp.generate().await;

        assert!(matches!(result, Err(AccountError::ProfileWrite(_))));
    }

    #[tokio::test]
    async fn test_status_requires_valid_account() {
        let h = Harness::new();
        let warp = h.orchestrator();

        assert!(matches!(warp.status().await, Err(AccountError::InvalidAccount)));
    }

    #[tokio::test]
    async fn test_status_is_read_only() {
        let h = Harness::new().with_account();
        let before = h.accounts().load();
        let warp = h.orchestrator();

        let status = warp.status().await.unwrap();

        assert_eq!(status.device.id, DEVICE_ID);
        assert_eq!(h.client.calls(), vec!["get_device", "get_bound_device"]);
        assert_eq!(h.accounts().load(), before);
        assert_eq!(warp.state(), AccountState::Registered);
    }

    #[tokio::test]
    async fn test_remote_error_propagates() {
        let h = Harness::new().with_account();
        h.client.state().fail_on = Some("get_bound_device");
        let warp = h.orchestrator();

        match warp.status().await {
            Err(AccountError::Remote(e)) => assert_eq!(e.status, Some(500)),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_from_scratch() {
        let h = Harness::new();
        let mut warp = h.orchestrator();

        let status = warp.run("new-license").await.unwrap();

        assert!(status.bound.active);
        assert_eq!(h.client.count("register"), 1);
        assert_eq!(h.client.count("rotate_license_key"), 1);
        assert_eq!(h.accounts().load().license_key, "new-license");

        let text = std::fs::read_to_string(h.profiles().profile_path()).unwrap();
        assert!(text.contains(&format!("PrivateKey = {}", warp.account().private_key)));
    }

    #[tokio::test]
    async fn test_run_stops_at_first_error() {
        let h = Harness::new();
        h.client.state().refuse_activation = true;
        let mut warp = h.orchestrator();

        assert!(matches!(warp.run("lic").await, Err(AccountError::ActivationFailed)));
        assert_eq!(h.client.count("get_bound_device"), 0);
        assert!(!h.profiles().profile_path().exists());
    }

    #[test]
    fn test_account_state_predicates() {
        assert!(!AccountState::Unregistered.is_registered());
        assert!(AccountState::Registered.is_registered());
        assert!(AccountState::Reconciled.is_registered());
        assert!(AccountState::Activated.is_registered());

        assert!(AccountState::Activated.is_activated());
        assert!(!AccountState::Reconciled.is_activated());
    }

    #[test]
    fn test_needs_rename() {
        let unnamed = RemoteBoundDevice { name: None, active: true };
        let named = RemoteBoundDevice { name: Some("pc".into()), active: true };

        assert!(needs_rename(&unnamed, ""));
        assert!(needs_rename(&unnamed, "pc"));
        assert!(!needs_rename(&named, ""));
        assert!(!needs_rename(&named, "pc"));
        assert!(needs_rename(&named, "laptop"));
    }
}
