//! WireGuard Profile
//!
//! [`ProfileConfig`] is rebuilt from scratch on every generate call and
//! written twice: as a JSON record (`wgcf-config.json`) and as the
//! ini-style profile that WireGuard clients import (`wgcf-profile.conf`).

use crate::client::RemoteDevice;
use crate::config::ProfileSettings;
use crate::fs::write_atomic;
use crate::reserved::reserved_from_client_id;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Connection parameters derived from the account and remote device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub private_key: String,
    pub addr_v4: String,
    pub addr_v6: String,
    pub public_key: String,
    pub endpoint: String,
    pub client_id: String,
    /// Decoded client id bytes, in order
    pub reserved: Vec<u8>,
}

impl ProfileConfig {
    /// Build from the local private key and the remote device record
    pub fn from_device(
        private_key: &str,
        device: &RemoteDevice,
    ) -> Result<Self, base64::DecodeError> {
        let reserved = reserved_from_client_id(&device.client_id)?;

        Ok(Self {
            private_key: private_key.to_string(),
            addr_v4: device.interface_address_v4.clone(),
            addr_v6: device.interface_address_v6.clone(),
            public_key: device.peer_public_key.clone(),
            endpoint: device.peer_endpoint_host.clone(),
            client_id: device.client_id.clone(),
            reserved,
        })
    }

    /// Render the WireGuard profile text
    pub fn render(&self, settings: &ProfileSettings) -> String {
        let mut out = String::new();

        // Writing to a String cannot fail
        let _ = writeln!(out, "[Interface]");
        let _ = writeln!(out, "PrivateKey = {}", self.private_key);
        let _ = writeln!(out, "Address = {}/32", self.addr_v4);
        let _ = writeln!(out, "Address = {}/128", self.addr_v6);
        let _ = writeln!(out, "DNS = {}", settings.dns);
        let _ = writeln!(out, "MTU = {}", settings.mtu);
        let _ = writeln!(out);
        let _ = writeln!(out, "[Peer]");
        let _ = writeln!(out, "PublicKey = {}", self.public_key);
        let _ = writeln!(out, "AllowedIPs = 0.0.0.0/0");
        let _ = writeln!(out, "AllowedIPs = ::/0");
        let _ = writeln!(out, "Endpoint = {}", self.endpoint);
        if !self.reserved.is_empty() {
            let _ = writeln!(out, "Reserved = {}", self.reserved_list());
        }

        out
    }

    /// Reserved bytes as `a, b, c`
    pub fn reserved_list(&self) -> String {
        self.reserved
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// On-disk shape of the warp-config record
#[derive(Serialize)]
struct StoredProfile<'a> {
    #[serde(flatten)]
    config: &'a ProfileConfig,
    /// Unix seconds of the last write
    modified_on: u64,
}

/// Persists the warp-config record and the rendered profile
#[derive(Debug, Clone)]
pub struct ProfileStore {
    warp_config_path: PathBuf,
    profile_path: PathBuf,
    settings: ProfileSettings,
}

impl ProfileStore {
    pub fn new(
        warp_config_path: impl Into<PathBuf>,
        profile_path: impl Into<PathBuf>,
        settings: ProfileSettings,
    ) -> Self {
        Self {
            warp_config_path: warp_config_path.into(),
            profile_path: profile_path.into(),
            settings,
        }
    }

    pub fn warp_config_path(&self) -> &Path {
        &self.warp_config_path
    }

    pub fn profile_path(&self) -> &Path {
        &self.profile_path
    }

    /// Write the profile text and the warp-config record.
    ///
    /// Each file is replaced atomically; the first failure is returned.
    pub fn save(&self, config: &ProfileConfig) -> io::Result<()> {
        write_atomic(&self.profile_path, config.render(&self.settings).as_bytes())?;

        let stored = StoredProfile {
            config,
            modified_on: unix_now(),
        };
        let json = serde_json::to_vec_pretty(&stored)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_atomic(&self.warp_config_path, &json)?;

        debug!(
            "Saved profile {} and record {}",
            self.profile_path.display(),
            self.warp_config_path.display()
        );
        Ok(())
    }

    /// Read back the warp-config record, if present and readable
    pub fn load(&self) -> Option<ProfileConfig> {
        let content = std::fs::read(&self.warp_config_path).ok()?;
        serde_json::from_slice(&content)
            .map_err(|e| warn!("Ignoring unparsable {}: {}", self.warp_config_path.display(), e))
            .ok()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
