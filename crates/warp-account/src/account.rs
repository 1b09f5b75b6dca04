//! Local Account Credentials
//!
//! The account file is a small TOML document:
//!
//! ```toml
//! private_key = "..."
//! device_id = "..."
//! access_token = "..."
//! license_key = "..."
//! ```

use crate::fs::write_atomic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Credentials binding this machine to a remote device
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountRecord {
    /// WireGuard private key (base64)
    pub private_key: String,
    /// Remote device id
    pub device_id: String,
    /// Bearer token for the registration API
    pub access_token: String,
    /// Account license key (may be empty before the first update)
    pub license_key: String,
}

impl AccountRecord {
    /// A record is usable once it has a device id, token and private key.
    /// The license key does not take part in this check.
    pub fn is_valid(&self) -> bool {
        !self.device_id.is_empty()
            && !self.access_token.is_empty()
            && !self.private_key.is_empty()
    }
}

impl fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRecord")
            .field("private_key", &"[redacted]")
            .field("device_id", &self.device_id)
            .field("access_token", &"[redacted]")
            .field("license_key", &self.license_key)
            .finish()
    }
}

/// Loads and persists the [`AccountRecord`] file
#[derive(Debug, Clone)]
pub struct AccountStore {
    path: PathBuf,
}

impl AccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record. A missing or unparsable file yields an empty record.
    pub fn load(&self) -> AccountRecord {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No account file at {}", self.path.display());
                return AccountRecord::default();
            }
            Err(e) => {
                warn!("Cannot read account file {}: {}", self.path.display(), e);
                return AccountRecord::default();
            }
        };

        toml::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring unparsable account file {}: {}", self.path.display(), e);
            AccountRecord::default()
        })
    }

    /// Persist the record, replacing the previous file atomically
    pub fn save(&self, record: &AccountRecord) -> io::Result<()> {
        let content = toml::to_string_pretty(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_atomic(&self.path, content.as_bytes())?;
        debug!("Saved account file {}", self.path.display());
        Ok(())
    }
}
