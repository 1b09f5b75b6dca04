//! Account lifecycle errors

use crate::client::RemoteError;
use crate::keys::KeyError;

/// Errors surfaced by [`AccountOrchestrator`](crate::AccountOrchestrator)
///
/// Nothing is rolled back on failure: files and remote state stay as they
/// were when the error was raised.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("No valid account, run register first")]
    InvalidAccount,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Device activation failed: service reports the device as inactive")]
    ActivationFailed,

    #[error("License key mismatch after rotation (local {expected}, remote {actual})")]
    LicenseKeyMismatch { expected: String, actual: String },

    #[error("Public key was not updated by the service after rotation")]
    KeyRotationVerification,

    #[error("Key generation failed: {0}")]
    KeyGeneration(#[source] KeyError),

    #[error("Malformed client id {client_id:?}: {source}")]
    ClientIdDecode {
        client_id: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Failed to write account file: {0}")]
    AccountWrite(#[source] std::io::Error),

    #[error("Failed to write profile: {0}")]
    ProfileWrite(#[source] std::io::Error),
}

impl AccountError {
    /// Whether the same call may succeed if retried unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccountError::Remote(e) if e.is_retryable())
    }
}
