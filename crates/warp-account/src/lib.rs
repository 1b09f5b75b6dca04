//! warp-account - WARP Device Identity and Profile Generation
//!
//! Provisions a WireGuard client identity against a remote device
//! registration service and keeps it in sync, then derives a tunnel
//! profile from the remote device record.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  AccountOrchestrator                      │
//! │                                                           │
//! │  Unregistered ──▶ Registered ──▶ Reconciled ──▶ Activated │
//! │                                                           │
//! └───────┬──────────────┬────────────────┬───────────────────┘
//!         │              │                │
//!         ▼              ▼                ▼
//!  ┌─────────────┐ ┌────────────┐ ┌──────────────────────┐
//!  │ AccountStore│ │ KeyPair    │ │ RegistrationClient   │──▶ HTTPS API
//!  │ (toml file) │ │ (X25519)   │ │ (trait, warp-api)    │
//!  └─────────────┘ └────────────┘ └──────────────────────┘
//!         │
//!         ▼
//!  ┌──────────────────────────────┐
//!  │ ProfileStore                  │
//!  │ wgcf-config.json + .conf text │
//!  └──────────────────────────────┘
//! ```
//!
//! # Persistence
//!
//! Every file is replaced atomically (temp file in the same directory,
//! then rename), so an interrupted write leaves the previous content.

mod account;
mod client;
mod config;
mod error;
mod fs;
mod keys;
mod orchestrator;
mod profile;
mod reserved;

#[cfg(test)]
mod testing;

pub use account::{AccountRecord, AccountStore};
pub use client::{
    ApiContext, DeviceStatus, Registration, RegistrationClient, RemoteAccount,
    RemoteBoundDevice, RemoteDevice, RemoteError,
};
pub use config::{ApiSettings, ConfigError, ProfileSettings, WarpConfig};
pub use error::AccountError;
pub use keys::{KeyError, KeyPair, PrivateKey, PublicKey};
pub use orchestrator::{AccountOrchestrator, AccountState};
pub use profile::{ProfileConfig, ProfileStore};
pub use reserved::reserved_from_client_id;
