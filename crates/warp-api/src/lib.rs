//! warp-api - Registration API Client
//!
//! HTTPS/JSON implementation of [`warp_account::RegistrationClient`].
//!
//! Each call opens a fresh HTTP/1.1 connection over rustls; the whole
//! exchange (connect, TLS, request, body) is bounded by the configured
//! timeout. Failures map to [`warp_account::RemoteError`]:
//!
//! | Failure | status | retryable |
//! |---------|--------|-----------|
//! | connect / TLS / timeout | `None` | yes |
//! | 429, 5xx | `Some(code)` | yes |
//! | other non-2xx | `Some(code)` | no |

mod client;
mod model;
mod transport;

pub use client::WarpApiClient;
pub use transport::{HttpTransport, TransportResponse};
