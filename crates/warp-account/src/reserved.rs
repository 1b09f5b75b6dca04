//! Reserved bytes
//!
//! WARP peers expect the three reserved bytes of each WireGuard message
//! header to carry the device's client id. The id arrives base64 encoded;
//! each decoded byte becomes one entry, in order, as an unsigned value.

use base64::{DecodeError, Engine as _, engine::general_purpose::STANDARD as BASE64};

/// Decode a base64 client id into the reserved byte sequence
pub fn reserved_from_client_id(client_id: &str) -> Result<Vec<u8>, DecodeError> {
    BASE64.decode(client_id)
}
