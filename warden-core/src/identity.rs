//! Device identity and payload-key derivation.

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};

/// PBKDF2 iteration count for the payload key.
pub const KEY_DERIVATION_ROUNDS: u32 = 100_000;

/// Namespace prefix for the deterministic per-device salt.
const SALT_NAMESPACE: &str = "warden_device";

/// Device identity: id plus the auth secret shared with the screening
/// service. Loaded once at startup, immutable for the process lifetime.
#[derive(Clone)]
pub struct DeviceIdentity {
    device_id: String,
    auth_secret: String,
}

impl DeviceIdentity {
    pub fn new(device_id: impl Into<String>, auth_secret: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            auth_secret: auth_secret.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn auth_secret(&self) -> &str {
        &self.auth_secret
    }

    /// Derive this device's 32-byte payload key.
    pub fn payload_key(&self) -> [u8; 32] {
        derive_payload_key(&self.auth_secret, &self.device_id)
    }
}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("device_id", &self.device_id)
            .field("auth_secret", &"<redacted>")
            .finish()
    }
}

/// PBKDF2-HMAC-SHA256 over the shared secret. The salt is the SHA-256 digest
/// of `"warden_device_<deviceId>"`: fixed-length, deterministic per device,
/// and never truncated, so ids that differ anywhere derive different keys.
pub fn derive_payload_key(secret: &str, device_id: &str) -> [u8; 32] {
    let salt = Sha256::digest(format!("{SALT_NAMESPACE}_{device_id}").as_bytes());
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt.as_slice(), KEY_DERIVATION_ROUNDS, &mut key);
    key
}
