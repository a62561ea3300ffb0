//! Payload encryption for the device/service exchange: ChaCha20-Poly1305
//! over JSON bytes, carried as `{"data": "<encoded ciphertext>"}`.
//! Application-level payload protection only; transport security is the
//! HTTP client's concern.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::identity::DeviceIdentity;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Wire form of one encrypted payload, in both request and response bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub data: String,
}

/// Symmetric codec for payloads shared with the screening service. The key
/// is derived once from the device identity; see [`crate::identity`].
pub struct PayloadCodec {
    key: [u8; 32],
}

impl PayloadCodec {
    pub fn new(identity: &DeviceIdentity) -> Self {
        Self {
            key: identity.payload_key(),
        }
    }

    /// Build a codec from a raw 32-byte key (the service side derives the
    /// same key from the same secret and device id).
    pub fn from_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Serialize `payload` to JSON, encrypt with a fresh random nonce, and
    /// encode the nonce followed by the ciphertext for transport.
    pub fn encrypt<T: Serialize>(&self, payload: &T) -> Result<String, CodecError> {
        let plain = serde_json::to_vec(payload).map_err(CodecError::Serialize)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plain.as_ref())
            .map_err(|_| CodecError::Encrypt)?;
        let mut raw = Vec::with_capacity(NONCE_LEN + sealed.len());
        raw.extend_from_slice(&nonce_bytes);
        raw.extend_from_slice(&sealed);
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Decode, decrypt, and parse one envelope body. Decrypted bytes are
    /// parsed as JSON data and nothing else.
    pub fn decrypt(&self, encoded: &str) -> Result<serde_json::Value, CodecError> {
        let raw = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| CodecError::Encoding)?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CodecError::Encoding);
        }
        let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let plain = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| CodecError::Authentication)?;
        serde_json::from_slice(&plain).map_err(CodecError::MalformedPayload)
    }

    /// Convenience: encrypt into the wire envelope.
    pub fn seal<T: Serialize>(&self, payload: &T) -> Result<EncryptedEnvelope, CodecError> {
        Ok(EncryptedEnvelope {
            data: self.encrypt(payload)?,
        })
    }

    /// Convenience: decrypt a received wire envelope.
    pub fn open(&self, envelope: &EncryptedEnvelope) -> Result<serde_json::Value, CodecError> {
        self.decrypt(&envelope.data)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("encryption failed")]
    Encrypt,
    #[error("envelope is not valid transport encoding")]
    Encoding,
    #[error("envelope failed authentication")]
    Authentication,
    #[error("decrypted payload is not valid JSON: {0}")]
    MalformedPayload(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> PayloadCodec {
        PayloadCodec::from_key([7u8; 32])
    }

    #[test]
    fn roundtrip_preserves_payload() {
        let payload = json!({
            "phoneNumber": "2125551234",
            "attempt": 3,
            "flagged": true,
            "note": null,
            "nested": {"tags": ["spam", "robocall"]},
        });
        let codec = codec();
        let sealed = codec.encrypt(&payload).unwrap();
        assert_eq!(codec.decrypt(&sealed).unwrap(), payload);
    }

    #[test]
    fn nonces_differ_between_calls() {
        let codec = codec();
        let a = codec.encrypt(&json!({"x": 1})).unwrap();
        let b = codec.encrypt(&json!({"x": 1})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampering_any_byte_fails_authentication() {
        let codec = codec();
        let sealed = codec.encrypt(&json!({"phoneNumber": "5551234567"})).unwrap();
        let raw = URL_SAFE_NO_PAD.decode(&sealed).unwrap();
        for i in 0..raw.len() {
            let mut flipped = raw.clone();
            flipped[i] ^= 0x01;
            let reencoded = URL_SAFE_NO_PAD.encode(&flipped);
            assert!(
                matches!(codec.decrypt(&reencoded), Err(CodecError::Authentication)),
                "flipping byte {i} was not caught"
            );
        }
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = PayloadCodec::from_key([1u8; 32])
            .encrypt(&json!({"x": 1}))
            .unwrap();
        let other = PayloadCodec::from_key([2u8; 32]);
        assert!(matches!(
            other.decrypt(&sealed),
            Err(CodecError::Authentication)
        ));
    }

    #[test]
    fn garbage_input_is_encoding_error() {
        let codec = codec();
        assert!(matches!(
            codec.decrypt("not!valid!base64!"),
            Err(CodecError::Encoding)
        ));
        // Valid base64 but shorter than nonce + tag.
        let short = URL_SAFE_NO_PAD.encode([0u8; 8]);
        assert!(matches!(codec.decrypt(&short), Err(CodecError::Encoding)));
    }

    #[test]
    fn non_json_plaintext_is_malformed_payload() {
        let key = [7u8; 32];
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let nonce = [9u8; NONCE_LEN];
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), b"caller id".as_ref())
            .unwrap();
        let mut raw = nonce.to_vec();
        raw.extend_from_slice(&sealed);
        let encoded = URL_SAFE_NO_PAD.encode(raw);
        assert!(matches!(
            codec().decrypt(&encoded),
            Err(CodecError::MalformedPayload(_))
        ));
    }

    #[test]
    fn envelope_wire_shape() {
        let envelope = EncryptedEnvelope {
            data: "abc".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"data": "abc"})
        );
    }

    #[test]
    fn seal_and_open_are_inverse() {
        let codec = codec();
        let payload = json!({"action": "allow"});
        let envelope = codec.seal(&payload).unwrap();
        assert_eq!(codec.open(&envelope).unwrap(), payload);
    }
}
