//! Device identity record
//!
//! An Ed25519 keypair bound to a device ID. The device ID is the hex SHA-256
//! of the raw 32-byte public key; both keys are exported as unpadded base64url
//! so the record survives a round trip through any string store.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};

/// Persisted device identity
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    /// Record format version
    #[serde(default)]
    pub version: u32,
    /// Hex SHA-256 of the raw public key
    #[serde(default)]
    pub device_id: String,
    /// Raw public key, base64url
    #[serde(default)]
    pub public_key: String,
    /// Private key seed, base64url
    #[serde(default)]
    pub private_key: String,
    /// Creation time (ms since epoch)
    #[serde(default)]
    pub created_at_ms: i64,
}

impl DeviceIdentity {
    /// Current record format
    pub const CURRENT_VERSION: u32 = 1;

    /// Generate a fresh keypair and derive its device ID
    pub fn generate() -> Self {
        let seed: [u8; 32] = rand::random();
        Self::from_signing_key(&SigningKey::from_bytes(&seed))
    }

    fn from_signing_key(signing_key: &SigningKey) -> Self {
        let public = signing_key.verifying_key().to_bytes();
        DeviceIdentity {
            version: Self::CURRENT_VERSION,
            device_id: derive_device_id(&public),
            public_key: URL_SAFE_NO_PAD.encode(public),
            private_key: URL_SAFE_NO_PAD.encode(signing_key.to_bytes()),
            created_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Whether the record has every field and its keys decode
    pub fn is_valid(&self) -> bool {
        self.version == Self::CURRENT_VERSION
            && !self.device_id.is_empty()
            && self.verifying_key().is_ok()
            && self.signing_key().is_ok()
    }

    /// Sign the exact bytes of `payload`
    ///
    /// Ed25519 is deterministic, so the same key and payload always give the
    /// same signature.
    pub fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let key = self.signing_key()?;
        Ok(key.sign(payload).to_bytes().to_vec())
    }

    /// Sign and encode as base64url
    pub fn sign_base64(&self, payload: &[u8]) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.sign(payload)?))
    }

    /// Check a signature against this identity's public key
    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<()> {
        let key = self.verifying_key()?;
        let signature = Signature::from_slice(signature)
            .map_err(|e| Error::Identity(format!("Invalid signature bytes: {}", e)))?;
        key.verify(payload, &signature)
            .map_err(|e| Error::Identity(format!("Signature mismatch: {}", e)))
    }

    fn signing_key(&self) -> Result<SigningKey> {
        let bytes = decode_key(&self.private_key, "private")?;
        Ok(SigningKey::from_bytes(&bytes))
    }

    fn verifying_key(&self) -> Result<VerifyingKey> {
        let bytes = decode_key(&self.public_key, "public")?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| Error::Identity(format!("Invalid public key: {}", e)))
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("device_id", &self.device_id)
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Hex SHA-256 of a raw public key
pub fn derive_device_id(public_key: &[u8]) -> String {
    hex::encode(Sha256::digest(public_key))
}

fn decode_key(encoded: &str, which: &str) -> Result<[u8; 32]> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| Error::Identity(format!("Invalid {} key encoding: {}", which, e)))?;
    bytes
        .try_into()
        .map_err(|_| Error::Identity(format!("{} key must be 32 bytes", which)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_identity_is_valid() {
        let identity = DeviceIdentity::generate();
        assert!(identity.is_valid());
        assert_eq!(identity.device_id.len(), 64);

        let public = URL_SAFE_NO_PAD.decode(&identity.public_key).unwrap();
        assert_eq!(identity.device_id, derive_device_id(&public));
    }

    #[test]
    fn test_signature_is_deterministic_and_verifies() {
        let identity = DeviceIdentity::generate();
        let payload = b"v2|dev|cli|cli|operator||1|tok|nonce";

        let first = identity.sign(payload).unwrap();
        let second = identity.sign(payload).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        identity.verify(payload, &first).unwrap();
        assert!(identity.verify(b"tampered", &first).is_err());
    }

    #[test]
    fn test_incomplete_record_is_invalid() {
        let mut identity = DeviceIdentity::generate();
        identity.private_key.clear();
        assert!(!identity.is_valid());

        let mut identity = DeviceIdentity::generate();
        identity.device_id.clear();
        assert!(!identity.is_valid());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let identity = DeviceIdentity::generate();
        let debug = format!("{:?}", identity);
        assert!(!debug.contains(&identity.private_key));
        assert!(debug.contains("REDACTED"));
    }
}
