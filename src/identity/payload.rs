//! Canonical handshake payload
//!
//! The gateway re-builds this string from the `connect` parameters and
//! verifies the device signature against it, so the field order and the
//! `|` delimiter are part of the wire contract.

/// Payload version without nonce binding
pub const PAYLOAD_V1: &str = "v1";

/// Payload version with the challenge nonce appended
pub const PAYLOAD_V2: &str = "v2";

/// Inputs of the canonical payload
#[derive(Debug, Clone)]
pub struct SigningPayload<'a> {
    /// Device ID
    pub device_id: &'a str,
    /// Client ID
    pub client_id: &'a str,
    /// Client mode
    pub client_mode: &'a str,
    /// Requested role
    pub role: &'a str,
    /// Requested scopes, any order
    pub scopes: &'a [String],
    /// Signing timestamp (ms since epoch)
    pub signed_at_ms: i64,
    /// Bearer token sent alongside the proof
    pub token: Option<&'a str>,
    /// Challenge nonce; selects the `v2` layout when present
    pub nonce: Option<&'a str>,
}

impl SigningPayload<'_> {
    /// Build the exact byte sequence to sign
    pub fn canonical(&self) -> String {
        let mut scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        scopes.sort_unstable();

        let version = if self.nonce.is_some() {
            PAYLOAD_V2
        } else {
            PAYLOAD_V1
        };

        let signed_at = self.signed_at_ms.to_string();
        let scopes = scopes.join(",");
        let mut fields = vec![
            version,
            self.device_id,
            self.client_id,
            self.client_mode,
            self.role,
            scopes.as_str(),
            signed_at.as_str(),
            self.token.unwrap_or(""),
        ];
        if let Some(nonce) = self.nonce {
            fields.push(nonce);
        }
        fields.join("|")
    }
}
