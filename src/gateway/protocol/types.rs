//! Gateway protocol types
//!
//! Payload types for the `connect` handshake and well-known event names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Handshake
// ============================================================================

/// Method name of the handshake request
pub const CONNECT_METHOD: &str = "connect";

/// Payload of the `connect.challenge` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengePayload {
    /// Server nonce to sign
    pub nonce: String,
    /// Server timestamp (ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

impl ChallengePayload {
    /// Extract a non-empty nonce from a raw event payload
    pub fn from_payload(payload: &Value) -> Option<Self> {
        serde_json::from_value::<ChallengePayload>(payload.clone())
            .ok()
            .filter(|c| !c.nonce.trim().is_empty())
    }
}

/// Identifying metadata of this client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client ID, e.g. `cli` or `webchat-ui`
    pub id: String,
    /// Client version
    pub version: String,
    /// Host platform
    pub platform: String,
    /// Client mode, e.g. `cli` or `webchat`
    pub mode: String,
    /// Human-friendly name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Stable per-installation instance ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

/// Bearer credential sent with the handshake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthParams {
    /// Device token or statically configured token
    pub token: String,
}

/// Signed device-identity proof
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProof {
    /// Device ID (hex SHA-256 of the public key)
    pub id: String,
    /// Raw public key, base64url
    pub public_key: String,
    /// Signature over the canonical payload, base64url
    pub signature: String,
    /// Signing timestamp (ms since epoch)
    pub signed_at: i64,
    /// Challenge nonce this proof answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Parameters of the `connect` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Client metadata
    pub client: ClientInfo,
    /// Lowest protocol version accepted
    pub min_protocol: u32,
    /// Highest protocol version accepted
    pub max_protocol: u32,
    /// Requested role
    pub role: String,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// Client capabilities
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caps: Vec<String>,
    /// Bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthParams>,
    /// Device proof
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceProof>,
    /// User agent string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

// ============================================================================
// Hello
// ============================================================================

/// Success payload of the `connect` request
///
/// Parsed leniently: every field is optional so newer servers never break
/// the handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloOk {
    /// Negotiated protocol version
    #[serde(default)]
    pub protocol: Option<u32>,
    /// Server metadata
    #[serde(default)]
    pub server: Option<Value>,
    /// Methods and events the server supports
    #[serde(default)]
    pub features: Option<HelloFeatures>,
    /// Initial state snapshot
    #[serde(default)]
    pub snapshot: Option<Value>,
    /// Issued credentials
    #[serde(default)]
    pub auth: Option<HelloAuth>,
    /// Connection policy
    #[serde(default)]
    pub policy: Option<HelloPolicy>,
}

/// Advertised server features
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelloFeatures {
    /// Supported methods
    #[serde(default)]
    pub methods: Vec<String>,
    /// Emitted events
    #[serde(default)]
    pub events: Vec<String>,
}

/// Credentials issued on a successful handshake
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloAuth {
    /// Fresh device token for the next handshake
    #[serde(default)]
    pub device_token: Option<String>,
    /// Granted role
    #[serde(default)]
    pub role: Option<String>,
    /// Granted scopes
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Connection policy announced by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPolicy {
    /// Interval between `tick` events
    #[serde(default)]
    pub tick_interval_ms: Option<u64>,
    /// Largest payload the server accepts
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl HelloOk {
    /// Parse a hello payload, falling back to an empty hello
    pub fn from_payload(payload: &Value) -> Self {
        match serde_json::from_value(payload.clone()) {
            Ok(hello) => hello,
            Err(e) => {
                tracing::warn!("Unrecognized hello payload, continuing without it: {}", e);
                HelloOk::default()
            }
        }
    }

    /// Device token issued by the server, if any
    pub fn device_token(&self) -> Option<&str> {
        self.auth
            .as_ref()
            .and_then(|a| a.device_token.as_deref())
            .filter(|t| !t.is_empty())
    }

    /// Tick interval announced by the server, if any
    pub fn tick_interval_ms(&self) -> Option<u64> {
        self.policy
            .as_ref()
            .and_then(|p| p.tick_interval_ms)
            .filter(|ms| *ms > 0)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Event names
pub mod events {
    /// Handshake challenge carrying a nonce
    pub const CONNECT_CHALLENGE: &str = "connect.challenge";
    /// Keep-alive tick
    pub const TICK: &str = "tick";
    /// Agent run output
    pub const AGENT: &str = "agent";
    /// Chat stream output
    pub const CHAT: &str = "chat";
    /// Presence changes
    pub const PRESENCE: &str = "presence";
    /// Server shutting down
    pub const SHUTDOWN: &str = "shutdown";
}
