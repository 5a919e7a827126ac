//! Configuration types module
//!
//! Re-exports all configuration types.

pub mod connection;
pub mod storage;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::gateway::protocol::PROTOCOL_VERSION;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gateway endpoint and handshake identity
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Connect, challenge and request deadlines
    #[serde(default)]
    pub timeouts: connection::TimeoutConfig,

    /// Reconnection backoff
    #[serde(default)]
    pub reconnect: connection::ReconnectConfig,

    /// Identity and token persistence
    #[serde(default)]
    pub storage: storage::StorageConfig,
}

impl Config {
    /// Load configuration from environment variables and files
    ///
    /// It loads configuration from:
    /// 1. Default values
    /// 2. Config file (if present)
    /// 3. Environment variable overrides
    pub fn from_env() -> crate::error::Result<Self> {
        crate::config::load_config()
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// WebSocket URL of the gateway
    #[serde(default = "default_url")]
    pub url: String,
    /// Static bearer token; a stored device token takes precedence
    #[serde(skip_serializing, default)]
    pub token: Option<SecretString>,
    /// Client metadata sent in the handshake
    #[serde(default)]
    pub client: ClientConfig,
    /// Requested role
    #[serde(default = "default_role")]
    pub role: String,
    /// Requested scopes
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Lowest protocol version accepted
    #[serde(default = "default_protocol")]
    pub min_protocol: u32,
    /// Highest protocol version accepted
    #[serde(default = "default_protocol")]
    pub max_protocol: u32,
    /// Sign the challenge with the device identity
    #[serde(default = "default_true")]
    pub device_auth: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            url: default_url(),
            token: None,
            client: ClientConfig::default(),
            role: default_role(),
            scopes: default_scopes(),
            min_protocol: default_protocol(),
            max_protocol: default_protocol(),
            device_auth: true,
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:18789".to_string()
}

fn default_role() -> String {
    "operator".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["operator.admin".to_string()]
}

fn default_protocol() -> u32 {
    PROTOCOL_VERSION
}

fn default_true() -> bool {
    true
}

/// Client identification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Client ID
    #[serde(default = "default_client_id")]
    pub id: String,
    /// Client mode
    #[serde(default = "default_client_mode")]
    pub mode: String,
    /// Client version
    #[serde(default = "default_client_version")]
    pub version: String,
    /// Host platform
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Human-friendly name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Stable instance ID
    #[serde(default)]
    pub instance_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            id: default_client_id(),
            mode: default_client_mode(),
            version: default_client_version(),
            platform: default_platform(),
            display_name: None,
            instance_id: None,
        }
    }
}

fn default_client_id() -> String {
    "cli".to_string()
}

fn default_client_mode() -> String {
    "cli".to_string()
}

fn default_client_version() -> String {
    crate::VERSION.to_string()
}

fn default_platform() -> String {
    std::env::consts::OS.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.gateway.url, "ws://127.0.0.1:18789");
        assert_eq!(config.gateway.role, "operator");
        assert_eq!(config.gateway.min_protocol, PROTOCOL_VERSION);
        assert!(config.gateway.device_auth);
        assert!(config.gateway.token.is_none());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"gateway": {"url": "wss://gw.example.com", "token": "s3cret"}}"#,
        )
        .unwrap();
        assert_eq!(config.gateway.url, "wss://gw.example.com");
        assert!(config.gateway.token.is_some());
        assert_eq!(config.gateway.client.id, "cli");
        assert_eq!(config.reconnect.base_delay.as_millis(), 1000);
    }
}
