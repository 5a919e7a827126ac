//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file (config.json / config.toml) if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    // Apply environment variable overrides (highest precedence)
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    parse_config(path, &content)
}

fn parse_config(path: &Path, content: &str) -> Result<Config> {
    // Detect format by extension
    let config: Config = if path.extension().is_some_and(|ext| ext == "json" || ext == "json5") {
        json5::from_str(content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(content)
            .or_else(|_| toml::from_str(content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Save configuration as pretty JSON
///
/// The bearer token is never written back to disk.
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Apply environment variable overrides to an existing config.
///
/// This loads `.env` file and overlays any set environment variables onto
/// the config. Env vars have the highest precedence: defaults < file < env.
pub fn apply_env_overrides(config: &mut Config) {
    // Load .env file if it exists
    dotenvy::dotenv().ok();
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

fn apply_overrides_from(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    use secrecy::SecretString;

    // Gateway overrides
    if let Some(url) = var("GATELINK_URL") {
        config.gateway.url = url;
    }
    if let Some(token) = var("GATELINK_TOKEN").filter(|t| !t.is_empty()) {
        config.gateway.token = Some(SecretString::from(token));
    }
    if let Some(role) = var("GATELINK_ROLE") {
        config.gateway.role = role;
    }
    if let Some(scopes) = var("GATELINK_SCOPES") {
        config.gateway.scopes = scopes
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(id) = var("GATELINK_CLIENT_ID") {
        config.gateway.client.id = id;
    }
    if let Some(v) = var("GATELINK_DEVICE_AUTH") {
        config.gateway.device_auth = v != "false" && v != "0";
    }

    // Connection overrides
    if let Some(ms) = var("GATELINK_REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.timeouts.request = std::time::Duration::from_millis(ms);
    }
    if let Some(attempts) = var("GATELINK_MAX_RECONNECT_ATTEMPTS").and_then(|v| v.parse().ok()) {
        config.reconnect.max_attempts = Some(attempts);
    }

    // Storage overrides
    if let Some(path) = var("GATELINK_STORE_PATH") {
        config.storage.path = Some(path.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn test_parse_toml_and_json5() {
        let toml = r#"
            [gateway]
            url = "wss://gw.example.com"
            scopes = ["operator.read"]

            [timeouts]
            request = "5s"
        "#;
        let config = parse_config(&PathBuf::from("config.toml"), toml).unwrap();
        assert_eq!(config.gateway.scopes, vec!["operator.read"]);
        assert_eq!(config.timeouts.request.as_secs(), 5);

        let json5 = r#"{ gateway: { url: "ws://10.0.0.2:18789", }, }"#;
        let config = parse_config(&PathBuf::from("config.json"), json5).unwrap();
        assert_eq!(config.gateway.url, "ws://10.0.0.2:18789");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GATELINK_URL", "ws://override:1"),
            ("GATELINK_TOKEN", "tok"),
            ("GATELINK_SCOPES", "a, b,,c"),
            ("GATELINK_MAX_RECONNECT_ATTEMPTS", "4"),
            ("GATELINK_DEVICE_AUTH", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_overrides_from(&mut config, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.gateway.url, "ws://override:1");
        assert_eq!(config.gateway.token.as_ref().unwrap().expose_secret(), "tok");
        assert_eq!(config.gateway.scopes, vec!["a", "b", "c"]);
        assert_eq!(config.reconnect.max_attempts, Some(4));
        assert!(!config.gateway.device_auth);
    }

    #[test]
    fn test_save_does_not_leak_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.gateway.token = Some(secrecy::SecretString::from("hidden".to_string()));
        save_config(&config, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("hidden"));
        let reloaded = load_config_from_path(&path).unwrap();
        assert!(reloaded.gateway.token.is_none());
    }
}
