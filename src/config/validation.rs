//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::Config;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }

    /// First error as a single message
    pub fn first_error(&self) -> Option<String> {
        self.errors
            .first()
            .map(|issue| format!("{}: {}", issue.path, issue.message))
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_gateway_config(config, result);
    result = validate_connection_config(config, result);

    result
}

fn validate_gateway_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    match url::Url::parse(&config.gateway.url) {
        Ok(url) if url.scheme() == "ws" || url.scheme() == "wss" => {}
        Ok(url) => {
            result = result.with_error(
                ValidationIssue::new(
                    "gateway.url",
                    format!("Unsupported scheme `{}`", url.scheme()),
                )
                .with_suggestion("Use a ws:// or wss:// URL"),
            );
        }
        Err(e) => {
            result = result.with_error(ValidationIssue::new(
                "gateway.url",
                format!("Invalid URL `{}`: {}", config.gateway.url, e),
            ));
        }
    }

    if config.gateway.min_protocol > config.gateway.max_protocol {
        result = result.with_error(ValidationIssue::new(
            "gateway.min_protocol",
            format!(
                "min_protocol {} is greater than max_protocol {}",
                config.gateway.min_protocol, config.gateway.max_protocol
            ),
        ));
    }

    if config.gateway.scopes.is_empty() {
        result = result.with_warning(
            ValidationIssue::new("gateway.scopes", "No scopes requested; most methods will be denied")
                .with_suggestion("Request at least one scope, e.g. operator.read"),
        );
    }

    if !config.gateway.device_auth && config.gateway.token.is_none() {
        result = result.with_warning(ValidationIssue::new(
            "gateway.device_auth",
            "Device auth disabled and no token configured; the gateway will likely refuse the handshake",
        ));
    }

    result
}

fn validate_connection_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let timeouts = [
        ("timeouts.connect", config.timeouts.connect),
        ("timeouts.challenge", config.timeouts.challenge),
        ("timeouts.request", config.timeouts.request),
        ("reconnect.base_delay", config.reconnect.base_delay),
    ];
    for (path, value) in timeouts {
        if value.is_zero() {
            result = result.with_error(ValidationIssue::new(path, "Must be greater than zero"));
        }
    }

    if config.reconnect.base_delay > config.reconnect.max_delay {
        result = result.with_error(
            ValidationIssue::new("reconnect.max_delay", "max_delay is shorter than base_delay")
                .with_suggestion("Raise reconnect.max_delay or lower reconnect.base_delay"),
        );
    }

    if config.reconnect.max_attempts == Some(0) {
        result = result.with_warning(ValidationIssue::new(
            "reconnect.max_attempts",
            "Reconnection is disabled; the client gives up after the first failure",
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        let result = validate_config(&config);

        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_rejects_http_url_and_inverted_ranges() {
        let mut config = Config::default();
        config.gateway.url = "http://gw.example.com".to_string();
        config.gateway.min_protocol = 4;
        config.gateway.max_protocol = 3;
        config.reconnect.max_delay = Duration::from_millis(10);

        let result = validate_config(&config);
        assert!(!result.valid);
        let paths: Vec<&str> = result.errors.iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&"gateway.url"));
        assert!(paths.contains(&"gateway.min_protocol"));
        assert!(paths.contains(&"reconnect.max_delay"));
    }

    #[test]
    fn test_empty_scopes_is_a_warning() {
        let mut config = Config::default();
        config.gateway.scopes.clear();

        let result = validate_config(&config);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }
}
