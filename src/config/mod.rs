//! Configuration module - Modular configuration management
//!
//! Configuration is split into focused modules:
//! - types/mod.rs: Core configuration types (Config, GatewayConfig, ClientConfig)
//! - types/connection.rs: Timeouts and reconnection backoff
//! - types/storage.rs: Identity/token storage backend
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{ClientConfig, Config, GatewayConfig};

// Re-export connection types
pub use types::connection::{ReconnectConfig, TimeoutConfig};

// Re-export storage types
pub use types::storage::{StorageBackendType, StorageConfig};

// Re-export IO and utilities
pub use io::{apply_env_overrides, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path, state_dir};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
