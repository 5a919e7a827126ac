//! # Gatelink
//!
//! Client for the gateway control plane: one persistent WebSocket, a signed
//! device-identity handshake, correlated request/response RPC and ordered
//! event fan-out.
//!
//! ## Features
//!
//! - **Device identity:** Ed25519 keypair per installation, SHA-256 device IDs
//! - **Pairing aware:** waits on the open socket while an operator approves the device
//! - **Multiplexed RPC:** any number of in-flight requests matched by correlation ID
//! - **Self-healing:** exponential-backoff reconnection with a stop flag
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gatelink::{Config, GatewayClient};
//!
//! # async fn example() -> gatelink::Result<()> {
//! let client = GatewayClient::builder(Config::default())
//!     .on_event(|event| println!("{}: {}", event.event, event.payload))
//!     .build()?;
//!
//! client.connect();
//! let mut state = client.subscribe_state();
//! state.wait_for(|s| s.is_ready()).await.ok();
//!
//! let health = client.request("health", None).await?;
//! println!("{health}");
//!
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{ConnectionState, GatewayClient, GatewayClientBuilder};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
