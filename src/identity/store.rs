//! Device identity store
//!
//! Loads or lazily creates the device identity and keeps the per-gateway
//! device tokens. Persistence is best-effort: a failing store only costs
//! durability, never the current session.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::device::DeviceIdentity;
use crate::error::Result;
use crate::storage::KeyValueStore;

/// Storage key of the identity record
pub const IDENTITY_KEY: &str = "device-identity.v1";

/// Storage key prefix of device tokens
pub const TOKEN_KEY_PREFIX: &str = "device-token:";

/// Identity and token persistence for one device
pub struct DeviceIdentityStore {
    identities: Arc<dyn KeyValueStore>,
    tokens: Arc<dyn KeyValueStore>,
    /// Identity used by this process, kept even when persisting it failed
    current: Mutex<Option<DeviceIdentity>>,
}

impl DeviceIdentityStore {
    /// Create a store with separate backends for identity and tokens
    pub fn new(identities: Arc<dyn KeyValueStore>, tokens: Arc<dyn KeyValueStore>) -> Self {
        DeviceIdentityStore {
            identities,
            tokens,
            current: Mutex::new(None),
        }
    }

    /// Create a store that keeps identity and tokens in the same backend
    pub fn shared(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store.clone(), store)
    }

    /// Return the persisted identity, or generate and persist a new one
    pub async fn load_or_create(&self) -> DeviceIdentity {
        let mut current = self.current.lock().await;
        if let Some(identity) = current.as_ref() {
            return identity.clone();
        }

        let identity = match self.load().await {
            Some(identity) => identity,
            None => {
                let identity = DeviceIdentity::generate();
                info!("Generated new device identity {}", identity.device_id);
                if let Err(e) = self.persist(&identity).await {
                    warn!("Could not persist device identity, using it for this session only: {}", e);
                }
                identity
            }
        };

        *current = Some(identity.clone());
        identity
    }

    async fn load(&self) -> Option<DeviceIdentity> {
        let raw = match self.identities.get(IDENTITY_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not read device identity from {}: {}", self.identities.id(), e);
                return None;
            }
        };

        match serde_json::from_str::<DeviceIdentity>(&raw) {
            Ok(identity) if identity.is_valid() => {
                debug!("Loaded device identity {}", identity.device_id);
                Some(identity)
            }
            Ok(_) => {
                warn!("Stored device identity is incomplete, replacing it");
                None
            }
            Err(e) => {
                warn!("Stored device identity is unreadable, replacing it: {}", e);
                None
            }
        }
    }

    async fn persist(&self, identity: &DeviceIdentity) -> Result<()> {
        let json = serde_json::to_string(identity)?;
        self.identities.set(IDENTITY_KEY, &json).await
    }

    /// Sign the canonical payload with the identity's private key, base64url encoded
    pub fn sign(&self, identity: &DeviceIdentity, canonical_payload: &str) -> Result<String> {
        identity.sign_base64(canonical_payload.as_bytes())
    }

    /// Device token previously issued by this gateway
    pub async fn load_token(&self, gateway_url: &str) -> Option<String> {
        match self.tokens.get(&token_key(gateway_url)).await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!("Could not read device token for {}: {}", gateway_url, e);
                None
            }
        }
    }

    /// Remember the device token issued by this gateway
    pub async fn save_token(&self, gateway_url: &str, token: &str) {
        match self.tokens.set(&token_key(gateway_url), token).await {
            Ok(()) => debug!("Stored device token for {}", gateway_url),
            Err(e) => warn!("Could not store device token for {}: {}", gateway_url, e),
        }
    }
}

fn token_key(gateway_url: &str) -> String {
    format!("{}{}", TOKEN_KEY_PREFIX, gateway_url.trim_end_matches('/'))
}
