//! Device identity
//!
//! Every installation owns one long-lived Ed25519 keypair. The gateway
//! trusts the key once an operator pairs the device, and the client proves
//! possession of it on every handshake by signing the challenge nonce.
//!
//! - **device**: the keypair record, signing and verification
//! - **payload**: the canonical string the signature covers
//! - **store**: lazy creation, persistence and per-gateway device tokens

mod device;
mod payload;
mod store;

pub use device::{derive_device_id, DeviceIdentity};
pub use payload::{SigningPayload, PAYLOAD_V1, PAYLOAD_V2};
pub use store::{DeviceIdentityStore, IDENTITY_KEY, TOKEN_KEY_PREFIX};
