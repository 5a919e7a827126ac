//! Gateway Protocol - WebSocket-based control plane
//!
//! This module defines the protocol spoken between this client and the
//! gateway.
//!
//! ## Protocol Overview
//!
//! - **JSON-based frames** over WebSocket, one object per message
//! - **Request-response pattern** correlated by unique IDs
//! - **Event streaming** for server-pushed updates
//! - **Challenge-response handshake** signed with the device key
//!
//! ## Frame Types
//!
//! - `req`: Client-initiated requests
//! - `res`: Server responses to requests
//! - `event`: Server-pushed events

pub mod codec;
pub mod schema;
pub mod types;

pub use codec::{decode, decode_bytes, encode, DecodeError};
pub use schema::{
    close_codes, error_codes, ErrorShape, EventFrame, GatewayFrame, RequestFrame, ResponseFrame,
    PROTOCOL_VERSION,
};
pub use types::*;
