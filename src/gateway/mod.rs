//! Gateway module - WebSocket client for the gateway control plane
//!
//! One [`GatewayClient`] owns one logical connection. Every connection
//! attempt gets a fresh transport and a fresh session; the supervisor
//! reconnects with exponential backoff until told to stop.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────┐
//!  │                      GatewayClient                       │
//!  │  connect / disconnect / request / is_connected           │
//!  └───────────────┬──────────────────────────────────────────┘
//!                  │ spawns
//!                  ▼
//!  ┌───────────────────────────┐   backoff   ┌────────────────────┐
//!  │        supervisor         │────────────>│ ReconnectScheduler │
//!  └───────────────┬───────────┘             └────────────────────┘
//!                  │ one per attempt
//!                  ▼
//!  ┌───────────────────────────┐
//!  │          session          │──> Handshake ──> DeviceIdentityStore
//!  │  frames in / actions out  │──> RequestRegistry (responses)
//!  └───────────────┬───────────┘──> EventDispatcher (events)
//!                  │
//!                  ▼
//!        Connector / TransportHandle
//!          ws://127.0.0.1:18789
//! ```

mod client;
mod dispatcher;
mod handshake;
mod reconnect;
mod registry;
mod session;
mod state;

pub mod protocol;
pub mod transport;

pub use client::{GatewayClient, GatewayClientBuilder, StatusCallback};
pub use dispatcher::{EventCallback, EventDispatcher, GapCallback, SequenceGap};
pub use handshake::{Handshake, HandshakeAction, HandshakeInput, HandshakePhase};
pub use reconnect::{backoff_delay, ReconnectScheduler, RetryDecision};
pub use registry::{PendingResponse, RequestRegistry};
pub use state::ConnectionState;
pub use transport::{Connector, Inbound, Outbound, TransportHandle, WebSocketConnector};

pub use protocol::{
    close_codes, error_codes, events, EventFrame, GatewayFrame, HelloOk, PROTOCOL_VERSION,
};
