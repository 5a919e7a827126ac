//! Connection state

use serde::Serialize;
use std::fmt;

use super::handshake::HandshakePhase;

/// Externally visible connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and none scheduled
    #[default]
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Transport open, waiting for the challenge
    AwaitingChallenge,
    /// Signed hello in flight
    Authenticating,
    /// Waiting for an operator to approve this device
    PairingPending,
    /// Handshake complete; requests are accepted
    Ready,
    /// Reconnection gave up after too many failed attempts
    Halted,
}

impl ConnectionState {
    /// Whether requests are accepted
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    /// State to report while the handshake is in `phase`
    pub(crate) fn from_phase(phase: &HandshakePhase) -> Self {
        match phase {
            HandshakePhase::Idle | HandshakePhase::Failed => ConnectionState::Connecting,
            HandshakePhase::WaitingForChallenge => ConnectionState::AwaitingChallenge,
            HandshakePhase::BuildingProof { .. } | HandshakePhase::AwaitingHello => {
                ConnectionState::Authenticating
            }
            HandshakePhase::PairingWait => ConnectionState::PairingPending,
            HandshakePhase::Ready => ConnectionState::Ready,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingChallenge => "awaiting_challenge",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::PairingPending => "pairing_pending",
            ConnectionState::Ready => "ready",
            ConnectionState::Halted => "halted",
        };
        write!(f, "{}", s)
    }
}
