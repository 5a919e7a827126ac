//! Handshake negotiator
//!
//! Pure state machine for the challenge/response handshake. It performs no
//! I/O: every input returns a list of [`HandshakeAction`]s that the session
//! executes (arm timers, sign and send the hello, dispatch events, close).
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ open ┌─────────────────────┐ challenge ┌───────────────┐ sent ┌───────────────┐ ok ┌───────┐
//! │ Idle │─────>│ WaitingForChallenge │──────────>│ BuildingProof │─────>│ AwaitingHello │───>│ Ready │
//! └──────┘      └─────────────────────┘           └───────────────┘      └───────────────┘    └───────┘
//!                   │ timeout                            ▲                  │       │
//!                   ↓                                    │ challenge        │ not   │ rejected
//!               ┌────────┐                        ┌─────────────┐  paired   │       ↓
//!               │ Failed │<───────────────────────│ PairingWait │<──────────┘   ┌────────┐
//!               └────────┘                        └─────────────┘               │ Failed │
//!                                                                               └────────┘
//! ```
//!
//! `PairingWait` is an explicit loop state: each fresh challenge from the
//! gateway starts another signed hello, with no bound on the number of
//! cycles. The challenge timer only guards the first challenge of a
//! connection.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::protocol::{close_codes, events, ChallengePayload, ErrorShape, EventFrame, HelloOk};
use crate::error::Error;

/// Handshake phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Transport not open yet
    Idle,
    /// Waiting for the `connect.challenge` event
    WaitingForChallenge,
    /// Signing the challenge nonce
    BuildingProof {
        /// Nonce being answered
        nonce: String,
    },
    /// `connect` request sent, waiting for its response
    AwaitingHello,
    /// Device awaits operator approval; waiting for a fresh challenge
    PairingWait,
    /// Handshake complete
    Ready,
    /// Handshake failed; the connection is being closed
    Failed,
}

/// Input fed to the state machine
#[derive(Debug)]
pub enum HandshakeInput {
    /// Transport opened
    Opened,
    /// An event frame arrived
    Event(EventFrame),
    /// Challenge timer fired
    ChallengeTimeout,
    /// The `connect` request was written
    HelloSent,
    /// The `connect` request succeeded
    HelloAccepted(HelloOk),
    /// The `connect` request failed with a server error
    HelloRejected(ErrorShape),
    /// The `connect` request never got an answer
    HelloFailed(Error),
}

/// Side effect requested by the state machine
#[derive(Debug)]
pub enum HandshakeAction {
    /// Start the challenge timer
    ArmChallengeTimer,
    /// Stop the challenge timer
    DisarmChallengeTimer,
    /// Deliver an event to subscribers
    Dispatch(EventFrame),
    /// Build the device proof for `nonce` and send the `connect` request
    SendHello {
        /// Challenge nonce to sign
        nonce: String,
    },
    /// Store the device token issued by the gateway
    PersistToken(String),
    /// Pairing-required status changed
    PairingRequired(bool),
    /// Connection is usable
    MarkReady(HelloOk),
    /// Close the transport; the connection attempt failed
    Fail {
        /// Close code to send
        close_code: u16,
        /// Why the handshake failed
        error: Error,
    },
}

/// Handshake state machine for one connection
#[derive(Debug)]
pub struct Handshake {
    phase: HandshakePhase,
    challenge_timeout: Duration,
    /// Subscribers were told pairing is required and have not been told otherwise
    pairing_notified: bool,
}

impl Handshake {
    /// Create a machine in `Idle`
    ///
    /// `pairing_notified` carries the pairing status over from a previous
    /// connection, so `false` still follows once the device is approved.
    pub fn new(challenge_timeout: Duration, pairing_notified: bool) -> Self {
        Handshake {
            phase: HandshakePhase::Idle,
            challenge_timeout,
            pairing_notified,
        }
    }

    /// Current phase
    pub fn phase(&self) -> &HandshakePhase {
        &self.phase
    }

    /// Whether the handshake completed
    pub fn is_ready(&self) -> bool {
        self.phase == HandshakePhase::Ready
    }

    /// Whether the device is waiting for operator approval
    pub fn is_pairing_pending(&self) -> bool {
        self.phase == HandshakePhase::PairingWait
    }

    /// Advance the machine by one input
    pub fn handle(&mut self, input: HandshakeInput) -> Vec<HandshakeAction> {
        match input {
            HandshakeInput::Opened => self.handle_opened(),
            HandshakeInput::Event(event) => self.handle_event(event),
            HandshakeInput::ChallengeTimeout => self.handle_challenge_timeout(),
            HandshakeInput::HelloSent => self.handle_hello_sent(),
            HandshakeInput::HelloAccepted(hello) => self.handle_hello_accepted(hello),
            HandshakeInput::HelloRejected(error) => self.handle_hello_rejected(error),
            HandshakeInput::HelloFailed(error) => self.handle_hello_failed(error),
        }
    }

    fn handle_opened(&mut self) -> Vec<HandshakeAction> {
        if self.phase != HandshakePhase::Idle {
            return Vec::new();
        }
        self.phase = HandshakePhase::WaitingForChallenge;
        vec![HandshakeAction::ArmChallengeTimer]
    }

    fn handle_event(&mut self, event: EventFrame) -> Vec<HandshakeAction> {
        if event.event != events::CONNECT_CHALLENGE {
            return match self.phase {
                HandshakePhase::Failed => {
                    debug!("Dropping event {} after handshake failure", event.event);
                    Vec::new()
                }
                _ => vec![HandshakeAction::Dispatch(event)],
            };
        }

        match self.phase {
            HandshakePhase::Ready => vec![HandshakeAction::Dispatch(event)],
            HandshakePhase::WaitingForChallenge | HandshakePhase::PairingWait => {
                let Some(challenge) = ChallengePayload::from_payload(&event.payload) else {
                    warn!("Ignoring connect challenge without a nonce");
                    return Vec::new();
                };
                debug!("Received connect challenge");
                self.phase = HandshakePhase::BuildingProof {
                    nonce: challenge.nonce.clone(),
                };
                vec![
                    HandshakeAction::DisarmChallengeTimer,
                    HandshakeAction::SendHello {
                        nonce: challenge.nonce,
                    },
                ]
            }
            _ => {
                debug!("Ignoring connect challenge in phase {:?}", self.phase);
                Vec::new()
            }
        }
    }

    fn handle_challenge_timeout(&mut self) -> Vec<HandshakeAction> {
        if self.phase != HandshakePhase::WaitingForChallenge {
            return Vec::new();
        }
        self.fail(Error::HandshakeTimeout(self.challenge_timeout))
    }

    fn handle_hello_sent(&mut self) -> Vec<HandshakeAction> {
        if matches!(self.phase, HandshakePhase::BuildingProof { .. }) {
            self.phase = HandshakePhase::AwaitingHello;
        }
        Vec::new()
    }

    fn handle_hello_accepted(&mut self, hello: HelloOk) -> Vec<HandshakeAction> {
        if self.phase != HandshakePhase::AwaitingHello {
            return Vec::new();
        }
        self.phase = HandshakePhase::Ready;

        let mut actions = Vec::new();
        if let Some(token) = hello.device_token() {
            actions.push(HandshakeAction::PersistToken(token.to_string()));
        }
        if self.pairing_notified {
            self.pairing_notified = false;
            actions.push(HandshakeAction::PairingRequired(false));
        }
        actions.push(HandshakeAction::MarkReady(hello));
        actions
    }

    fn handle_hello_rejected(&mut self, error: ErrorShape) -> Vec<HandshakeAction> {
        if self.phase != HandshakePhase::AwaitingHello {
            return Vec::new();
        }

        if error.is_pairing_required() {
            info!("Device pairing required, waiting for approval");
            self.phase = HandshakePhase::PairingWait;
            self.pairing_notified = true;
            return vec![HandshakeAction::PairingRequired(true)];
        }

        self.fail(Error::HandshakeRejected {
            code: error.code_or_default().to_string(),
            message: error.message_or_default().to_string(),
        })
    }

    fn handle_hello_failed(&mut self, error: Error) -> Vec<HandshakeAction> {
        if !matches!(
            self.phase,
            HandshakePhase::BuildingProof { .. } | HandshakePhase::AwaitingHello
        ) {
            return Vec::new();
        }
        self.fail(error)
    }

    fn fail(&mut self, error: Error) -> Vec<HandshakeAction> {
        warn!("Gateway handshake failed: {}", error);
        self.phase = HandshakePhase::Failed;
        vec![
            HandshakeAction::DisarmChallengeTimer,
            HandshakeAction::Fail {
                close_code: close_codes::HANDSHAKE_FAILED,
                error,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn challenge(nonce: &str) -> HandshakeInput {
        HandshakeInput::Event(EventFrame::new(events::CONNECT_CHALLENGE, json!({ "nonce": nonce })))
    }

    fn opened() -> Handshake {
        let mut handshake = Handshake::new(Duration::from_secs(10), false);
        let actions = handshake.handle(HandshakeInput::Opened);
        assert!(matches!(actions.as_slice(), [HandshakeAction::ArmChallengeTimer]));
        handshake
    }

    fn awaiting_hello() -> Handshake {
        let mut handshake = opened();
        handshake.handle(challenge("n-1"));
        handshake.handle(HandshakeInput::HelloSent);
        assert_eq!(handshake.phase(), &HandshakePhase::AwaitingHello);
        handshake
    }

    #[test]
    fn test_happy_path() {
        let mut handshake = opened();

        let actions = handshake.handle(challenge("n-1"));
        assert!(matches!(
            actions.as_slice(),
            [HandshakeAction::DisarmChallengeTimer, HandshakeAction::SendHello { nonce }] if nonce == "n-1"
        ));
        assert!(matches!(handshake.phase(), HandshakePhase::BuildingProof { .. }));

        handshake.handle(HandshakeInput::HelloSent);
        let hello = HelloOk::from_payload(&json!({"auth": {"deviceToken": "dt-1"}}));
        let actions = handshake.handle(HandshakeInput::HelloAccepted(hello));

        assert!(matches!(
            actions.as_slice(),
            [HandshakeAction::PersistToken(token), HandshakeAction::MarkReady(_)] if token == "dt-1"
        ));
        assert!(handshake.is_ready());
    }

    #[test]
    fn test_challenge_swallowed_until_ready() {
        let mut handshake = opened();
        handshake.handle(challenge("n-1"));

        // A duplicate challenge while signing or awaiting the hello goes nowhere
        assert!(handshake.handle(challenge("n-2")).is_empty());
        handshake.handle(HandshakeInput::HelloSent);
        assert!(handshake.handle(challenge("n-3")).is_empty());

        handshake.handle(HandshakeInput::HelloAccepted(HelloOk::default()));
        let actions = handshake.handle(challenge("n-4"));
        assert!(matches!(actions.as_slice(), [HandshakeAction::Dispatch(e)] if e.event == events::CONNECT_CHALLENGE));
    }

    #[test]
    fn test_other_events_dispatched_before_challenge() {
        let mut handshake = opened();
        let actions = handshake.handle(HandshakeInput::Event(EventFrame::new("presence", json!({}))));
        assert!(matches!(actions.as_slice(), [HandshakeAction::Dispatch(e)] if e.event == "presence"));
        assert_eq!(handshake.phase(), &HandshakePhase::WaitingForChallenge);
    }

    #[test]
    fn test_challenge_without_nonce_is_ignored() {
        let mut handshake = opened();
        let actions = handshake.handle(HandshakeInput::Event(EventFrame::new(
            events::CONNECT_CHALLENGE,
            json!({}),
        )));
        assert!(actions.is_empty());
        assert_eq!(handshake.phase(), &HandshakePhase::WaitingForChallenge);
    }

    #[test]
    fn test_challenge_timeout_fails() {
        let mut handshake = opened();
        let actions = handshake.handle(HandshakeInput::ChallengeTimeout);
        assert!(matches!(
            actions.as_slice(),
            [
                HandshakeAction::DisarmChallengeTimer,
                HandshakeAction::Fail { close_code: 4008, error: Error::HandshakeTimeout(_) }
            ]
        ));
        assert_eq!(handshake.phase(), &HandshakePhase::Failed);
    }

    #[test]
    fn test_late_challenge_timeout_is_ignored() {
        let mut handshake = awaiting_hello();
        assert!(handshake.handle(HandshakeInput::ChallengeTimeout).is_empty());
        assert_eq!(handshake.phase(), &HandshakePhase::AwaitingHello);
    }

    #[test]
    fn test_pairing_loop() {
        let mut handshake = awaiting_hello();

        let actions = handshake.handle(HandshakeInput::HelloRejected(ErrorShape::new(
            "NOT_PAIRED",
            "device not paired",
        )));
        assert!(matches!(actions.as_slice(), [HandshakeAction::PairingRequired(true)]));
        assert!(handshake.is_pairing_pending());

        // Every fresh challenge starts another cycle, each reported again
        for round in 0..3 {
            let actions = handshake.handle(challenge(&format!("p-{}", round)));
            assert!(matches!(actions.as_slice(), [_, HandshakeAction::SendHello { .. }]));
            handshake.handle(HandshakeInput::HelloSent);
            let actions = handshake.handle(HandshakeInput::HelloRejected(ErrorShape::new(
                "INVALID_REQUEST",
                "Pairing Required: approve this device",
            )));
            assert!(matches!(actions.as_slice(), [HandshakeAction::PairingRequired(true)]));
            assert!(handshake.is_pairing_pending());
        }

        handshake.handle(challenge("p-final"));
        handshake.handle(HandshakeInput::HelloSent);
        let actions = handshake.handle(HandshakeInput::HelloAccepted(HelloOk::default()));
        assert!(matches!(
            actions.as_slice(),
            [HandshakeAction::PairingRequired(false), HandshakeAction::MarkReady(_)]
        ));
    }

    #[test]
    fn test_pairing_status_carried_across_connections() {
        let mut handshake = Handshake::new(Duration::from_secs(10), true);
        handshake.handle(HandshakeInput::Opened);
        handshake.handle(challenge("n-1"));
        handshake.handle(HandshakeInput::HelloSent);

        let actions = handshake.handle(HandshakeInput::HelloRejected(ErrorShape::new("NOT_PAIRED", "")));
        assert!(matches!(actions.as_slice(), [HandshakeAction::PairingRequired(true)]));

        handshake.handle(challenge("n-2"));
        handshake.handle(HandshakeInput::HelloSent);
        let actions = handshake.handle(HandshakeInput::HelloAccepted(HelloOk::default()));
        assert!(matches!(actions.first(), Some(HandshakeAction::PairingRequired(false))));
    }

    #[test]
    fn test_rejection_is_hard_failure() {
        let mut handshake = awaiting_hello();
        let actions = handshake.handle(HandshakeInput::HelloRejected(ErrorShape::new(
            "UNAUTHORIZED",
            "bad token",
        )));

        match actions.as_slice() {
            [_, HandshakeAction::Fail { close_code, error: Error::HandshakeRejected { code, message } }] => {
                assert_eq!(*close_code, close_codes::HANDSHAKE_FAILED);
                assert_eq!(code, "UNAUTHORIZED");
                assert_eq!(message, "bad token");
            }
            other => panic!("unexpected actions: {:?}", other),
        }
    }

    #[test]
    fn test_events_dropped_after_failure() {
        let mut handshake = opened();
        handshake.handle(HandshakeInput::ChallengeTimeout);
        assert_eq!(handshake.phase(), &HandshakePhase::Failed);

        assert!(handshake.handle(HandshakeInput::Event(EventFrame::new("agent", json!({})))).is_empty());
        assert!(handshake.handle(challenge("late")).is_empty());
        assert_eq!(handshake.phase(), &HandshakePhase::Failed);
    }

    #[test]
    fn test_hello_timeout_is_hard_failure() {
        let mut handshake = awaiting_hello();
        let actions = handshake.handle(HandshakeInput::HelloFailed(Error::RequestTimeout {
            method: "connect".to_string(),
            timeout: Duration::from_secs(30),
        }));
        assert!(matches!(
            actions.as_slice(),
            [_, HandshakeAction::Fail { error: Error::RequestTimeout { .. }, .. }]
        ));
    }
}
