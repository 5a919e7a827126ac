//! Connection session
//!
//! One session drives one transport from open to close: it feeds inbound
//! frames to the handshake machine, the registry and the dispatcher, and
//! executes the machine's actions. A fresh session (and transport) is used
//! for every connection attempt.

use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::client::Shared;
use super::handshake::{Handshake, HandshakeAction, HandshakeInput};
use super::protocol::{
    close_codes, decode, events, AuthParams, ClientInfo, ConnectParams, DeviceProof, ErrorShape,
    EventFrame, GatewayFrame, HelloOk, CONNECT_METHOD,
};
use super::registry::PendingResponse;
use super::state::ConnectionState;
use super::transport::{Inbound, Outbound, TransportHandle};
use crate::error::{Error, Result};
use crate::identity::SigningPayload;

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// The client asked to disconnect
    Stopped {
        /// The connection had reached `Ready`
        reached_ready: bool,
    },
    /// The transport closed or the attempt failed
    Closed {
        /// The connection had reached `Ready`
        reached_ready: bool,
        /// The handshake was waiting for pairing approval
        pairing_pending: bool,
    },
}

impl SessionEnd {
    pub(crate) fn reached_ready(&self) -> bool {
        match self {
            SessionEnd::Stopped { reached_ready } | SessionEnd::Closed { reached_ready, .. } => {
                *reached_ready
            }
        }
    }
}

/// Open one transport and run it until it closes or `stop` fires
pub(crate) async fn run_session(shared: &Shared, stop: &mut watch::Receiver<bool>) -> SessionEnd {
    shared.set_state(ConnectionState::Connecting);
    info!("Connecting to gateway {}", shared.url);

    let connect_timeout = shared.config.timeouts.connect;
    let open = tokio::time::timeout(connect_timeout, shared.connector.open(&shared.url));
    let handle = tokio::select! {
        biased;
        _ = stop.changed() => return SessionEnd::Stopped { reached_ready: false },
        result = open => match result {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                warn!("Gateway connection failed: {}", e);
                return SessionEnd::Closed { reached_ready: false, pairing_pending: false };
            }
            Err(_) => {
                warn!("Gateway connection timed out after {:?}", connect_timeout);
                return SessionEnd::Closed { reached_ready: false, pairing_pending: false };
            }
        },
    };

    let TransportHandle { outbound, mut inbound } = handle;
    shared.registry.attach(outbound.clone());
    shared.reset_sequence();

    let mut session = Session::new(shared, outbound);
    session.drive(HandshakeInput::Opened).await;

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => {
                session.close(close_codes::NORMAL, "client disconnect").await;
                return SessionEnd::Stopped { reached_ready: session.reached_ready };
            }
            result = wait_pending(&mut session.hello) => {
                session.hello = None;
                session.on_hello_result(result).await;
            }
            message = inbound.recv() => match message {
                Some(Inbound::Text(text)) => session.on_text(&text).await,
                Some(Inbound::Error(e)) => warn!("Gateway transport error: {}", e),
                Some(Inbound::Closed { code, reason }) => {
                    info!("Gateway connection closed ({} {})", code, reason);
                    return session.end();
                }
                None => {
                    info!("Gateway transport ended");
                    return session.end();
                }
            },
            _ = sleep_until(session.challenge_deadline) => {
                session.challenge_deadline = None;
                session.drive(HandshakeInput::ChallengeTimeout).await;
            }
            _ = sleep_until(session.tick_deadline) => {
                warn!("No tick from gateway within {:?}, closing", session.tick_window.unwrap_or_default());
                session.close(close_codes::TICK_TIMEOUT, "tick timeout").await;
                return session.end();
            }
        }

        if session.failed {
            return session.end();
        }
    }
}

/// Resolve the hello response, or never while none is in flight
async fn wait_pending(pending: &mut Option<PendingResponse>) -> Result<Value> {
    match pending {
        Some(pending) => pending.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct Session<'a> {
    shared: &'a Shared,
    outbound: mpsc::Sender<Outbound>,
    handshake: Handshake,
    challenge_deadline: Option<Instant>,
    /// The `connect` request in flight
    hello: Option<PendingResponse>,
    /// Twice the announced tick interval
    tick_window: Option<Duration>,
    tick_deadline: Option<Instant>,
    reached_ready: bool,
    failed: bool,
}

impl<'a> Session<'a> {
    fn new(shared: &'a Shared, outbound: mpsc::Sender<Outbound>) -> Self {
        Session {
            shared,
            outbound,
            handshake: Handshake::new(shared.config.timeouts.challenge, shared.pairing_pending()),
            challenge_deadline: None,
            hello: None,
            tick_window: None,
            tick_deadline: None,
            reached_ready: false,
            failed: false,
        }
    }

    fn end(&self) -> SessionEnd {
        SessionEnd::Closed {
            reached_ready: self.reached_ready,
            pairing_pending: self.handshake.is_pairing_pending(),
        }
    }

    async fn close(&self, code: u16, reason: &str) {
        debug!("Closing gateway connection with {}", code);
        let _ = self
            .outbound
            .send(Outbound::Close {
                code,
                reason: reason.to_string(),
            })
            .await;
    }

    async fn on_text(&mut self, text: &str) {
        match decode(text) {
            Ok(GatewayFrame::Response(response)) => {
                self.shared.registry.resolve(response);
            }
            Ok(GatewayFrame::Event(event)) => self.drive(HandshakeInput::Event(event)).await,
            Ok(GatewayFrame::Request(request)) => {
                warn!("Ignoring request frame from gateway: {}", request.method);
            }
            Err(e) => warn!("Dropping undecodable gateway frame: {}", e),
        }
    }

    async fn on_hello_result(&mut self, result: Result<Value>) {
        let input = match result {
            Ok(payload) => HandshakeInput::HelloAccepted(HelloOk::from_payload(&payload)),
            Err(Error::RequestFailed { code, message }) => {
                HandshakeInput::HelloRejected(ErrorShape::new(code, message))
            }
            Err(e) => HandshakeInput::HelloFailed(e),
        };
        self.drive(input).await;
    }

    /// Feed an input to the handshake and run every resulting action
    async fn drive(&mut self, input: HandshakeInput) {
        let mut inputs = VecDeque::from([input]);
        while let Some(input) = inputs.pop_front() {
            for action in self.handshake.handle(input) {
                if let Some(next) = self.execute(action).await {
                    inputs.push_back(next);
                }
            }
        }
        self.shared
            .set_state(ConnectionState::from_phase(self.handshake.phase()));
    }

    async fn execute(&mut self, action: HandshakeAction) -> Option<HandshakeInput> {
        match action {
            HandshakeAction::ArmChallengeTimer => {
                self.challenge_deadline = Some(Instant::now() + self.shared.config.timeouts.challenge);
            }
            HandshakeAction::DisarmChallengeTimer => self.challenge_deadline = None,
            HandshakeAction::Dispatch(event) => self.dispatch(event),
            HandshakeAction::SendHello { nonce } => return Some(self.send_hello(&nonce).await),
            HandshakeAction::PersistToken(token) => {
                self.shared
                    .identity
                    .save_token(&self.shared.config.gateway.url, &token)
                    .await;
            }
            HandshakeAction::PairingRequired(required) => self.shared.notify_pairing(required),
            HandshakeAction::MarkReady(hello) => self.mark_ready(hello),
            HandshakeAction::Fail { close_code, error } => {
                self.close(close_code, &error.to_string()).await;
                self.failed = true;
            }
        }
        None
    }

    fn dispatch(&mut self, event: EventFrame) {
        if event.event == events::TICK {
            if let Some(window) = self.tick_window {
                self.tick_deadline = Some(Instant::now() + window);
            }
        }
        self.shared.dispatch(&event);
    }

    fn mark_ready(&mut self, hello: HelloOk) {
        self.tick_window = hello
            .tick_interval_ms()
            .map(|ms| Duration::from_millis(ms.saturating_mul(2)));
        self.tick_deadline = self.tick_window.map(|window| Instant::now() + window);
        self.reached_ready = true;

        info!(
            "Gateway connection ready (protocol {})",
            hello.protocol.map_or_else(|| "?".to_string(), |p| p.to_string())
        );
        self.shared.scheduler.reset();
        self.shared.set_hello(Some(hello));
        self.shared.set_state(ConnectionState::Ready);
        self.shared.notify_connection(true);
    }

    async fn send_hello(&mut self, nonce: &str) -> HandshakeInput {
        let params = match serde_json::to_value(self.connect_params(nonce).await) {
            Ok(params) => params,
            Err(e) => return HandshakeInput::HelloFailed(e.into()),
        };
        match self.shared.registry.send(CONNECT_METHOD, Some(params)).await {
            Ok(pending) => {
                self.hello = Some(pending);
                HandshakeInput::HelloSent
            }
            Err(e) => HandshakeInput::HelloFailed(e),
        }
    }

    async fn connect_params(&self, nonce: &str) -> ConnectParams {
        let gateway = &self.shared.config.gateway;

        // A device token issued earlier beats the static token
        let token = match self.shared.identity.load_token(&gateway.url).await {
            Some(token) => Some(token),
            None => gateway.token.as_ref().map(|t| t.expose_secret().to_string()),
        };
        let device = if gateway.device_auth {
            self.device_proof(nonce, token.as_deref()).await
        } else {
            None
        };

        ConnectParams {
            client: ClientInfo {
                id: gateway.client.id.clone(),
                version: gateway.client.version.clone(),
                platform: gateway.client.platform.clone(),
                mode: gateway.client.mode.clone(),
                display_name: gateway.client.display_name.clone(),
                instance_id: gateway.client.instance_id.clone(),
            },
            min_protocol: gateway.min_protocol,
            max_protocol: gateway.max_protocol,
            role: gateway.role.clone(),
            scopes: gateway.scopes.clone(),
            caps: Vec::new(),
            auth: token.map(|token| AuthParams { token }),
            device,
            user_agent: Some(format!("{}/{}", crate::NAME, crate::VERSION)),
        }
    }

    async fn device_proof(&self, nonce: &str, token: Option<&str>) -> Option<DeviceProof> {
        let gateway = &self.shared.config.gateway;
        let identity = self.shared.identity.load_or_create().await;
        let signed_at = Utc::now().timestamp_millis();

        let payload = SigningPayload {
            device_id: &identity.device_id,
            client_id: &gateway.client.id,
            client_mode: &gateway.client.mode,
            role: &gateway.role,
            scopes: &gateway.scopes,
            signed_at_ms: signed_at,
            token,
            nonce: Some(nonce),
        }
        .canonical();

        match self.shared.identity.sign(&identity, &payload) {
            Ok(signature) => Some(DeviceProof {
                id: identity.device_id.clone(),
                public_key: identity.public_key.clone(),
                signature,
                signed_at,
                nonce: Some(nonce.to_string()),
            }),
            Err(e) => {
                warn!("Could not sign device proof, continuing without it: {}", e);
                None
            }
        }
    }
}
