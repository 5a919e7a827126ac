//! Gateway client
//!
//! The connection orchestrator. [`GatewayClient::connect`] starts a
//! supervisor task that runs one session per connection attempt and
//! schedules reconnects until [`GatewayClient::disconnect`] is called or the
//! attempt budget runs out.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use super::dispatcher::{guarded, EventDispatcher, SequenceGap};
use super::protocol::{EventFrame, HelloOk};
use super::reconnect::{ReconnectScheduler, RetryDecision};
use super::registry::RequestRegistry;
use super::session::{run_session, SessionEnd};
use super::state::ConnectionState;
use super::transport::{Connector, WebSocketConnector};
use crate::config::{validate_config, Config};
use crate::error::{Error, Result};
use crate::identity::DeviceIdentityStore;
use crate::storage::{open_store, KeyValueStore};

/// Callback receiving a status flag
pub type StatusCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// State shared between the client handle and its supervisor
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) url: Url,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) identity: DeviceIdentityStore,
    pub(crate) registry: RequestRegistry,
    pub(crate) scheduler: ReconnectScheduler,
    dispatcher: EventDispatcher,
    connection_listeners: Vec<StatusCallback>,
    pairing_listeners: Vec<StatusCallback>,
    state: watch::Sender<ConnectionState>,
    hello: RwLock<Option<HelloOk>>,
    pairing_pending: AtomicBool,
}

impl Shared {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!("Connection state {} -> {}", current, next);
            *current = next;
            true
        });
    }

    pub(crate) fn set_hello(&self, hello: Option<HelloOk>) {
        *self.hello.write().unwrap_or_else(|p| p.into_inner()) = hello;
    }

    pub(crate) fn pairing_pending(&self) -> bool {
        self.pairing_pending.load(Ordering::SeqCst)
    }

    pub(crate) fn notify_pairing(&self, required: bool) {
        self.pairing_pending.store(required, Ordering::SeqCst);
        for listener in &self.pairing_listeners {
            guarded("pairing listener", || listener(required));
        }
    }

    pub(crate) fn notify_connection(&self, connected: bool) {
        for listener in &self.connection_listeners {
            guarded("connection listener", || listener(connected));
        }
    }

    pub(crate) fn dispatch(&self, event: &EventFrame) {
        self.dispatcher.dispatch(event);
    }

    pub(crate) fn reset_sequence(&self) {
        self.dispatcher.reset_sequence();
    }
}

struct Supervisor {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Client for one gateway
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct GatewayClient {
    shared: Arc<Shared>,
    supervisor: Arc<Mutex<Option<Supervisor>>>,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("url", &self.shared.url.as_str())
            .field("state", &self.shared.state())
            .finish()
    }
}

impl GatewayClient {
    /// Start building a client
    pub fn builder(config: Config) -> GatewayClientBuilder {
        GatewayClientBuilder::new(config)
    }

    /// Client with default collaborators
    pub fn new(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    fn lock_supervisor(&self) -> MutexGuard<'_, Option<Supervisor>> {
        self.supervisor.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Start connecting in the background
    ///
    /// Does nothing while a connection is being established or is up. Must
    /// be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut slot = self.lock_supervisor();
        if slot.as_ref().is_some_and(|s| !s.task.is_finished()) {
            debug!("Gateway client already connecting");
            return;
        }

        self.shared.scheduler.reset();
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(supervise(self.shared.clone(), stop_rx));
        *slot = Some(Supervisor { stop, task });
    }

    /// Close the connection and stop reconnecting
    ///
    /// Pending requests fail with [`Error::ConnectionClosed`]. The device
    /// identity and stored tokens are kept.
    pub async fn disconnect(&self) {
        let supervisor = self.lock_supervisor().take();
        if let Some(supervisor) = supervisor {
            let _ = supervisor.stop.send(true);
            if let Err(e) = supervisor.task.await {
                warn!("Gateway supervisor ended abnormally: {}", e);
            }
        }
        self.shared.registry.reject_all();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Whether requests are currently accepted
    pub fn is_connected(&self) -> bool {
        self.shared.state().is_ready()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Watch connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Hello payload of the current connection
    pub fn hello(&self) -> Option<HelloOk> {
        self.shared
            .hello
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Failed connection cycles since the last `Ready`
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.scheduler.attempts()
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Send a request and wait for its payload
    ///
    /// Fails with [`Error::NotConnected`] unless the connection is `Ready`;
    /// requests are never queued.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.shared.registry.send(method, params).await?.await
    }

    /// Send a request with typed params and result
    pub async fn request_typed<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = match serde_json::to_value(params)? {
            Value::Null => None,
            params => Some(params),
        };
        let payload = self.request(method, params).await?;
        Ok(serde_json::from_value(payload)?)
    }
}

/// Reconnect loop: one session per iteration until stopped or halted
async fn supervise(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            break;
        }

        let end = run_session(&shared, &mut stop).await;

        // Outstanding requests fail before any new attempt starts
        shared.registry.reject_all();
        shared.set_hello(None);
        if end.reached_ready() {
            shared.notify_connection(false);
        }

        let decision = match end {
            SessionEnd::Stopped { .. } => break,
            SessionEnd::Closed { pairing_pending: true, .. } => shared.scheduler.on_pairing_pending(),
            SessionEnd::Closed { .. } => shared.scheduler.on_failure(),
        };
        let delay = match decision {
            RetryDecision::RetryAfter(delay) => delay,
            RetryDecision::GiveUp => {
                error!(
                    "Giving up on gateway {} after {} failed attempts",
                    shared.url,
                    shared.scheduler.attempts()
                );
                shared.set_state(ConnectionState::Halted);
                return;
            }
        };

        shared.set_state(ConnectionState::Disconnected);
        info!("Reconnecting to gateway in {:?}", delay);
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.set_state(ConnectionState::Disconnected);
    debug!("Gateway supervisor stopped");
}

/// Builder for [`GatewayClient`]
pub struct GatewayClientBuilder {
    config: Config,
    connector: Option<Arc<dyn Connector>>,
    identity_store: Option<Arc<dyn KeyValueStore>>,
    token_store: Option<Arc<dyn KeyValueStore>>,
    dispatcher: EventDispatcher,
    connection_listeners: Vec<StatusCallback>,
    pairing_listeners: Vec<StatusCallback>,
}

impl GatewayClientBuilder {
    /// Create a builder with default collaborators
    pub fn new(config: Config) -> Self {
        GatewayClientBuilder {
            config,
            connector: None,
            identity_store: None,
            token_store: None,
            dispatcher: EventDispatcher::new(),
            connection_listeners: Vec::new(),
            pairing_listeners: Vec::new(),
        }
    }

    /// Use a custom transport
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Keep identity and device tokens in `store`
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.identity_store = Some(store.clone());
        self.token_store = Some(store);
        self
    }

    /// Keep the device identity in `store`
    pub fn with_identity_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.identity_store = Some(store);
        self
    }

    /// Keep device tokens in `store`
    pub fn with_token_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Receive every gateway event, in arrival order
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(&EventFrame) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(Arc::new(callback));
        self
    }

    /// Called with `true` when a connection becomes ready, `false` when it drops
    pub fn on_connection_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.connection_listeners.push(Arc::new(callback));
        self
    }

    /// Called with `true` when the device awaits pairing, `false` once approved
    pub fn on_pairing_required<F>(mut self, callback: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.pairing_listeners.push(Arc::new(callback));
        self
    }

    /// Called when event sequence numbers skip
    pub fn on_gap<F>(mut self, callback: F) -> Self
    where
        F: Fn(SequenceGap) + Send + Sync + 'static,
    {
        self.dispatcher.on_gap(Arc::new(callback));
        self
    }

    /// Validate the configuration and build the client
    pub fn build(self) -> Result<GatewayClient> {
        let validation = validate_config(&self.config);
        if let Some(message) = validation.first_error() {
            return Err(Error::Config(message));
        }
        let url = Url::parse(&self.config.gateway.url)?;

        let default_store = || open_store(&self.config.storage);
        let (identities, tokens) = match (self.identity_store.clone(), self.token_store.clone()) {
            (Some(identities), Some(tokens)) => (identities, tokens),
            (Some(identities), None) => (identities, default_store()),
            (None, Some(tokens)) => (default_store(), tokens),
            (None, None) => {
                let store = default_store();
                (store.clone(), store)
            }
        };

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector::new()));
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        let shared = Shared {
            registry: RequestRegistry::new(self.config.timeouts.request),
            scheduler: ReconnectScheduler::new(self.config.reconnect.clone()),
            identity: DeviceIdentityStore::new(identities, tokens),
            config: self.config,
            url,
            connector,
            dispatcher: self.dispatcher,
            connection_listeners: self.connection_listeners,
            pairing_listeners: self.pairing_listeners,
            state,
            hello: RwLock::new(None),
            pairing_pending: AtomicBool::new(false),
        };

        Ok(GatewayClient {
            shared: Arc::new(shared),
            supervisor: Arc::new(Mutex::new(None)),
        })
    }
}
