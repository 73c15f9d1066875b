//! WebSocket connection with state management and auto-reconnect.
//!
//! [`WsClient`] owns at most one live transport and at most one pending
//! retry. Every transport attempt is tagged with a generation number; any
//! explicit `connect`/`disconnect`/`reconnect` bumps it, and work belonging
//! to an older generation discards itself instead of touching state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_channel::mpsc::UnboundedSender;
use futures_util::StreamExt;
use jobfair_shared::{ClientCommand, ConnectionStatus, EventKind, Outbound};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use super::router::{ClientEvent, EventRouter, Handler};
use super::transport::{Connector, Transport};
use crate::config::{ClientConfig, Credentials};
use crate::error::ClientError;

/// Lifecycle phase of the connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Idle,
    Connecting,
    Open,
    /// Closed; a retry may be pending
    Closed,
    /// Retry budget exhausted; only `reconnect()` leaves this state
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }
}

struct State {
    phase: ConnectionState,
    credentials: Credentials,
    attempts: u32,
    generation: u64,
    /// Pending scheduled retry
    retry: Option<JoinHandle<()>>,
    /// Task driving the current transport attempt
    task: Option<JoinHandle<()>>,
    /// Write side of the open transport
    outbound: Option<UnboundedSender<String>>,
}

struct Inner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    router: EventRouter,
    runtime: Handle,
    state: Mutex<State>,
    phase_tx: watch::Sender<ConnectionState>,
}

/// Reconnecting event-stream client. Cheap to clone; clones share the same
/// connection and the same handler registry.
#[derive(Clone)]
pub struct WsClient {
    inner: Arc<Inner>,
}

impl WsClient {
    /// Create a client bound to the current tokio runtime.
    pub fn new(config: ClientConfig, connector: impl Connector) -> Result<Self, ClientError> {
        let runtime = Handle::try_current()?;
        let (phase_tx, _) = watch::channel(ConnectionState::Idle);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                connector: Arc::new(connector),
                router: EventRouter::new(),
                runtime,
                state: Mutex::new(State {
                    phase: ConnectionState::Idle,
                    credentials: Credentials::default(),
                    attempts: 0,
                    generation: 0,
                    retry: None,
                    task: None,
                    outbound: None,
                }),
                phase_tx,
            }),
        })
    }

    /// The handler registry. Subscribe here; registrations outlive
    /// disconnects and reconnects.
    pub fn router(&self) -> &EventRouter {
        &self.inner.router
    }

    /// Shorthand for `router().on(..)`.
    pub fn on(&self, kind: EventKind, handler: Handler) {
        self.inner.router.on(kind, handler);
    }

    /// Shorthand for `router().off(..)`.
    pub fn off(&self, kind: &EventKind, handler: &Handler) -> bool {
        self.inner.router.off(kind, handler)
    }

    /// Credentials used by the next automatic or manual reconnect.
    pub fn credentials(&self) -> Credentials {
        self.lock().credentials.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().phase
    }

    /// Observe phase changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.phase_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Number of retries scheduled since the last successful open or explicit
    /// connect.
    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    /// Whether a retry is currently scheduled.
    pub fn retry_pending(&self) -> bool {
        self.lock().retry.is_some()
    }

    /// Open a transport with `credentials`. A no-op while already open or
    /// while an attempt is in flight.
    pub fn connect(&self, credentials: Credentials) {
        let mut state = self.lock();
        match state.phase {
            ConnectionState::Open => {
                crate::log_debug!("WebSocket already connected");
                return;
            }
            ConnectionState::Connecting => {
                crate::log_debug!("WebSocket connection in progress");
                return;
            }
            _ => {}
        }
        if credentials.is_anonymous() {
            crate::log_warn!("Connecting without credentials; the server will reject the socket");
        }
        state.credentials = credentials;
        // An explicit connect starts a fresh retry budget, also after
        // `disconnect()` exhausted it.
        state.attempts = 0;
        self.start_attempt(&mut state);
    }

    /// Close the transport and stop automatic reconnection. Idempotent.
    pub fn disconnect(&self) {
        let was_live = {
            let mut state = self.lock();
            if let Some(retry) = state.retry.take() {
                retry.abort();
            }
            state.attempts = self.inner.config.reconnect.max_attempts;
            state.generation += 1;
            // Dropping the sender closes the socket.
            state.outbound = None;
            if let Some(task) = state.task.take() {
                task.abort();
            }
            let was_live = matches!(
                state.phase,
                ConnectionState::Open | ConnectionState::Connecting
            );
            self.set_phase(&mut state, ConnectionState::Closed);
            was_live
        };

        if was_live {
            crate::log_info!("WebSocket disconnected");
            self.emit(ClientEvent::Connection(ConnectionStatus::Disconnected));
        }
    }

    /// Cancel any pending retry, reset the retry budget and connect again
    /// with the last credentials.
    pub fn reconnect(&self) {
        let credentials = {
            let mut state = self.lock();
            if let Some(retry) = state.retry.take() {
                retry.abort();
            }
            state.attempts = 0;
            state.credentials.clone()
        };
        crate::log_info!("Manual WebSocket reconnect");
        self.connect(credentials);
    }

    /// Queue `message` on the open transport. Dropped with a warning when not
    /// connected; returns whether it was queued.
    pub fn send(&self, message: impl Into<Outbound>) -> bool {
        let message = message.into();
        let state = self.lock();
        let outbound = match (&state.phase, &state.outbound) {
            (ConnectionState::Open, Some(outbound)) => outbound,
            _ => {
                crate::log_warn!("WebSocket not connected, cannot send message");
                return false;
            }
        };

        match message.to_text() {
            Ok(text) => {
                crate::log_debug!("Sending: {}", text);
                outbound.unbounded_send(text).is_ok()
            }
            Err(e) => {
                crate::log_error!("Serialize failed: {}", e);
                false
            }
        }
    }

    /// Send a keep-alive `ping`.
    pub fn ping(&self) -> bool {
        self.send(ClientCommand::Ping)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, state: &mut State, phase: ConnectionState) {
        state.phase = phase;
        self.inner.phase_tx.send_replace(phase);
    }

    fn emit(&self, event: ClientEvent) {
        self.inner.router.emit(&event);
    }

    /// Must be called with the state lock held.
    fn start_attempt(&self, state: &mut State) {
        if let Some(retry) = state.retry.take() {
            retry.abort();
        }
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.outbound = None;
        state.generation += 1;
        let generation = state.generation;
        let url = self.inner.config.url_for(&state.credentials);
        self.set_phase(state, ConnectionState::Connecting);

        let client = self.clone();
        state.task = Some(
            self.inner
                .runtime
                .spawn(async move { client.run_transport(generation, url).await }),
        );
    }

    async fn run_transport(self, generation: u64, url: Url) {
        crate::log_info!("Connecting to {}", self.inner.config.endpoint);

        let Transport {
            outbound,
            mut inbound,
        } = match self.inner.connector.connect(&url).await {
            Ok(transport) => transport,
            Err(e) => {
                crate::log_error!("WebSocket connection error: {}", e);
                if self.is_current(generation) {
                    self.emit(ClientEvent::Error {
                        reason: e.to_string(),
                    });
                }
                self.handle_closed(generation);
                return;
            }
        };

        {
            let mut state = self.lock();
            if state.generation != generation {
                crate::log_debug!("Discarding superseded WebSocket connection");
                return;
            }
            state.attempts = 0;
            state.outbound = Some(outbound);
            self.set_phase(&mut state, ConnectionState::Open);
        }
        crate::log_info!("WebSocket connected");
        self.emit(ClientEvent::Connection(ConnectionStatus::Connected));

        while let Some(item) = inbound.next().await {
            if !self.is_current(generation) {
                return;
            }
            match item {
                Ok(text) => {
                    crate::log_debug!("WebSocket received: {}", text);
                    self.inner.router.dispatch_text(&text);
                }
                Err(e) => {
                    crate::log_error!("WebSocket read error: {}", e);
                    self.emit(ClientEvent::Error {
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }

        self.handle_closed(generation);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// The transport of `generation` ended without an explicit disconnect.
    fn handle_closed(&self, generation: u64) {
        {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.outbound = None;
            // This is the running task; detach rather than abort.
            state.task = None;
            self.set_phase(&mut state, ConnectionState::Closed);
        }
        crate::log_info!("WebSocket closed");
        self.emit(ClientEvent::Connection(ConnectionStatus::Disconnected));
        self.schedule_retry(generation);
    }

    fn schedule_retry(&self, generation: u64) {
        let mut state = self.lock();
        // A handler reacting to the close may already have moved on.
        if state.generation != generation || state.phase != ConnectionState::Closed {
            return;
        }

        let reconnect = &self.inner.config.reconnect;
        if state.attempts >= reconnect.max_attempts {
            self.set_phase(&mut state, ConnectionState::Failed);
            drop(state);
            crate::log_warn!("Max reconnection attempts reached");
            self.emit(ClientEvent::Connection(ConnectionStatus::Failed));
            return;
        }

        state.attempts += 1;
        let attempt = state.attempts;
        let delay = reconnect.delay(attempt - 1);
        crate::log_info!(
            "Reconnecting in {}ms (attempt {})",
            delay.as_millis(),
            attempt
        );

        if let Some(previous) = state.retry.take() {
            previous.abort();
        }
        let client = self.clone();
        state.retry = Some(self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            client.fire_retry(generation);
        }));
    }

    fn fire_retry(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation || state.phase != ConnectionState::Closed {
            return;
        }
        // This is the running retry task; detach rather than abort.
        state.retry = None;
        self.start_attempt(&mut state);
    }
}

impl std::fmt::Debug for WsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("WsClient")
            .field("endpoint", &self.inner.config.endpoint.as_str())
            .field("phase", &state.phase)
            .field("attempts", &state.attempts)
            .field("credentials", &state.credentials)
            .finish()
    }
}
