//! Realtime channel client: connection state machine, heartbeat and
//! reconnect handling.
//!
//! The client owns at most one websocket at a time. Each connection attempt
//! runs in its own task and is tagged with a generation number; `connect` and
//! `disconnect` bump the generation so that a superseded task or a pending
//! reconnect timer can never touch the current state. Outbound messages are
//! only accepted while connected; there is no offline queue.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::realtime::config::ChannelConfig;
use crate::realtime::listeners::{ListenerId, ListenerRegistry};
use crate::realtime::proto::{
    ClientCommand, InboundMessage, OutboundMessage, ProtoError, CONNECTED_EVENT,
    DISCONNECTED_EVENT, ERROR_EVENT,
};
use crate::realtime::transport::{BoxSocket, Connector, TungsteniteConnector};
use crate::retry::with_timeout;

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the reconnect delay after an unexpected close.
    Reconnecting,
}

/// Errors produced by channel transport, protocol and setup.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Websocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame could not be decoded or built.
    #[error("protocol error: {0}")]
    Proto(#[from] ProtoError),

    /// Config rejected by `ChannelConfig::validate`.
    #[error("invalid channel config: {0}")]
    InvalidConfig(String),

    /// Transport open exceeded `open_timeout`.
    #[error("connection attempt timed out after {0:?}")]
    OpenTimeout(Duration),

    /// The client was built outside of a tokio runtime.
    #[error("no tokio runtime available to drive the channel")]
    NoRuntime,
}

enum Outbound {
    Text(String),
    Close,
}

enum SessionOutcome {
    GracefulShutdown,
    Reconnect,
}

#[derive(Default)]
struct Shared {
    state: ConnectionState,
    reconnect_attempts: u32,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    reconnect_task: Option<JoinHandle<()>>,
}

struct Inner {
    config: ChannelConfig,
    connector: Box<dyn Connector>,
    listeners: Arc<ListenerRegistry>,
    runtime: Handle,
    shared: Mutex<Shared>,
}

/// Auto-reconnecting realtime channel.
///
/// Build one per application session and share it by reference. Dropping the
/// client disconnects it.
pub struct ChannelClient {
    inner: Arc<Inner>,
}

/// Async receiver for one event type, created by [`ChannelClient::subscribe`].
///
/// Dropping the subscription removes its listener from the client.
#[derive(Debug)]
pub struct Subscription {
    event_type: String,
    id: Option<ListenerId>,
    registry: Arc<ListenerRegistry>,
    receiver: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    /// Event type this subscription listens to.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Receives the next payload for this event type.
    pub async fn recv(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }

    fn release(&mut self) -> bool {
        match self.id.take() {
            Some(id) => self.registry.off(&self.event_type, id),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl ChannelClient {
    /// Creates a client using the production websocket connector.
    ///
    /// Must be called from within a tokio runtime; the runtime drives the
    /// connection tasks.
    pub fn new(config: ChannelConfig) -> Result<Self, ChannelError> {
        Self::with_connector(config, TungsteniteConnector)
    }

    /// Creates a client with a custom transport connector.
    pub fn with_connector<C>(config: ChannelConfig, connector: C) -> Result<Self, ChannelError>
    where
        C: Connector,
    {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ChannelError::NoRuntime)?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                connector: Box::new(connector),
                listeners: Arc::new(ListenerRegistry::new()),
                runtime,
                shared: Mutex::new(Shared::default()),
            }),
        })
    }

    /// Config the client was built with.
    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.shared().state
    }

    /// Whether the transport is open and accepting sends.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Consecutive automatic reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared().reconnect_attempts
    }

    /// Opens the channel with `credential`.
    ///
    /// No-op while connected or while an attempt is in flight. During a
    /// reconnect delay the pending timer is cancelled and a fresh attempt
    /// starts immediately. Returns without waiting for the transport; watch
    /// the `connected` event for the outcome.
    pub fn connect(&self, credential: SecretString) {
        let mut shared = self.inner.shared();
        match shared.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                debug!(event = "channel_connect_ignored", state = ?shared.state);
                return;
            }
            ConnectionState::Reconnecting => {
                if let Some(task) = shared.reconnect_task.take() {
                    task.abort();
                }
            }
            ConnectionState::Disconnected => {}
        }
        self.inner.start_attempt(&mut shared, credential);
    }

    /// Closes the channel on purpose.
    ///
    /// Stops the heartbeat, cancels a pending reconnect and closes the
    /// transport. The resulting transport close never schedules a reconnect.
    /// When the channel was connected, the connection task emits
    /// `disconnected` once the socket is closed, always after its `connected`.
    pub fn disconnect(&self) {
        let mut shared = self.inner.shared();
        let previous = shared.state;
        shared.generation += 1;
        shared.state = ConnectionState::Disconnected;
        if let Some(task) = shared.reconnect_task.take() {
            task.abort();
        }
        if let Some(outbound) = shared.outbound.take() {
            let _ = outbound.send(Outbound::Close);
        }
        drop(shared);

        if previous == ConnectionState::Disconnected {
            return;
        }
        info!(
            event = "channel_disconnected",
            reason = "requested",
            previous = ?previous,
            endpoint = %self.inner.config.endpoint()
        );
    }

    /// Registers `callback` for `event_type`.
    pub fn on<F>(&self, event_type: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.listeners.on(event_type, callback)
    }

    /// Removes one registration. Unknown ids are ignored.
    pub fn off(&self, event_type: &str, id: ListenerId) -> bool {
        self.inner.listeners.off(event_type, id)
    }

    /// Dispatches `payload` to the listeners of `event_type`, in order.
    pub fn emit(&self, event_type: &str, payload: &Value) -> usize {
        self.inner.listeners.emit(event_type, payload)
    }

    /// Forwards `event_type` payloads into an async receiver.
    pub fn subscribe(&self, event_type: &str) -> Subscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let id = self.on(event_type, move |payload| {
            let _ = tx.send(payload.clone());
        });
        Subscription {
            event_type: event_type.to_string(),
            id: Some(id),
            registry: Arc::clone(&self.inner.listeners),
            receiver,
        }
    }

    /// Removes `subscription`'s listener; same as dropping it.
    pub fn unsubscribe(&self, mut subscription: Subscription) -> bool {
        subscription.release()
    }

    /// Sends `{type, ...data}` when connected.
    ///
    /// While not connected the message is dropped and `Ok(())` is returned.
    /// Fails, in any state, when `data` does not serialize to a JSON object
    /// or null.
    pub fn send<T>(&self, event_type: &str, data: &T) -> Result<(), ChannelError>
    where
        T: Serialize + ?Sized,
    {
        let text = OutboundMessage::new(event_type, data)?.to_text()?;
        let Some(outbound) = self.inner.live_sender() else {
            debug!(event = "channel_send_dropped", event_type, reason = "not connected");
            return Ok(());
        };
        let _ = outbound.send(Outbound::Text(text));
        Ok(())
    }

    /// Sends a typed storefront command when connected.
    pub fn send_command(&self, command: &ClientCommand) -> Result<(), ChannelError> {
        let text = command.to_text()?;
        let Some(outbound) = self.inner.live_sender() else {
            debug!(event = "channel_send_dropped", ?command, reason = "not connected");
            return Ok(());
        };
        let _ = outbound.send(Outbound::Text(text));
        Ok(())
    }

    pub(crate) fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.inner.listeners
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for ChannelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.shared();
        f.debug_struct("ChannelClient")
            .field("endpoint", &self.inner.config.endpoint())
            .field("state", &shared.state)
            .field("reconnect_attempts", &shared.reconnect_attempts)
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}

impl Inner {
    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.shared().generation == generation
    }

    fn live_sender(&self) -> Option<mpsc::UnboundedSender<Outbound>> {
        let shared = self.shared();
        match shared.state {
            ConnectionState::Connected => shared.outbound.clone(),
            _ => None,
        }
    }

    fn start_attempt(self: &Arc<Self>, shared: &mut Shared, credential: SecretString) {
        shared.generation += 1;
        shared.state = ConnectionState::Connecting;
        let generation = shared.generation;
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            inner.run_connection(generation, credential).await;
        });
    }

    async fn run_connection(self: Arc<Self>, generation: u64, credential: SecretString) {
        let endpoint = self.config.endpoint();
        debug!(event = "channel_connecting", %endpoint, generation);

        let url = self.config.connection_url(&credential);
        let opened = match with_timeout(self.config.open_timeout, self.connector.open(url)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::OpenTimeout(self.config.open_timeout)),
        };
        let mut socket = match opened {
            Ok(socket) => socket,
            Err(err) => {
                if self.is_current(generation) {
                    warn!(event = "channel_open_failed", %endpoint, error = %err);
                    self.report_error(&err);
                    self.handle_close(generation, credential);
                }
                return;
            }
        };

        let Some(outbound_rx) = self.mark_connected(generation) else {
            debug!(event = "channel_attempt_superseded", generation);
            let _ = socket.close().await;
            return;
        };
        // Lifecycle events for this connection are emitted only from this
        // task, so `disconnected` can never overtake `connected`.
        info!(event = "channel_connected", %endpoint, generation);
        self.listeners.emit(CONNECTED_EVENT, &Value::Null);

        match self.drive(generation, &mut socket, outbound_rx).await {
            SessionOutcome::GracefulShutdown => {
                debug!(event = "channel_closed", %endpoint, generation);
                self.listeners.emit(DISCONNECTED_EVENT, &Value::Null);
            }
            SessionOutcome::Reconnect => {
                info!(event = "channel_disconnected", reason = "unexpected", %endpoint);
                if !self.handle_close(generation, credential) {
                    // A racing `disconnect` already settled the state.
                    self.listeners.emit(DISCONNECTED_EVENT, &Value::Null);
                }
            }
        }
    }

    fn mark_connected(&self, generation: u64) -> Option<mpsc::UnboundedReceiver<Outbound>> {
        let mut shared = self.shared();
        if shared.generation != generation {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        shared.state = ConnectionState::Connected;
        shared.reconnect_attempts = 0;
        shared.outbound = Some(tx);
        Some(rx)
    }

    async fn drive(
        &self,
        generation: u64,
        socket: &mut BoxSocket,
        mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    ) -> SessionOutcome {
        let period = self.config.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                maybe_outbound = outbound_rx.recv() => {
                    match maybe_outbound {
                        Some(Outbound::Text(text)) => {
                            if let Err(err) = socket.send(Message::Text(text)).await {
                                self.report_error(&ChannelError::WebSocket(err));
                                return SessionOutcome::Reconnect;
                            }
                        }
                        Some(Outbound::Close) | None => {
                            let _ = socket.close().await;
                            return SessionOutcome::GracefulShutdown;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if !self.is_current(generation) {
                        continue;
                    }
                    let Ok(ping) = ClientCommand::Ping.to_text() else {
                        continue;
                    };
                    if let Err(err) = socket.send(Message::Text(ping)).await {
                        self.report_error(&ChannelError::WebSocket(err));
                        return SessionOutcome::Reconnect;
                    }
                }
                maybe_inbound = socket.next() => {
                    match maybe_inbound {
                        Some(Ok(Message::Text(text))) => self.dispatch(&text),
                        Some(Ok(Message::Ping(payload))) => {
                            if socket.send(Message::Pong(payload)).await.is_err() {
                                return SessionOutcome::Reconnect;
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            debug!(event = "channel_close_frame", ?frame);
                            return SessionOutcome::Reconnect;
                        }
                        Some(Ok(_)) => {
                            warn!(event = "channel_frame_dropped", reason = "non-text frame");
                        }
                        Some(Err(err)) => {
                            self.report_error(&ChannelError::WebSocket(err));
                            return SessionOutcome::Reconnect;
                        }
                        None => return SessionOutcome::Reconnect,
                    }
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match InboundMessage::from_text(text) {
            Ok(message) => {
                self.listeners.emit(&message.event_type, &message.data);
            }
            Err(err) => {
                warn!(
                    event = "channel_message_dropped",
                    error = %err,
                    frame_len = text.len()
                );
            }
        }
    }

    fn report_error(&self, err: &ChannelError) {
        self.listeners
            .emit(ERROR_EVENT, &json!({ "message": err.to_string() }));
    }

    /// Settles state after an unexpected close and arms the reconnect timer
    /// while budget remains. Returns `false`, doing nothing, when
    /// `generation` was superseded.
    fn handle_close(self: &Arc<Self>, generation: u64, credential: SecretString) -> bool {
        let mut shared = self.shared();
        if shared.generation != generation {
            return false;
        }
        shared.outbound = None;

        match self.config.reconnect.next_delay(shared.reconnect_attempts) {
            Some(delay) => {
                shared.reconnect_attempts += 1;
                shared.state = ConnectionState::Reconnecting;
                info!(
                    event = "channel_reconnect_scheduled",
                    attempt = shared.reconnect_attempts,
                    max_attempts = self.config.reconnect.max_attempts,
                    delay_ms = delay.as_millis() as u64
                );
                let inner = Arc::clone(self);
                shared.reconnect_task = Some(self.runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.fire_reconnect(generation, credential);
                }));
            }
            None => {
                shared.state = ConnectionState::Disconnected;
                warn!(
                    event = "channel_reconnect_exhausted",
                    attempts = shared.reconnect_attempts
                );
            }
        }
        drop(shared);

        self.listeners.emit(DISCONNECTED_EVENT, &Value::Null);
        true
    }

    fn fire_reconnect(self: &Arc<Self>, generation: u64, credential: SecretString) {
        let mut shared = self.shared();
        if shared.generation != generation || shared.state != ConnectionState::Reconnecting {
            return;
        }
        shared.reconnect_task = None;
        self.start_attempt(&mut shared, credential);
    }
}
