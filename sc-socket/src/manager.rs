//! Connection manager.
//!
//! Owns the single logical connection: connects with the current credential,
//! replays the subscription registry onto every new handle, reconnects
//! automatically after transport-level drops, and tears down on request.
//! Failures are never returned to callers; they surface as `connect_error` /
//! `disconnect` diagnostics and in the logs.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use sc_core::config::{AppConfig, SocketConfig};
use sc_core::error::{ScError, ScResult};

use crate::credential::CredentialProvider;
use crate::events::{ConnectionState, EventName, InboundEvent};
use crate::registry::{Observer, SubscriptionRegistry};
use crate::transport::{CloseReason, Handle, Handshake, NegotiatingTransport, Transport};

/// Configuration for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Attempts after a transport drop before giving up.
    pub max_attempts: u32,
    /// Fixed delay before each attempt.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: sc_core::constants::SOCKET_RECONNECT_ATTEMPTS,
            delay: Duration::from_millis(sc_core::constants::SOCKET_RECONNECT_DELAY_MS),
        }
    }
}

impl From<&SocketConfig> for ReconnectConfig {
    fn from(config: &SocketConfig) -> Self {
        Self {
            max_attempts: config.reconnect_attempts,
            delay: config.reconnect_delay(),
        }
    }
}

/// Where and how to connect. The token is filled in per handshake.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub address: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            path: sc_core::constants::DEFAULT_SOCKET_PATH.to_string(),
            headers: Vec::new(),
        }
    }

    fn handshake(&self, token: String) -> Handshake {
        Handshake {
            endpoint: self.address.clone(),
            path: self.path.clone(),
            token,
            headers: self.headers.clone(),
        }
    }
}

/// Tunables for a [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub reconnect: ReconnectConfig,
    /// Upper bound on a single handshake.
    pub connect_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_millis(sc_core::constants::DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

#[derive(Default)]
struct Slot {
    handle: Option<Handle>,
    /// Watches the live handle and runs reconnection after it drops.
    supervisor: Option<JoinHandle<()>>,
    reconnecting: bool,
    /// Bumped per handle and on teardown; stale supervisors compare against it.
    generation: u64,
}

struct Inner {
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
    credentials: Arc<dyn CredentialProvider>,
    registry: SubscriptionRegistry,
    reconnect: ReconnectConfig,
    connect_timeout: Duration,
    slot: Mutex<Slot>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let slot = self.slot.get_mut();
        if let Some(task) = slot.supervisor.take() {
            task.abort();
        }
        if let Some(handle) = slot.handle.take() {
            handle.close();
        }
    }
}

/// Owner of the single logical connection.
///
/// Cheap to clone; clones share the connection, registry, and state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager with default reconnection and handshake timeout.
    /// Nothing connects until `connect()` or a room/send operation needs a
    /// connection.
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: Endpoint,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self::with_options(transport, endpoint, credentials, ManagerOptions::default())
    }

    pub fn with_options(
        transport: Arc<dyn Transport>,
        endpoint: Endpoint,
        credentials: Arc<dyn CredentialProvider>,
        options: ManagerOptions,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                transport,
                endpoint,
                credentials,
                registry: SubscriptionRegistry::new(),
                reconnect: options.reconnect,
                connect_timeout: options.connect_timeout,
                slot: Mutex::new(Slot::default()),
                state_tx,
            }),
        }
    }

    /// Build a manager over the configured transport order.
    pub fn from_config(
        config: &AppConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ScResult<Self> {
        if !config.is_server_configured() {
            return Err(ScError::MissingConfig("server.address".into()));
        }
        let transport = NegotiatingTransport::from_config(&config.socket, &config.server)?;
        let mut headers: Vec<(String, String)> = config
            .server
            .custom_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.sort();
        let endpoint = Endpoint {
            address: config.server.address.clone(),
            path: config.server.socket_path.clone(),
            headers,
        };
        let options = ManagerOptions {
            reconnect: ReconnectConfig::from(&config.socket),
            connect_timeout: config.server.connect_timeout(),
        };
        Ok(Self::with_options(Arc::new(transport), endpoint, credentials, options))
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Point-in-time connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The process-wide subscription registry.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    fn set_state(&self, new_state: ConnectionState) {
        self.inner.state_tx.send_if_modified(|state| {
            if *state != new_state {
                info!("socket state: {} -> {}", *state, new_state);
                *state = new_state;
                true
            } else {
                false
            }
        });
    }

    fn diagnostic(&self, event: InboundEvent) {
        self.inner.registry.dispatch(&event);
    }

    /// The live handle, without connecting.
    pub async fn live_handle(&self) -> Option<Handle> {
        let slot = self.inner.slot.lock().await;
        slot.handle.clone().filter(Handle::is_open)
    }

    /// Ensure a live connection and return its handle.
    ///
    /// Returns the existing handle when connected. While automatic
    /// reconnection is in progress no extra handshake is started and `None`
    /// is returned. A failed attempt raises `connect_error` and returns `None`.
    pub async fn connect(&self) -> Option<Handle> {
        let mut slot = self.inner.slot.lock().await;
        if let Some(handle) = slot.handle.as_ref().filter(|h| h.is_open()) {
            return Some(handle.clone());
        }
        if slot.reconnecting {
            debug!("reconnection in progress, not starting another handshake");
            return None;
        }

        match self.establish(&mut slot).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("socket connection failed: {e}");
                self.set_state(ConnectionState::Disconnected);
                self.diagnostic(InboundEvent::ConnectError {
                    message: e.to_string(),
                });
                None
            }
        }
    }

    /// Open a handle, replay the registry onto it, start it, and install it
    /// as the live handle. Caller holds the slot lock.
    async fn establish(&self, slot: &mut MutexGuard<'_, Slot>) -> ScResult<Handle> {
        self.set_state(ConnectionState::Connecting);

        let token = self.inner.credentials.current_token().unwrap_or_default();
        info!(
            "socket connecting to {} (credential: {})",
            self.inner.endpoint.address,
            if token.is_empty() { "none" } else { "present" }
        );
        let handshake = self.inner.endpoint.handshake(token);

        let session = tokio::time::timeout(
            self.inner.connect_timeout,
            self.inner.transport.open(&handshake),
        )
        .await
        .map_err(|_| {
            ScError::Timeout(format!(
                "handshake did not finish within {:?}",
                self.inner.connect_timeout
            ))
        })??;

        let (handle, driver) = Handle::pair();
        let replayed = self.inner.registry.replay_onto(handle.listeners());
        debug!("replayed {replayed} subscription(s) onto handle {}", handle.id());
        let kind = session.kind();
        session.start(driver);

        slot.generation += 1;
        slot.handle = Some(handle.clone());
        slot.supervisor = Some(self.spawn_supervisor(handle.clone(), slot.generation));

        info!("socket connected via {kind} (handle {})", handle.id());
        self.set_state(ConnectionState::Connected);
        self.diagnostic(InboundEvent::Connect);
        Ok(handle)
    }

    fn spawn_supervisor(&self, handle: Handle, generation: u64) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let reason = handle.closed().await;
            if let Some(inner) = weak.upgrade() {
                ConnectionManager { inner }.on_handle_closed(generation, reason).await;
            }
        })
    }

    async fn on_handle_closed(&self, generation: u64, reason: CloseReason) {
        {
            let mut slot = self.inner.slot.lock().await;
            if slot.generation != generation {
                return;
            }
            slot.handle = None;
            warn!("socket disconnected: {reason}");
            self.diagnostic(InboundEvent::Disconnect {
                reason: reason.to_string(),
            });

            if !reason.should_reconnect() || self.inner.reconnect.max_attempts == 0 {
                self.set_state(ConnectionState::Disconnected);
                return;
            }
            slot.reconnecting = true;
            self.set_state(ConnectionState::Connecting);
        }
        self.reconnect_loop(generation).await;
    }

    /// Fixed-delay reconnection, bounded by `max_attempts`.
    async fn reconnect_loop(&self, generation: u64) {
        let max = self.inner.reconnect.max_attempts;
        for attempt in 1..=max {
            sleep(self.inner.reconnect.delay).await;

            let mut slot = self.inner.slot.lock().await;
            if !slot.reconnecting || slot.generation != generation {
                debug!("reconnection cancelled");
                return;
            }
            warn!("reconnection attempt {attempt}/{max}");
            match self.establish(&mut slot).await {
                Ok(_) => {
                    slot.reconnecting = false;
                    info!("reconnected after {attempt} attempt(s)");
                    return;
                }
                Err(e) => {
                    warn!("reconnection attempt {attempt} failed: {e}");
                    self.diagnostic(InboundEvent::ConnectError {
                        message: e.to_string(),
                    });
                }
            }
        }

        let mut slot = self.inner.slot.lock().await;
        if slot.reconnecting && slot.generation == generation {
            slot.reconnecting = false;
            error!("max reconnection attempts ({max}) reached");
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Close the connection and stop any reconnection.
    ///
    /// The subscription registry is kept; observers are replayed onto the
    /// next connection.
    pub async fn disconnect(&self) {
        let mut slot = self.inner.slot.lock().await;
        slot.generation += 1;
        slot.reconnecting = false;
        if let Some(task) = slot.supervisor.take() {
            task.abort();
        }
        let had_handle = match slot.handle.take() {
            Some(handle) => {
                let open = handle.is_open();
                handle.close();
                open
            }
            None => false,
        };
        drop(slot);

        self.set_state(ConnectionState::Disconnected);
        if had_handle {
            self.diagnostic(InboundEvent::Disconnect {
                reason: CloseReason::ClientClose.to_string(),
            });
        }
        info!("socket disconnected");
    }

    /// Register an observer; attach it to the live handle too, if any.
    ///
    /// Returns false if the observer was already registered for `name`.
    pub async fn subscribe(&self, name: EventName, observer: Observer) -> bool {
        let slot = self.inner.slot.lock().await;
        let inserted = self.inner.registry.insert(name.clone(), observer.clone());
        if let Some(handle) = &slot.handle {
            handle.on(name, observer);
        }
        inserted
    }

    /// Remove one observer, or every observer for `name` when `observer` is
    /// `None`, from both the registry and the live handle.
    ///
    /// Returns how many registry entries were removed.
    pub async fn unsubscribe(&self, name: &EventName, observer: Option<&Observer>) -> usize {
        let slot = self.inner.slot.lock().await;
        let removed = match observer {
            Some(o) => usize::from(self.inner.registry.remove(name, o)),
            None => self.inner.registry.remove_all(name),
        };
        if let Some(handle) = &slot.handle {
            handle.off(name, observer);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticCredential;
    use crate::events::Signal;
    use crate::transport::MemoryServer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager(server: &MemoryServer) -> ConnectionManager {
        ConnectionManager::with_options(
            Arc::new(server.transport()),
            Endpoint::new("http://localhost:4000"),
            Arc::new(StaticCredential::new("tok")),
            ManagerOptions {
                reconnect: ReconnectConfig {
                    max_attempts: 5,
                    delay: Duration::from_millis(10),
                },
                ..ManagerOptions::default()
            },
        )
    }

    fn counter(manager_events: &Arc<AtomicUsize>) -> Observer {
        let hits = manager_events.clone();
        Observer::new(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_manager_creation() {
        let server = MemoryServer::new();
        let manager = manager(&server);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());
        assert!(manager.live_handle().await.is_none());
        assert_eq!(server.handshake_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let server = MemoryServer::new();
        let manager = manager(&server);

        let first = manager.connect().await.unwrap();
        let second = manager.connect().await.unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(server.handshake_count(), 1);
        assert_eq!(server.tokens(), vec!["tok"]);
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn test_connect_failure_raises_connect_error() {
        let server = MemoryServer::new();
        let manager = manager(&server);
        let errors = Arc::new(AtomicUsize::new(0));
        manager.subscribe(EventName::ConnectError, counter(&errors)).await;

        server.refuse_next(1);
        assert!(manager.connect().await.is_none());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        // The next explicit call tries again
        assert!(manager.connect().await.is_some());
    }

    #[tokio::test]
    async fn test_disconnect_keeps_registry() {
        let server = MemoryServer::new();
        let manager = manager(&server);
        let hits = Arc::new(AtomicUsize::new(0));
        manager
            .subscribe(EventName::Custom("promo".into()), counter(&hits))
            .await;

        manager.connect().await.unwrap();
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.registry().len(), 1);

        manager.connect().await.unwrap();
        server.push(InboundEvent::Custom {
            name: "promo".into(),
            data: serde_json::Value::Null,
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_kick_does_not_reconnect() {
        let server = MemoryServer::new();
        let manager = manager(&server);
        let mut states = manager.state_receiver();
        manager.connect().await.unwrap();

        server.kick();
        states
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.handshake_count(), 1);
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        struct Stalled;

        #[async_trait::async_trait]
        impl Transport for Stalled {
            async fn open(&self, _: &Handshake) -> ScResult<Box<dyn crate::transport::Session>> {
                std::future::pending().await
            }
        }

        let manager = ConnectionManager::with_options(
            Arc::new(Stalled),
            Endpoint::new("http://localhost:4000"),
            Arc::new(StaticCredential::none()),
            ManagerOptions {
                connect_timeout: Duration::from_millis(20),
                ..ManagerOptions::default()
            },
        );

        let errors = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = errors.clone();
        manager
            .subscribe(
                EventName::ConnectError,
                Observer::new(move |e| {
                    if let InboundEvent::ConnectError { message } = e {
                        sink.lock().unwrap().push(message.clone());
                    }
                }),
            )
            .await;

        assert!(manager.connect().await.is_none());
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("timeout"));
    }

    #[tokio::test]
    async fn test_emit_after_disconnect_is_dropped() {
        let server = MemoryServer::new();
        let manager = manager(&server);
        let handle = manager.connect().await.unwrap();
        manager.disconnect().await;
        assert!(!handle.emit(Signal::MarkAsRead {
            chat_room_id: "r1".into()
        }));
    }
}
