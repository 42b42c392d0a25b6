//! Transports and the per-connection handle.
//!
//! A [`Transport`] performs the handshake and returns a [`Session`] that is
//! connected but not yet reading. The connection manager pairs the session
//! with a fresh [`Handle`], replays the subscription registry onto it, and
//! only then starts the session, so no inbound event can arrive before the
//! handle's observers are attached.

pub mod memory;
pub mod negotiate;
pub mod polling;
pub mod websocket;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use sc_core::error::{ScError, ScResult};

use crate::events::{EventName, InboundEvent, Signal};
use crate::packet::{EnginePacket, SocketPacket};
use crate::registry::{ListenerSet, Observer};

pub use memory::{MemoryServer, MemoryTransport};
pub use negotiate::NegotiatingTransport;
pub use polling::PollingTransport;
pub use websocket::WebSocketTransport;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Which transport carried a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Polling,
    Memory,
}

impl TransportKind {
    /// Parse a configured transport name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "websocket" => Some(Self::WebSocket),
            "polling" => Some(Self::Polling),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Polling => "polling",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a transport needs to open a session.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// Server origin, `http(s)://host[:port]`.
    pub endpoint: String,
    /// Mount path of the socket endpoint, e.g. `/socket.io`.
    pub path: String,
    /// Bearer credential; empty when none is available.
    pub token: String,
    /// Extra HTTP headers for the upgrade / polling requests.
    pub headers: Vec<(String, String)>,
}

impl Handshake {
    /// Engine.IO URL for the given transport.
    ///
    /// WebSocket URLs switch the scheme to `ws`/`wss`.
    pub fn engine_url(&self, kind: TransportKind) -> ScResult<String> {
        let endpoint = self.endpoint.trim_end_matches('/');
        let base = match kind {
            TransportKind::WebSocket => {
                if let Some(rest) = endpoint.strip_prefix("https://") {
                    format!("wss://{rest}")
                } else if let Some(rest) = endpoint.strip_prefix("http://") {
                    format!("ws://{rest}")
                } else {
                    return Err(ScError::Config(format!(
                        "server address needs an http(s) scheme: {endpoint}"
                    )));
                }
            }
            _ => {
                if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                    return Err(ScError::Config(format!(
                        "server address needs an http(s) scheme: {endpoint}"
                    )));
                }
                endpoint.to_string()
            }
        };
        let path = self.path.trim_end_matches('/');
        Ok(format!(
            "{base}{path}/?EIO={}&transport={}",
            sc_core::constants::ENGINE_IO_VERSION,
            kind.as_str()
        ))
    }
}

/// Why a handle closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed locally via `disconnect()`.
    ClientClose,
    /// The server sent a DISCONNECT packet.
    ServerDisconnect,
    /// The underlying stream ended.
    TransportClose,
    /// Read or write failure on the underlying stream.
    TransportError(String),
    /// No traffic within the heartbeat deadline.
    PingTimeout,
}

impl CloseReason {
    /// Whether the manager should reconnect automatically.
    ///
    /// Only transport-level losses qualify; a deliberate close on either
    /// side does not.
    pub fn should_reconnect(&self) -> bool {
        matches!(
            self,
            Self::TransportClose | Self::TransportError(_) | Self::PingTimeout
        )
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientClose => write!(f, "client disconnect"),
            Self::ServerDisconnect => write!(f, "server disconnect"),
            Self::TransportClose => write!(f, "transport close"),
            Self::TransportError(e) => write!(f, "transport error: {e}"),
            Self::PingTimeout => write!(f, "ping timeout"),
        }
    }
}

/// Opens sessions against a server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the handshake. On success the session is authenticated but
    /// not yet delivering events.
    async fn open(&self, handshake: &Handshake) -> ScResult<Box<dyn Session>>;
}

/// An authenticated session waiting to be driven.
pub trait Session: Send {
    fn kind(&self) -> TransportKind;

    /// Spawn the IO task(s) that move frames between the wire and the handle.
    fn start(self: Box<Self>, driver: HandleDriver);
}

struct HandleShared {
    id: u64,
    listeners: ListenerSet,
    outbound: mpsc::UnboundedSender<Signal>,
    closed: watch::Sender<Option<CloseReason>>,
}

/// The live object representing one established connection.
///
/// Cheap to clone; all clones refer to the same connection. A handle never
/// reopens: reconnection produces a new handle.
#[derive(Clone)]
pub struct Handle {
    shared: Arc<HandleShared>,
}

impl Handle {
    /// Create a handle and the driver its session uses to feed it.
    pub fn pair() -> (Handle, HandleDriver) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(None);
        let shared = Arc::new(HandleShared {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            listeners: ListenerSet::new(),
            outbound,
            closed,
        });
        let handle = Handle {
            shared: shared.clone(),
        };
        let driver = HandleDriver {
            sink: HandleSink { shared },
            outbound_rx,
        };
        (handle, driver)
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Queue a signal for sending. Signals on a closed handle are dropped.
    ///
    /// Returns whether the signal was queued.
    pub fn emit(&self, signal: Signal) -> bool {
        if !self.is_open() {
            warn!(
                "dropping {} for room {}: handle {} is closed",
                signal.name(),
                signal.room_id(),
                self.id()
            );
            return false;
        }
        debug!("emit {} on handle {}", signal.name(), self.id());
        self.shared.outbound.send(signal).is_ok()
    }

    /// Attach an observer to this handle only.
    pub fn on(&self, name: EventName, observer: Observer) -> bool {
        self.shared.listeners.insert(name, observer)
    }

    /// Detach one observer, or every observer for `name` when `observer` is `None`.
    pub fn off(&self, name: &EventName, observer: Option<&Observer>) -> usize {
        match observer {
            Some(o) => usize::from(self.shared.listeners.remove(name, o)),
            None => self.shared.listeners.remove_all(name),
        }
    }

    pub(crate) fn listeners(&self) -> &ListenerSet {
        &self.shared.listeners
    }

    pub fn is_open(&self) -> bool {
        self.shared.closed.borrow().is_none()
    }

    /// Close from the client side. Pending signals may be lost.
    pub fn close(&self) {
        close_shared(&self.shared, CloseReason::ClientClose);
    }

    /// Wait until the handle closes.
    pub async fn closed(&self) -> CloseReason {
        wait_closed(&self.shared).await
    }

    /// Close reason, if closed.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.closed.borrow().clone()
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.shared.id)
            .field("open", &self.is_open())
            .finish()
    }
}

fn close_shared(shared: &HandleShared, reason: CloseReason) -> bool {
    shared.closed.send_if_modified(|current| {
        if current.is_none() {
            *current = Some(reason);
            true
        } else {
            false
        }
    })
}

async fn wait_closed(shared: &HandleShared) -> CloseReason {
    let mut rx = shared.closed.subscribe();
    let reason = match rx.wait_for(Option::is_some).await {
        Ok(reason) => reason.clone().unwrap_or(CloseReason::TransportClose),
        // The sender lives in `shared`, which we are borrowing
        Err(_) => CloseReason::TransportClose,
    };
    reason
}

/// Session-side view of a handle: deliver events, observe closure.
#[derive(Clone)]
pub struct HandleSink {
    shared: Arc<HandleShared>,
}

impl HandleSink {
    pub fn handle_id(&self) -> u64 {
        self.shared.id
    }

    /// Fan an inbound event out to the handle's observers.
    pub fn deliver(&self, event: &InboundEvent) -> usize {
        if !self.is_open() {
            debug!("discarding {} on closed handle {}", event.name(), self.shared.id);
            return 0;
        }
        self.shared.listeners.dispatch(event)
    }

    /// Mark the handle closed. The first reason wins.
    pub fn close(&self, reason: CloseReason) -> bool {
        close_shared(&self.shared, reason)
    }

    pub fn is_open(&self) -> bool {
        self.shared.closed.borrow().is_none()
    }

    pub async fn closed(&self) -> CloseReason {
        wait_closed(&self.shared).await
    }
}

/// Owned by a running session: the outbound queue plus a sink.
pub struct HandleDriver {
    sink: HandleSink,
    outbound_rx: mpsc::UnboundedReceiver<Signal>,
}

impl HandleDriver {
    pub fn sink(&self) -> &HandleSink {
        &self.sink
    }

    /// Next signal to write, or `None` once the handle is closed.
    ///
    /// Signals queued before closure are still drained first.
    pub async fn next_outbound(&mut self) -> Option<Signal> {
        tokio::select! {
            biased;
            signal = self.outbound_rx.recv() => signal,
            _ = self.sink.closed() => None,
        }
    }
}

/// What a session should do after routing one engine packet.
#[derive(Debug, PartialEq)]
pub(crate) enum Routed {
    Continue,
    Reply(EnginePacket),
    Closed(CloseReason),
}

/// Shared inbound routing for wire transports.
pub(crate) fn route_engine_packet(packet: EnginePacket, sink: &HandleSink) -> Routed {
    match packet {
        EnginePacket::Ping(data) => Routed::Reply(EnginePacket::Pong(data)),
        EnginePacket::Close => Routed::Closed(CloseReason::TransportClose),
        EnginePacket::Message(body) => match SocketPacket::decode(&body) {
            Ok(SocketPacket::Event { name, data }) => {
                match InboundEvent::from_wire(&name, data) {
                    Ok(event) => {
                        sink.deliver(&event);
                    }
                    Err(e) => warn!("dropping inbound {name}: {e}"),
                }
                Routed::Continue
            }
            Ok(SocketPacket::Disconnect) => Routed::Closed(CloseReason::ServerDisconnect),
            Ok(SocketPacket::ConnectError { message }) => {
                warn!("server revoked the session: {message}");
                Routed::Closed(CloseReason::ServerDisconnect)
            }
            Ok(SocketPacket::Connect(_)) => Routed::Continue,
            Err(e) => {
                warn!("skipping malformed frame: {e}");
                Routed::Continue
            }
        },
        EnginePacket::Open(_) | EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {
            Routed::Continue
        }
    }
}
