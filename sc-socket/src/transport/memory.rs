//! In-process loopback transport.
//!
//! `MemoryServer` plays the server side: it records handshakes and emitted
//! signals, pushes inbound events, drops connections, and can refuse or
//! reject upcoming connection attempts. Used by tests and demos.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use sc_core::error::{ScError, ScResult};

use super::{CloseReason, Handle, HandleDriver, HandleSink, Handshake, Session, Transport, TransportKind};
use crate::events::{InboundEvent, Signal};

/// A signal received by the memory server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitted {
    /// Handle the signal was written on.
    pub handle_id: u64,
    pub signal: Signal,
}

#[derive(Default)]
struct ServerState {
    handshakes: Vec<Handshake>,
    refuse_next: u32,
    reject_with: Option<String>,
    live: Option<HandleSink>,
}

/// Server side of the loopback transport.
#[derive(Clone)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
    emitted_tx: mpsc::UnboundedSender<Emitted>,
    emitted_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Emitted>>>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    pub fn new() -> Self {
        let (emitted_tx, emitted_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(ServerState::default())),
            emitted_tx,
            emitted_rx: Arc::new(tokio::sync::Mutex::new(emitted_rx)),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A transport connected to this server.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            server: self.clone(),
        }
    }

    /// Number of handshakes attempted, successful or not.
    pub fn handshake_count(&self) -> usize {
        self.state().handshakes.len()
    }

    /// Tokens presented, in handshake order.
    pub fn tokens(&self) -> Vec<String> {
        self.state().handshakes.iter().map(|h| h.token.clone()).collect()
    }

    /// Fail the next `n` connection attempts at the transport level.
    pub fn refuse_next(&self, n: u32) {
        self.state().refuse_next = n;
    }

    /// Reject every handshake with a CONNECT_ERROR until cleared with `None`.
    pub fn reject_with(&self, message: Option<&str>) {
        self.state().reject_with = message.map(str::to_string);
    }

    /// Whether a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.state().live.as_ref().map(HandleSink::is_open).unwrap_or(false)
    }

    /// Id of the open connection's handle.
    pub fn live_handle_id(&self) -> Option<u64> {
        self.state()
            .live
            .as_ref()
            .filter(|s| s.is_open())
            .map(HandleSink::handle_id)
    }

    /// Deliver an event on the open connection. Returns how many observers ran.
    pub fn push(&self, event: InboundEvent) -> usize {
        let sink = self.state().live.clone();
        match sink {
            Some(sink) => sink.deliver(&event),
            None => 0,
        }
    }

    /// Drop the open connection as if the network went away.
    pub fn drop_connection(&self) {
        self.close_live(CloseReason::TransportClose);
    }

    /// Close the open connection with a server-side DISCONNECT.
    pub fn kick(&self) {
        self.close_live(CloseReason::ServerDisconnect);
    }

    fn close_live(&self, reason: CloseReason) {
        let sink = self.state().live.take();
        if let Some(sink) = sink {
            debug!("memory server closing handle {}: {reason}", sink.handle_id());
            sink.close(reason);
        }
    }

    /// Wait up to `timeout` for the next emitted signal.
    pub async fn next_signal(&self, timeout: Duration) -> Option<Emitted> {
        let mut rx = self.emitted_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Signals already received, without waiting.
    pub async fn drain_signals(&self) -> Vec<Emitted> {
        let mut rx = self.emitted_rx.lock().await;
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }
}

/// Client side of the loopback transport.
#[derive(Clone)]
pub struct MemoryTransport {
    server: MemoryServer,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, handshake: &Handshake) -> ScResult<Box<dyn Session>> {
        let mut state = self.server.state();
        state.handshakes.push(handshake.clone());

        if state.refuse_next > 0 {
            state.refuse_next -= 1;
            return Err(ScError::Socket("connection refused".into()));
        }
        if let Some(message) = &state.reject_with {
            return Err(ScError::HandshakeRejected(message.clone()));
        }

        Ok(Box::new(MemorySession {
            server: self.server.clone(),
        }))
    }
}

struct MemorySession {
    server: MemoryServer,
}

impl Session for MemorySession {
    fn kind(&self) -> TransportKind {
        TransportKind::Memory
    }

    fn start(self: Box<Self>, mut driver: HandleDriver) {
        let sink = driver.sink().clone();
        let previous = self.server.state().live.replace(sink.clone());
        if let Some(previous) = previous {
            previous.close(CloseReason::TransportClose);
        }

        let emitted = self.server.emitted_tx.clone();
        let handle_id = sink.handle_id();
        tokio::spawn(async move {
            while let Some(signal) = driver.next_outbound().await {
                let _ = emitted.send(Emitted { handle_id, signal });
            }
        });
    }
}

/// Convenience for tests that only need a handle wired to a memory server.
pub async fn open_pair(server: &MemoryServer) -> ScResult<Handle> {
    let session = server
        .transport()
        .open(&Handshake {
            endpoint: "memory://local".into(),
            path: "/".into(),
            token: String::new(),
            headers: Vec::new(),
        })
        .await?;
    let (handle, driver) = Handle::pair();
    session.start(driver);
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signals_are_recorded() {
        let server = MemoryServer::new();
        let handle = open_pair(&server).await.unwrap();
        assert!(server.is_connected());
        assert_eq!(server.live_handle_id(), Some(handle.id()));

        handle.emit(Signal::JoinChatRoom {
            chat_room_id: "r1".into(),
        });
        let emitted = server.next_signal(Duration::from_secs(1)).await.unwrap();
        assert_eq!(emitted.handle_id, handle.id());
        assert_eq!(emitted.signal.name(), "join-chat-room");
    }

    #[tokio::test]
    async fn test_refuse_then_accept() {
        let server = MemoryServer::new();
        server.refuse_next(1);
        assert!(open_pair(&server).await.is_err());
        assert!(open_pair(&server).await.is_ok());
        assert_eq!(server.handshake_count(), 2);
    }

    #[tokio::test]
    async fn test_reject_is_not_transport_failure() {
        let server = MemoryServer::new();
        server.reject_with(Some("bad token"));
        let err = open_pair(&server).await.unwrap_err();
        assert!(!err.is_transport_failure());
    }

    #[tokio::test]
    async fn test_drop_connection_closes_handle() {
        let server = MemoryServer::new();
        let handle = open_pair(&server).await.unwrap();
        server.drop_connection();
        assert_eq!(handle.closed().await, CloseReason::TransportClose);
        assert!(!server.is_connected());
    }
}
