//! Ordered transport negotiation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use sc_core::config::{ServerConfig, SocketConfig};
use sc_core::error::{ScError, ScResult};

use super::{Handshake, PollingTransport, Session, Transport, TransportKind, WebSocketTransport};

/// Tries each transport in order until one opens.
///
/// Only transport-level failures fall through; a rejected handshake is
/// returned as-is since another transport would be rejected the same way.
pub struct NegotiatingTransport {
    transports: Vec<(String, Arc<dyn Transport>)>,
}

impl NegotiatingTransport {
    pub fn new() -> Self {
        Self {
            transports: Vec::new(),
        }
    }

    /// Append a transport to the negotiation order.
    pub fn with(mut self, label: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        self.transports.push((label.into(), transport));
        self
    }

    /// Build the configured order (default: websocket, then polling).
    pub fn from_config(socket: &SocketConfig, server: &ServerConfig) -> ScResult<Self> {
        let mut negotiator = Self::new();
        for name in &socket.transports {
            let transport: Arc<dyn Transport> = match TransportKind::from_name(name) {
                Some(TransportKind::WebSocket) => Arc::new(WebSocketTransport::new()),
                Some(TransportKind::Polling) => {
                    Arc::new(PollingTransport::new(server.accept_self_signed_certs))
                }
                _ => return Err(ScError::Config(format!("unknown socket transport '{name}'"))),
            };
            negotiator = negotiator.with(name.clone(), transport);
        }
        if negotiator.transports.is_empty() {
            return Err(ScError::Config("no socket transports configured".into()));
        }
        Ok(negotiator)
    }

    /// Labels in negotiation order.
    pub fn order(&self) -> Vec<&str> {
        self.transports.iter().map(|(label, _)| label.as_str()).collect()
    }
}

impl Default for NegotiatingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for NegotiatingTransport {
    async fn open(&self, handshake: &Handshake) -> ScResult<Box<dyn Session>> {
        let mut last_error = None;
        for (label, transport) in &self.transports {
            match transport.open(handshake).await {
                Ok(session) => {
                    debug!("negotiated {label} transport");
                    return Ok(session);
                }
                Err(e) if e.is_transport_failure() => {
                    warn!("{label} transport failed: {e}");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| ScError::Socket("no transports configured".into())))
    }
}
