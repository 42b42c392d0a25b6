//! StoreChat Socket - real-time messaging client.
//!
//! This crate provides the chat connection core:
//! - Engine.IO / Socket.IO framing over WebSocket with a long-polling fallback
//! - A connection manager with bounded automatic reconnection
//! - A process-wide subscription registry replayed onto every new connection
//! - Room membership and the `ChatClient` facade used by front ends

pub mod client;
pub mod credential;
pub mod events;
pub mod manager;
pub mod packet;
pub mod registry;
pub mod rooms;
pub mod transport;

// Re-export key types
pub use client::ChatClient;
pub use credential::{CredentialProvider, SharedCredential, StaticCredential};
pub use events::{ConnectionState, EventName, InboundEvent, InboundMessage, SenderRole, Signal};
pub use manager::{ConnectionManager, Endpoint, ManagerOptions, ReconnectConfig};
pub use registry::{Observer, SubscriptionRegistry};
pub use rooms::RoomMembership;
pub use transport::{
    CloseReason, Handle, MemoryServer, MemoryTransport, NegotiatingTransport, PollingTransport,
    Transport, TransportKind, WebSocketTransport,
};
