//! Chat client facade.
//!
//! The single entry point UI code talks to. Composes the connection manager,
//! room membership, and subscription registry. Nothing here returns an
//! error: failed connections surface through the `connect_error` diagnostic
//! and failed sends are logged and dropped.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use sc_core::config::AppConfig;
use sc_core::error::ScResult;

use crate::credential::CredentialProvider;
use crate::events::{ConnectionState, EventName, InboundMessage, Signal};
use crate::manager::ConnectionManager;
use crate::registry::Observer;
use crate::rooms::RoomMembership;
use crate::transport::Handle;

#[derive(Clone)]
pub struct ChatClient {
    manager: ConnectionManager,
    rooms: RoomMembership,
}

impl ChatClient {
    pub fn new(manager: ConnectionManager) -> Self {
        let rooms = RoomMembership::new(manager.clone());
        Self { manager, rooms }
    }

    /// Client over the configured server and transports.
    pub fn from_config(
        config: &AppConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ScResult<Self> {
        Ok(Self::new(ConnectionManager::from_config(config, credentials)?))
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Connect now instead of on first use.
    pub async fn connect(&self) -> Option<Handle> {
        self.manager.connect().await
    }

    /// Close the connection and forget joined rooms. Subscriptions persist.
    pub async fn disconnect(&self) {
        self.manager.disconnect().await;
        self.rooms.clear();
    }

    pub async fn join_room(&self, room_id: &str) -> bool {
        self.rooms.join_room(room_id).await
    }

    pub async fn leave_room(&self, room_id: &str) -> bool {
        self.rooms.leave_room(room_id).await
    }

    pub async fn mark_read(&self, room_id: &str) -> bool {
        self.rooms.mark_read(room_id).await
    }

    /// Resend joins for every joined room. Call this from a `connect`
    /// observer to restore membership after an automatic reconnect.
    pub async fn rejoin_rooms(&self) -> usize {
        self.rooms.rejoin_all().await
    }

    /// Send a chat message, connecting first if needed.
    ///
    /// There is no local echo: the message shows up through `new-message`
    /// once the server relays it back. Returns whether the signal was queued.
    pub async fn send_message(&self, room_id: &str, text: &str) -> bool {
        let Some(handle) = self.manager.connect().await else {
            warn!("message to room {room_id} dropped: no connection");
            return false;
        };
        let sent = handle.emit(Signal::SendMessage {
            chat_room_id: room_id.to_string(),
            message: text.to_string(),
        });
        if sent {
            info!("sent message to room {room_id} ({} chars)", text.chars().count());
        }
        sent
    }

    /// Register an observer. Duplicate registrations are ignored.
    pub async fn subscribe(&self, name: EventName, observer: Observer) -> bool {
        self.manager.subscribe(name, observer).await
    }

    /// Remove one observer, or all of them for `name` when `observer` is `None`.
    pub async fn unsubscribe(&self, name: &EventName, observer: Option<&Observer>) -> usize {
        self.manager.unsubscribe(name, observer).await
    }

    /// Subscribe a callback to inbound chat messages. Keep the returned
    /// observer to unsubscribe it later.
    pub async fn on_message<F>(&self, callback: F) -> Observer
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let observer = Observer::messages(callback);
        self.manager
            .subscribe(EventName::NewMessage, observer.clone())
            .await;
        observer
    }

    /// Point-in-time snapshot.
    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.manager.state_receiver()
    }

    pub fn joined_rooms(&self) -> Vec<String> {
        self.rooms.joined()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticCredential;
    use crate::manager::Endpoint;
    use crate::transport::MemoryServer;
    use std::time::Duration;

    fn client(server: &MemoryServer) -> ChatClient {
        ChatClient::new(ConnectionManager::new(
            Arc::new(server.transport()),
            Endpoint::new("http://localhost:4000"),
            Arc::new(StaticCredential::new("tok")),
        ))
    }

    #[tokio::test]
    async fn test_disconnect_clears_rooms_only() {
        let server = MemoryServer::new();
        let client = client(&server);
        client.on_message(|_| {}).await;
        client.join_room("r1").await;
        assert_eq!(client.joined_rooms(), vec!["r1"]);

        client.disconnect().await;
        assert!(client.joined_rooms().is_empty());
        assert!(!client.is_connected());
        assert_eq!(client.manager().registry().count(&EventName::NewMessage), 1);
    }

    #[tokio::test]
    async fn test_send_payload() {
        let server = MemoryServer::new();
        let client = client(&server);
        assert!(client.send_message("r9", "hello").await);

        let emitted = server.next_signal(Duration::from_secs(1)).await.unwrap();
        assert_eq!(emitted.signal.name(), "send-message");
        assert_eq!(
            emitted.signal.payload(),
            serde_json::json!({"chatRoomId": "r9", "message": "hello"})
        );
    }

    #[test]
    fn test_from_config_requires_server() {
        let config = AppConfig::default();
        let result = ChatClient::from_config(&config, Arc::new(StaticCredential::none()));
        assert!(result.is_err());
    }
}
