//! Shared test utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sc_socket::{
    ChatClient, ConnectionManager, ConnectionState, CredentialProvider, Endpoint, InboundEvent,
    Observer, StaticCredential,
};
use sc_socket::transport::MemoryServer;

/// A client wired to `server` with default reconnection (5 attempts, 1s apart).
pub fn create_test_client(server: &MemoryServer) -> ChatClient {
    create_test_client_with(server, Arc::new(StaticCredential::new("test-token")))
}

pub fn create_test_client_with(
    server: &MemoryServer,
    credentials: Arc<dyn CredentialProvider>,
) -> ChatClient {
    ChatClient::new(ConnectionManager::new(
        Arc::new(server.transport()),
        Endpoint::new("http://localhost:4000"),
        credentials,
    ))
}

/// An observer that counts its calls.
pub fn counting_observer() -> (Observer, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let observer = Observer::new(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    (observer, hits)
}

pub fn hits(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

/// A custom server event with an empty payload.
pub fn custom_event(name: &str) -> InboundEvent {
    InboundEvent::Custom {
        name: name.into(),
        data: serde_json::json!({}),
    }
}

/// A `new-message` event for `room`.
pub fn message_event(room: &str, text: &str) -> InboundEvent {
    InboundEvent::from_wire(
        "new-message",
        serde_json::json!({
            "id": "m-1",
            "chatRoomId": room,
            "senderId": "admin-1",
            "senderRole": "admin",
            "message": text,
            "isRead": false,
            "createdAt": "2024-05-01T10:00:00Z"
        }),
    )
    .expect("valid message payload")
}

/// Wait until the client reports `state`.
pub async fn wait_for_state(client: &ChatClient, state: ConnectionState) {
    let mut rx = client.state_receiver();
    rx.wait_for(|s| *s == state)
        .await
        .expect("state channel closed");
}

/// Wait until the server holds a connection other than `previous`.
pub async fn wait_for_new_connection(server: &MemoryServer, previous: Option<u64>) -> u64 {
    loop {
        match server.live_handle_id() {
            Some(id) if Some(id) != previous => return id,
            _ => tokio::time::sleep(std::time::Duration::from_millis(50)).await,
        }
    }
}
