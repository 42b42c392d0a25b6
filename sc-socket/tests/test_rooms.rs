//! Room membership and message dispatch over the wire.

mod common;

use std::time::Duration;

use sc_socket::transport::MemoryServer;
use sc_socket::{ConnectionState, Signal};

const WAIT: Duration = Duration::from_secs(1);

// ---- Send ----

#[tokio::test]
async fn send_without_connect_connects_once() {
    let server = MemoryServer::new();
    let client = common::create_test_client(&server);
    assert!(!client.is_connected());

    assert!(client.send_message("room-7", "is this in stock?").await);
    assert!(client.send_message("room-7", "size M").await);
    assert_eq!(server.handshake_count(), 1);

    let first = server.next_signal(WAIT).await.unwrap();
    assert_eq!(first.signal.name(), "send-message");
    assert_eq!(
        first.signal.payload(),
        serde_json::json!({"chatRoomId": "room-7", "message": "is this in stock?"})
    );
    let second = server.next_signal(WAIT).await.unwrap();
    assert_eq!(second.handle_id, first.handle_id);
}

#[tokio::test]
async fn send_has_no_local_echo() {
    let server = MemoryServer::new();
    let client = common::create_test_client(&server);
    let (observer, count) = common::counting_observer();
    client
        .subscribe(sc_socket::EventName::NewMessage, observer)
        .await;

    client.send_message("r1", "hello").await;
    assert_eq!(common::hits(&count), 0);

    // Only the server relay reaches observers
    server.push(common::message_event("r1", "hello"));
    assert_eq!(common::hits(&count), 1);
}

// ---- Join / leave ----

#[tokio::test]
async fn join_then_leave_preserves_order() {
    let server = MemoryServer::new();
    let client = common::create_test_client(&server);

    client.join_room("r1").await;
    client.leave_room("r1").await;

    let signals = vec![
        server.next_signal(WAIT).await.unwrap().signal,
        server.next_signal(WAIT).await.unwrap().signal,
    ];
    assert_eq!(
        signals,
        vec![
            Signal::JoinChatRoom {
                chat_room_id: "r1".into()
            },
            Signal::LeaveChatRoom {
                chat_room_id: "r1".into()
            },
        ]
    );
    assert!(client.joined_rooms().is_empty());
}

#[tokio::test]
async fn duplicate_join_sends_twice_and_tracks_once() {
    let server = MemoryServer::new();
    let client = common::create_test_client(&server);

    client.join_room("r1").await;
    client.join_room("r1").await;

    assert_eq!(server.next_signal(WAIT).await.unwrap().signal.name(), "join-chat-room");
    assert_eq!(server.next_signal(WAIT).await.unwrap().signal.name(), "join-chat-room");
    assert_eq!(client.joined_rooms(), vec!["r1"]);
}

#[tokio::test]
async fn leave_unjoined_room_still_sends() {
    let server = MemoryServer::new();
    let client = common::create_test_client(&server);
    client.connect().await.unwrap();

    assert!(client.leave_room("never-joined").await);
    let emitted = server.next_signal(WAIT).await.unwrap();
    assert_eq!(emitted.signal.room_id(), "never-joined");
}

#[tokio::test]
async fn mark_read_is_fire_and_forget() {
    let server = MemoryServer::new();
    let client = common::create_test_client(&server);
    client.join_room("r1").await;
    server.next_signal(WAIT).await.unwrap();

    assert!(client.mark_read("r1").await);
    let emitted = server.next_signal(WAIT).await.unwrap();
    assert_eq!(
        emitted.signal,
        Signal::MarkAsRead {
            chat_room_id: "r1".into()
        }
    );
}

#[tokio::test]
async fn disconnect_forgets_rooms() {
    let server = MemoryServer::new();
    let client = common::create_test_client(&server);
    client.join_room("r1").await;
    client.join_room("r2").await;

    client.disconnect().await;
    assert!(client.joined_rooms().is_empty());
    assert!(!client.leave_room("r1").await);
}

// ---- Reconnect ----

#[tokio::test(start_paused = true)]
async fn rooms_are_rejoined_on_demand_after_reconnect() {
    let server = MemoryServer::new();
    let client = common::create_test_client(&server);
    client.join_room("r1").await;
    server.next_signal(WAIT).await.unwrap();

    let before = server.live_handle_id();
    server.drop_connection();
    let after = common::wait_for_new_connection(&server, before).await;
    common::wait_for_state(&client, ConnectionState::Connected).await;

    // The new connection starts without membership
    assert!(server.next_signal(WAIT).await.is_none());
    assert_eq!(client.joined_rooms(), vec!["r1"]);

    assert_eq!(client.rejoin_rooms().await, 1);
    let emitted = server.next_signal(WAIT).await.unwrap();
    assert_eq!(emitted.handle_id, after);
    assert_eq!(
        emitted.signal,
        Signal::JoinChatRoom {
            chat_room_id: "r1".into()
        }
    );
}
