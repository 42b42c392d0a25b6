//! Chat room endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sc_core::error::{ScError, ScResult};
use sc_socket::InboundMessage;

use crate::client::ApiClient;
use crate::response::ServerResponse;

/// Room metadata as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: String,
    /// Customer who opened the room.
    pub customer_id: String,
    /// Admin assigned to the room, if any.
    #[serde(default)]
    pub admin_id: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A room plus its prior messages, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomHistory {
    #[serde(flatten)]
    pub room: ChatRoom,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

impl RoomHistory {
    /// Messages not yet read by this client.
    pub fn unread(&self) -> impl Iterator<Item = &InboundMessage> {
        self.messages.iter().filter(|m| !m.is_read)
    }

    /// The last `limit` messages.
    pub fn latest(&self, limit: usize) -> &[InboundMessage] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }
}

impl ApiClient {
    /// Fetch a room's metadata and message history.
    pub async fn get_room(&self, room_id: &str) -> ScResult<RoomHistory> {
        let resp: ServerResponse<RoomHistory> =
            self.get_json(&format!("/chat-rooms/{room_id}")).await?;
        if let Some(message) = resp.error_message() {
            return Err(ScError::ServerError {
                status: resp.status,
                message,
            });
        }
        let mut history = resp.data.ok_or_else(|| ScError::ServerError {
            status: 404,
            message: format!("chat room {room_id} not found"),
        })?;
        history.messages.sort_by_key(|m| m.created_at);
        Ok(history)
    }

    /// Mark every message in a room as read for this client.
    pub async fn mark_room_read(&self, room_id: &str) -> ScResult<()> {
        let resp: ServerResponse = self
            .post_json(&format!("/chat-rooms/{room_id}/read"), &serde_json::json!({}))
            .await?;
        match resp.error_message() {
            Some(message) => Err(ScError::ServerError {
                status: resp.status,
                message,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryConfig;
    use sc_core::config::ServerConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const HISTORY: &str = r#"{
        "status": 200,
        "message": "OK",
        "data": {
            "id": "room-1",
            "customerId": "cust-9",
            "adminId": null,
            "isActive": true,
            "createdAt": "2024-05-01T09:00:00Z",
            "messages": [
                {"id": "m2", "chatRoomId": "room-1", "senderId": "admin-1", "senderRole": "admin",
                 "message": "How can I help?", "isRead": false, "createdAt": "2024-05-01T09:01:00Z"},
                {"id": "m1", "chatRoomId": "room-1", "senderId": "cust-9", "senderRole": "customer",
                 "message": "Hi", "isRead": true, "createdAt": "2024-05-01T09:00:30Z"}
            ]
        }
    }"#;

    /// Read one request, headers and body, so closing does not reset the peer.
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        let header_end = loop {
            if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        };
        let headers = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
        let body_len = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while request.len() < header_end + body_len {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
    }

    /// Serve one canned HTTP response per connection, in order.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        (format!("http://{addr}"), hits)
    }

    fn client(address: String) -> ApiClient {
        let config = ServerConfig {
            address,
            ..ServerConfig::default()
        };
        ApiClient::new(&config, "tok")
            .unwrap()
            .with_retry_config(RetryConfig {
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                ..RetryConfig::default()
            })
    }

    #[test]
    fn test_history_decodes_and_flattens() {
        let resp: ServerResponse<RoomHistory> = serde_json::from_str(HISTORY).unwrap();
        let history = resp.data.unwrap();
        assert_eq!(history.room.customer_id, "cust-9");
        assert_eq!(history.room.admin_id, None);
        assert_eq!(history.messages.len(), 2);
        assert_eq!(history.unread().count(), 1);
    }

    #[test]
    fn test_latest() {
        let resp: ServerResponse<RoomHistory> = serde_json::from_str(HISTORY).unwrap();
        let history = resp.data.unwrap();
        assert_eq!(history.latest(1).len(), 1);
        assert_eq!(history.latest(10).len(), 2);
    }

    #[tokio::test]
    async fn test_get_room_sorts_oldest_first() {
        let (address, _) = serve(vec![(200, HISTORY)]).await;
        let history = client(address).get_room("room-1").await.unwrap();
        let ids: Vec<_> = history.messages.iter().filter_map(|m| m.id.as_deref()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_get_room_retries_unavailable() {
        let (address, hits) = serve(vec![(503, "{}"), (502, "{}"), (200, HISTORY)]).await;
        let history = client(address).get_room("room-1").await.unwrap();
        assert_eq!(history.room.id, "room-1");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let (address, hits) = serve(vec![(
            404,
            r#"{"status":404,"message":"Chat room not found"}"#,
        )])
        .await;
        let err = client(address).get_room("nope").await.unwrap_err();
        match err {
            ScError::ServerError { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Chat room not found");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mark_room_read() {
        let (address, _) = serve(vec![(200, r#"{"status":200,"message":"OK"}"#)]).await;
        client(address).mark_room_read("room-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let (address, _) = serve(vec![(401, "{}")]).await;
        let err = client(address).mark_room_read("room-1").await.unwrap_err();
        assert!(matches!(err, ScError::AuthFailed(_)));
    }
}
