//! Engine.IO v4 / Socket.IO v5 frame codec.
//!
//! Engine packets are a single type digit followed by data. A `4` (message)
//! engine packet carries a Socket.IO packet, itself a type digit followed by
//! an optional namespace, an optional ack id, and a JSON body. Only the
//! default namespace is used; foreign namespaces and ack ids are skipped on
//! decode.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use sc_core::error::{ScError, ScResult};

use crate::events::Signal;

/// Separator between engine packets in a long-polling payload.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Session parameters sent by the server in the engine `open` packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl OpenInfo {
    /// Longest silence tolerated before the connection is considered dead.
    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

/// Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping(String),
    Pong(String),
    /// Carries an encoded Socket.IO packet.
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// Decode a single engine packet.
    pub fn decode(frame: &str) -> ScResult<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ScError::Protocol("empty engine packet".into()))?;
        let body = chars.as_str();
        match kind {
            '0' => {
                let info: OpenInfo = serde_json::from_str(body)
                    .map_err(|e| ScError::Protocol(format!("invalid open packet: {e}")))?;
                Ok(Self::Open(info))
            }
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body.to_string())),
            '3' => Ok(Self::Pong(body.to_string())),
            '4' => Ok(Self::Message(body.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(ScError::Protocol(format!("unknown engine packet type '{other}'"))),
        }
    }

    /// Encode to the text frame form.
    pub fn encode(&self) -> String {
        match self {
            Self::Open(info) => {
                // OpenInfo contains only strings and integers
                format!("0{}", serde_json::to_string(info).unwrap_or_default())
            }
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

/// Socket.IO packet on the default namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Client → server: handshake auth. Server → client: `{"sid": ...}`.
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    ConnectError { message: String },
}

impl SocketPacket {
    /// Decode the body of an engine `message` packet.
    pub fn decode(body: &str) -> ScResult<Self> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ScError::Protocol("empty socket packet".into()))?;
        let rest = skip_ack_id(skip_namespace(chars.as_str()));

        match kind {
            '0' => {
                if rest.is_empty() {
                    Ok(Self::Connect(None))
                } else {
                    Ok(Self::Connect(Some(serde_json::from_str(rest).map_err(|e| {
                        ScError::Protocol(format!("invalid connect packet: {e}"))
                    })?)))
                }
            }
            '1' => Ok(Self::Disconnect),
            '2' => {
                let parts: Vec<Value> = serde_json::from_str(rest)
                    .map_err(|e| ScError::Protocol(format!("invalid event packet: {e}")))?;
                let mut parts = parts.into_iter();
                let name = match parts.next() {
                    Some(Value::String(name)) => name,
                    _ => return Err(ScError::Protocol("event packet without a name".into())),
                };
                Ok(Self::Event {
                    name,
                    data: parts.next().unwrap_or(Value::Null),
                })
            }
            '4' => {
                let value: Value = serde_json::from_str(rest).unwrap_or(Value::String(rest.into()));
                let message = match &value {
                    Value::String(s) => s.clone(),
                    other => other
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| other.to_string()),
                };
                Ok(Self::ConnectError { message })
            }
            other => Err(ScError::Protocol(format!(
                "unsupported socket packet type '{other}'"
            ))),
        }
    }

    /// Encode as the body of an engine `message` packet.
    pub fn encode(&self) -> String {
        match self {
            Self::Connect(None) => "0".to_string(),
            Self::Connect(Some(auth)) => format!("0{auth}"),
            Self::Disconnect => "1".to_string(),
            Self::Event { name, data } => {
                format!("2{}", Value::Array(vec![Value::String(name.clone()), data.clone()]))
            }
            Self::ConnectError { message } => {
                format!("4{}", serde_json::json!({ "message": message }))
            }
        }
    }

    /// Wrap into an engine message packet.
    pub fn into_engine(self) -> EnginePacket {
        EnginePacket::Message(self.encode())
    }
}

fn skip_namespace(s: &str) -> &str {
    if s.starts_with('/') {
        match s.find(',') {
            Some(idx) => &s[idx + 1..],
            None => "",
        }
    } else {
        s
    }
}

fn skip_ack_id(s: &str) -> &str {
    s.trim_start_matches(|c: char| c.is_ascii_digit())
}

/// Engine frame for an outbound signal (`42["name",{...}]`).
pub fn encode_signal(signal: &Signal) -> String {
    SocketPacket::Event {
        name: signal.name().to_string(),
        data: signal.payload(),
    }
    .into_engine()
    .encode()
}

/// Engine frame carrying the handshake credential (`40{"token":"..."}`).
pub fn encode_connect(token: &str) -> String {
    SocketPacket::Connect(Some(serde_json::json!({ "token": token })))
        .into_engine()
        .encode()
}

/// Split a long-polling payload into engine packets.
///
/// Frames that fail to decode are skipped so the rest of the batch still
/// gets through.
pub fn decode_payload(payload: &str) -> Vec<EnginePacket> {
    payload
        .split(RECORD_SEPARATOR)
        .filter(|frame| !frame.is_empty())
        .filter_map(|frame| match EnginePacket::decode(frame) {
            Ok(packet) => Some(packet),
            Err(e) => {
                warn!("skipping malformed frame: {e}");
                None
            }
        })
        .collect()
}

/// Join engine packets into a long-polling payload.
pub fn encode_payload(packets: &[EnginePacket]) -> String {
    packets
        .iter()
        .map(EnginePacket::encode)
        .collect::<Vec<_>>()
        .join(&RECORD_SEPARATOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"abc","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        match packet {
            EnginePacket::Open(info) => {
                assert_eq!(info.sid, "abc");
                assert_eq!(info.heartbeat_deadline(), Duration::from_secs(45));
            }
            other => panic!("expected open, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_ping_and_message() {
        assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(
            EnginePacket::decode("2hb-1").unwrap(),
            EnginePacket::Ping("hb-1".into())
        );
        assert_eq!(
            EnginePacket::decode("40").unwrap(),
            EnginePacket::Message("0".into())
        );
        assert!(EnginePacket::decode("").is_err());
        assert!(EnginePacket::decode("9").is_err());
    }

    #[test]
    fn test_encode_signal_frame() {
        let frame = encode_signal(&Signal::JoinChatRoom {
            chat_room_id: "r1".into(),
        });
        assert_eq!(frame, r#"42["join-chat-room",{"chatRoomId":"r1"}]"#);
    }

    #[test]
    fn test_encode_connect_frame() {
        assert_eq!(encode_connect("secret"), r#"40{"token":"secret"}"#);
        assert_eq!(encode_connect(""), r#"40{"token":""}"#);
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = SocketPacket::decode(r#"2/admin,17["new-message",{"a":1}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "new-message".into(),
                data: json!({"a": 1}),
            }
        );

        let packet = SocketPacket::decode(r#"2["ping-only"]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "ping-only".into(),
                data: Value::Null,
            }
        );
    }

    #[test]
    fn test_decode_connect_ack_and_error() {
        assert_eq!(
            SocketPacket::decode(r#"0{"sid":"xyz"}"#).unwrap(),
            SocketPacket::Connect(Some(json!({"sid": "xyz"})))
        );
        assert_eq!(
            SocketPacket::decode(r#"4{"message":"invalid token"}"#).unwrap(),
            SocketPacket::ConnectError {
                message: "invalid token".into()
            }
        );
        assert_eq!(
            SocketPacket::decode(r#"4"not authorized""#).unwrap(),
            SocketPacket::ConnectError {
                message: "not authorized".into()
            }
        );
    }

    #[test]
    fn test_decode_event_rejects_garbage() {
        assert!(SocketPacket::decode("2{}").is_err());
        assert!(SocketPacket::decode("2[42]").is_err());
        assert!(SocketPacket::decode("5").is_err());
    }

    #[test]
    fn test_polling_payload_split() {
        let payload = format!("2{RECORD_SEPARATOR}42[\"x\",1]{RECORD_SEPARATOR}6");
        let packets = decode_payload(&payload);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0], EnginePacket::Ping(String::new()));
        assert_eq!(packets[2], EnginePacket::Noop);
        assert_eq!(encode_payload(&packets), payload);
    }

    #[test]
    fn test_polling_payload_skips_undecodable_frames() {
        let payload = format!(
            "42[\"promo\",{{}}]{RECORD_SEPARATOR}bAQID{RECORD_SEPARATOR}42[\"promo\",{{\"pct\":5}}]"
        );
        let packets = decode_payload(&payload);
        assert_eq!(
            packets,
            vec![
                EnginePacket::Message("2[\"promo\",{}]".into()),
                EnginePacket::Message("2[\"promo\",{\"pct\":5}]".into()),
            ]
        );
    }
}
